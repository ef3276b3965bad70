use crate::entry::VBEntry;
use crate::retry::RetryPolicy;
use crate::store::VBStore;
use crate::traits::NoIdentities;
use crate::traits::VBIdentityResolver;
use crate::traits::VBRemoteStore;
use crate::types::VBError;
use crate::types::VBKey;
use fieldx_plus::{child_build, fx_plus};
use moka::{future::Cache, notification::RemovalCause, policy::EvictionPolicy};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// The process-wide registry: one shared [`VBEntry`] per `(name, scope)`
/// pair, resolved through the host identity system. This single-instance
/// guarantee is what keeps concurrent callers from growing divergent caches
/// of the same remote data.
///
/// ```ignore
/// let cache = VBCache::builder()
///     .remote(Arc::new(MyRemote::connect(host, port)))
///     .identity(Arc::new(MySessions::new()))
///     .attempt_count(5)
///     .build()?;
///
/// let entry = cache.resolve("Player1").await?;
/// let coins = entry.get(VBValue::from(0)).await?;
/// entry.set(VBValue::from(50)).await;
/// entry.save().await?;
/// ```
#[fx_plus(
    parent,
    no_new,
    default(off),
    sync,
    builder(
        doc("Builder object of [`VBCache`].", "", "See [`VBCache::builder()`] method."),
        method_doc("Implement builder pattern for [`VBCache`]."),
    )
)]
pub struct VBCache<B>
where
    B: VBRemoteStore,
{
    #[fieldx(vis(pub(crate)), builder(vis(pub), required, into), get(clone))]
    remote: Arc<B>,

    /// Maps raw identifiers to identity ids. Host-provided; the default
    /// resolver knows nobody and leaves every identifier verbatim.
    #[fieldx(get(clone), default(Arc::new(NoIdentities) as Arc<dyn VBIdentityResolver>))]
    identity: Arc<dyn VBIdentityResolver>,

    /// Cache name. Most useful for debugging and logging.
    #[fieldx(lock, optional, clearer, get(off))]
    name: &'static str,

    /// How many times a remote call is attempted before its failure is
    /// surfaced. Clamped to at least 1.
    #[fieldx(get(copy), default(3))]
    attempt_count: u32,

    /// The delay between two consecutive attempts of one remote call.
    #[fieldx(get(copy), default(Duration::from_millis(500)))]
    attempt_delay: Duration,

    /// Load a freshly resolved entry right away instead of on first `get`.
    #[fieldx(get(copy), default(false))]
    load_data_instantly: bool,

    /// On a confirmed-absent value, adopt the first default passed to `get`
    /// as the in-memory value (dirty, so it can be persisted).
    #[fieldx(get(copy), default(false))]
    set_cache_to_first_default: bool,

    /// Scope used when the caller does not name one.
    #[fieldx(get(clone), builder(into), default(String::from("global")))]
    global_scope_key: String,

    /// Reserved prefix of identity-derived logical keys. Verbatim keys must
    /// not collide with it.
    #[fieldx(get(clone), builder(into), default(String::from("User")))]
    identity_key_prefix: String,

    /// 0 leaves the registry unbounded, which is the default: evicting a
    /// live entry forfeits the one-instance-per-key guarantee for handles
    /// that outlive it.
    #[fieldx(get(copy), default(0))]
    max_entries: u64,

    /// The delay between two consecutive autosave sweeps. Zero disables the
    /// background task entirely.
    #[fieldx(get(copy), set, default(Duration::from_secs(30)))]
    autosave_interval: Duration,

    #[fieldx(vis(pub(crate)), lazy, lock, clearer(private), get(clone), builder(off))]
    entries: Arc<Cache<VBKey, Arc<VBEntry<B>>>>,

    #[fieldx(private, clearer, lock, get, set, builder(off))]
    autosave_task: tokio::task::JoinHandle<()>,

    #[fieldx(lock, private, get(copy), set, builder(off), default(Instant::now()))]
    last_autosave: Instant,
}

impl<B> VBCache<B>
where
    B: VBRemoteStore,
{
    fn build_entries(&self) -> Arc<Cache<VBKey, Arc<VBEntry<B>>>> {
        let mut builder = Cache::builder()
            .name(self.clear_name().unwrap_or_else(|| std::any::type_name::<B>()))
            .eviction_policy(EvictionPolicy::tiny_lfu())
            .eviction_listener(|key: Arc<VBKey>, entry: Arc<VBEntry<B>>, cause| {
                if matches!(cause, RemovalCause::Size) && entry.dirty() {
                    log::warn!("entry '{key}' evicted by the size bound while dirty; unsaved changes are lost");
                }
            });
        if self.max_entries() > 0 {
            builder = builder.max_capacity(self.max_entries());
        }
        Arc::new(builder.build())
    }

    #[inline]
    pub fn name(&self) -> String {
        self.entries().name().unwrap_or("<anon>").to_string()
    }

    pub(crate) fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempt_count(), self.attempt_delay())
    }

    /// Resolve an identifier in the global scope. See
    /// [`resolve_in()`](Self::resolve_in).
    #[inline]
    pub async fn resolve(&self, identifier: &str) -> Result<Arc<VBEntry<B>>, VBError<B::Error>> {
        self.resolve_in(identifier, None).await
    }

    /// Return the shared entry for `(identifier, scope)`, constructing and
    /// registering it if this is the first resolve. Construction is atomic
    /// per key: concurrent resolvers of the same key all end up with the one
    /// instance. With `load_data_instantly` the freshly created entry loads
    /// before this returns; a load failure is surfaced but the entry stays
    /// registered and retries on its first `get`.
    pub async fn resolve_in(&self, identifier: &str, scope: Option<&str>) -> Result<Arc<VBEntry<B>>, VBError<B::Error>> {
        let (key, identity_id) = self.derive_key(identifier, scope);
        log::debug!("[{}] RESOLVE({key})", self.name());

        let entry = self
            .entries()
            .entry(key.clone())
            .or_insert_with(async {
                let store = child_build!(
                    self,
                    VBStore<B> {
                        store_key: format!("{}/{}", key.scope, key.name),
                        index_key: format!("{}/{}/backups", key.scope, key.name),
                    }
                )
                .unwrap();
                VBEntry::new(self, key.clone(), identity_id, store)
            })
            .await;

        let fresh = entry.is_fresh();
        let entry = entry.into_value();

        if fresh && self.load_data_instantly() {
            entry.preload().await?;
        }

        Ok(entry)
    }

    /// Persist every dirty entry. The first failure aborts the sweep and
    /// propagates; entries already saved stay clean, the rest stay dirty and
    /// are picked up again by the next sweep.
    pub async fn save_all(&self) -> Result<usize, VBError<B::Error>> {
        let mut saved = 0;
        for (_key, entry) in self.entries().iter() {
            if entry.dirty() {
                entry.save().await?;
                saved += 1;
            }
        }

        if saved > 0 {
            log::info!("[{}] saved {saved} dirty entries", self.name());
        }
        self.set_last_autosave(Instant::now());

        Ok(saved)
    }

    /// Save and evict every scope of one identifier, typically when its
    /// session ends. An entry whose save fails is left in place, still
    /// dirty, and the error propagates: eviction never loses data.
    pub async fn release(&self, identifier: &str) -> Result<usize, VBError<B::Error>> {
        let (needle, _) = self.derive_key(identifier, None);
        let mut released = 0;
        for (key, entry) in self.entries().iter() {
            if key.name == needle.name {
                entry.save().await?;
                self.entries().invalidate(key.as_ref()).await;
                released += 1;
            }
        }
        log::debug!("[{}] RELEASE({}): {released} entries", self.name(), needle.name);
        Ok(released)
    }

    /// Evict every scope of one identifier without saving. The deliberately
    /// non-functional part of a regulatory erasure: persisted backup
    /// versions are untouched and must be handled out-of-band.
    pub async fn forget(&self, identifier: &str) -> usize {
        let (needle, _) = self.derive_key(identifier, None);
        let mut dropped = 0;
        for (key, _entry) in self.entries().iter() {
            if key.name == needle.name {
                self.entries().invalidate(key.as_ref()).await;
                dropped += 1;
            }
        }
        dropped
    }

    /// Final sweep and shutdown: saves what is dirty, stops the autosave
    /// task, and drops the registry.
    pub async fn close(&self) {
        if let Err(error) = self.save_all().await {
            log::error!("[{}] final save sweep failed: {error}", self.name());
        }
        if let Some(task) = self.clear_autosave_task() {
            task.abort();
            let _ = task.await;
        }
        self.clear_entries();
    }

    pub(crate) async fn discard(&self, key: &VBKey) {
        self.entries().invalidate(key).await;
    }

    // Mutations report here so the autosave task only runs while there is
    // something to save.
    pub(crate) async fn note_dirty(&self) {
        if self.autosave_interval() > Duration::ZERO {
            self.check_autosave_task().await;
        }
    }

    async fn check_autosave_task(&self) {
        if self.autosave_task().as_ref().map_or(true, |t| t.is_finished()) {
            let async_self = self.myself().unwrap();
            self.set_autosave_task(tokio::spawn(async move { async_self.autosave_loop().await }));
        }
    }

    async fn autosave_loop(&self) {
        log::debug!("[{}] starting autosave task", self.name());
        loop {
            if !self.entries().iter().any(|(_, entry)| entry.dirty()) {
                // Don't take resources while nothing is dirty; note_dirty
                // restarts the task.
                log::debug!("[{}] stopping autosave task, nothing left to save", self.name());
                break;
            }

            let interval = self.autosave_interval();
            let remaining = interval.saturating_sub(self.last_autosave().elapsed());
            if remaining == Duration::ZERO {
                if let Err(error) = self.save_all().await {
                    // The backend fails transiently by nature; keep the dirty
                    // flags and sweep again next interval.
                    log::warn!("[{}] autosave sweep failed: {error}", self.name());
                }
                tokio::time::sleep(interval).await;
            }
            else {
                tokio::time::sleep(remaining).await;
            }
        }
    }

    // Identity rewrite first, reserved-pattern extraction second, so an
    // entry knows its identity id no matter which spelling the caller used.
    fn derive_key(&self, identifier: &str, scope: Option<&str>) -> (VBKey, Option<i64>) {
        let prefix = self.identity_key_prefix();
        let resolved = self.identity().identity_of(identifier);
        let name = match resolved {
            Some(id) => format!("{prefix}{id}"),
            None => identifier.to_string(),
        };
        let identity_id = name.strip_prefix(prefix.as_str()).and_then(|rest| rest.parse::<i64>().ok());
        if resolved.is_none() && identity_id.is_some() {
            log::warn!("verbatim key '{name}' collides with the reserved identity prefix '{prefix}'");
        }

        let scope = scope.map(str::to_string).unwrap_or_else(|| self.global_scope_key());
        (VBKey { name, scope }, identity_id)
    }
}
