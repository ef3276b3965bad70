use fieldx_plus::child_build;
use fieldx_plus::fx_plus;
use std::fmt::Debug;
use std::sync::Arc;

use crate::cache::VBCache;
use crate::store::VBStore;
use crate::traits::VBRemoteStore;
use crate::types::VBError;
use crate::types::VBKey;
use crate::types::VBSaveOutcome;
use crate::types::VBValueState;
use crate::value::VBValue;

/// One logical cached value, shared by every caller that resolved its key.
/// Holds the in-memory state, the dirty flag, and the backing versioned
/// store.
///
/// All mutating operations (a load triggered by [`get()`](Self::get),
/// [`set()`](Self::set), [`increment()`](Self::increment),
/// [`save()`](Self::save), [`remove()`](Self::remove)) are serialized by a
/// per-entry mutex: two saves racing on the version counter would write the
/// same slot twice and silently drop one of them.
#[fx_plus(child(VBCache<B>, rc_strong), sync, rc, default(off))]
pub struct VBEntry<B>
where
    B: VBRemoteStore,
{
    key:         VBKey,
    identity_id: Option<i64>,
    store:       VBStore<B>,
    op_lock:     tokio::sync::Mutex<()>,

    #[fieldx(lock, get(clone), set(private), default(VBValueState::NotLoaded), builder(off))]
    state: VBValueState,

    #[fieldx(lock, get(copy), set(private), default(false), builder(off))]
    dirty: bool,
}

impl<B> VBEntry<B>
where
    B: VBRemoteStore,
{
    pub(crate) fn new(parent: &VBCache<B>, key: VBKey, identity_id: Option<i64>, store: VBStore<B>) -> Arc<Self> {
        child_build!(
            parent,
            VBEntry<B> {
                key:         key,
                identity_id: identity_id,
                store:       store,
                op_lock:     tokio::sync::Mutex::new(()),
            }
        )
        .unwrap()
    }

    pub fn key(&self) -> &VBKey {
        &self.key
    }

    /// Set iff the logical key matches the reserved identity pattern.
    pub fn identity_id(&self) -> Option<i64> {
        self.identity_id
    }

    /// Read the cached value, loading it from the backend on first use, which
    /// is the only suspension point a read can trigger.
    ///
    /// A `Map` value is returned default-filled from a `Map` `default`:
    /// missing keys are copied in recursively, present keys are never
    /// overwritten. The merge result is what the caller gets; it is never
    /// cached and never persisted. When the backend has no data the default
    /// itself is returned; with `set_cache_to_first_default` enabled it is
    /// also adopted as the in-memory value and marked dirty.
    pub async fn get(&self, default: VBValue) -> Result<VBValue, VBError<B::Error>> {
        let _ops = self.op_lock.lock().await;
        self.ensure_loaded().await?;
        match self.state() {
            VBValueState::Loaded(value) => Ok(value.filled_from(&default)),
            _ => {
                if self.parent().set_cache_to_first_default() {
                    self.set_state(VBValueState::Loaded(default.clone()));
                    self.set_dirty(true);
                    self.parent().note_dirty().await;
                }
                Ok(default)
            }
        }
    }

    /// Replace the in-memory value. Marks the entry dirty only when the new
    /// value actually differs from the current one.
    pub async fn set(&self, value: VBValue) {
        let _ops = self.op_lock.lock().await;
        let unchanged = matches!(self.state(), VBValueState::Loaded(ref current) if *current == value);
        self.set_state(VBValueState::Loaded(value));
        if !unchanged {
            self.set_dirty(true);
            self.parent().note_dirty().await;
        }
    }

    /// Add `amount` to a loaded numeric value and mark the entry dirty.
    /// Anything else (a non-number, confirmed-absent data, a value that was
    /// never loaded) is an `InvalidOperand` error; no implicit load happens
    /// here.
    pub async fn increment(&self, amount: f64) -> Result<VBValue, VBError<B::Error>> {
        let _ops = self.op_lock.lock().await;
        let state = self.state();
        let current = match &state {
            VBValueState::Loaded(value) => value.as_number(),
            _ => None,
        };
        let Some(current) = current
        else {
            return Err(VBError::InvalidOperand { actual: state.kind() });
        };

        let value = VBValue::Number(current + amount);
        self.set_state(VBValueState::Loaded(value.clone()));
        self.set_dirty(true);
        self.parent().note_dirty().await;
        Ok(value)
    }

    /// Append the current value to the backup chain, but only if it changed
    /// since the last successful save. On failure the dirty flag stays set:
    /// a lost save must remain observable and retryable.
    pub async fn save(&self) -> Result<VBSaveOutcome, VBError<B::Error>> {
        let _ops = self.op_lock.lock().await;

        if !self.dirty() {
            log::debug!("[{}] SAVE({}): unchanged, skipping", self.parent().name(), self.key);
            return Ok(VBSaveOutcome::Unchanged);
        }

        let value = match self.state() {
            VBValueState::Loaded(value) => value,
            // Dirty without a loaded value cannot normally happen.
            _ => {
                self.set_dirty(false);
                return Ok(VBSaveOutcome::Unchanged);
            }
        };

        let version = self.store.save_next(&value).await?;
        self.set_dirty(false);
        log::debug!("[{}] SAVE({}): version {version}", self.parent().name(), self.key);
        Ok(VBSaveOutcome::Saved(version))
    }

    /// Evict this entry from the registry and drop its in-memory state.
    /// Never saves implicitly. A handle retained past this call is outside
    /// the interface contract.
    pub async fn remove(&self) {
        let _ops = self.op_lock.lock().await;
        log::debug!("[{}] REMOVE({})", self.parent().name(), self.key);
        self.parent().discard(&self.key).await;
        self.set_state(VBValueState::NotLoaded);
        self.set_dirty(false);
    }

    // Eager-load hook used by the registry when `load_data_instantly` is on.
    pub(crate) async fn preload(&self) -> Result<(), VBError<B::Error>> {
        let _ops = self.op_lock.lock().await;
        self.ensure_loaded().await
    }

    // Callers must hold `op_lock`.
    async fn ensure_loaded(&self) -> Result<(), VBError<B::Error>> {
        if !matches!(self.state(), VBValueState::NotLoaded) {
            return Ok(());
        }
        match self.store.load_latest().await? {
            Some(value) => self.set_state(VBValueState::Loaded(value)),
            None => self.set_state(VBValueState::NotFound),
        };
        Ok(())
    }
}

impl<B> Debug for VBEntry<B>
where
    B: VBRemoteStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VBEntry")
            .field("key", &self.key)
            .field("state", &self.state().kind())
            .field("dirty", &self.dirty())
            .finish()
    }
}
