use std::sync::Arc;

use crate::cache::VBCache;
use crate::entry::VBEntry;
use crate::traits::VBRemoteStore;
use crate::types::VBError;

/// Thin glue between host session events and the cache. The host owns the
/// event source (player join/leave callbacks, a periodic timer) and calls in
/// here; the bridge itself schedules nothing.
pub struct VBSessionBridge<B>
where
    B: VBRemoteStore,
{
    cache: Arc<VBCache<B>>,
}

impl<B> VBSessionBridge<B>
where
    B: VBRemoteStore,
{
    pub fn new(cache: Arc<VBCache<B>>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<VBCache<B>> {
        &self.cache
    }

    /// A session started: resolve its entry so the data is warm (eagerly
    /// loaded when the cache is configured with `load_data_instantly`).
    pub async fn on_join(&self, identifier: &str) -> Result<Arc<VBEntry<B>>, VBError<B::Error>> {
        self.cache.resolve(identifier).await
    }

    /// A session ended: persist and evict everything the identifier owns.
    /// On failure the entries stay cached and dirty; the host may retry or
    /// accept the loss.
    pub async fn on_leave(&self, identifier: &str) -> Result<usize, VBError<B::Error>> {
        self.cache.release(identifier).await
    }

    /// Periodic tick: flush whatever is dirty.
    pub async fn on_tick(&self) -> Result<usize, VBError<B::Error>> {
        self.cache.save_all().await
    }

    /// Regulatory erasure request. Deliberately non-functional beyond
    /// dropping the in-memory entry: the persisted backup chain must be
    /// erased by out-of-band tooling against the backend itself.
    pub async fn on_erasure_request(&self, identifier: &str) -> usize {
        log::warn!(
            "[{}] erasure requested for '{identifier}': cached state dropped, persisted versions must be removed out-of-band",
            self.cache.name()
        );
        self.cache.forget(identifier).await
    }
}
