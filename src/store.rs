use fieldx_plus::fx_plus;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::instrument;

use crate::cache::VBCache;
use crate::traits::VBRemoteStore;
use crate::types::VBError;
use crate::value::VBValue;

/// Versioned persistence for one logical key/scope pair. Payloads live in the
/// primary store keyed by version number; the ordered index maps
/// `version -> timestamp` and its maximum key is the implicit "latest"
/// pointer. Versions are never overwritten by a successful save, which is
/// what makes the chain a usable backup trail.
#[fx_plus(child(VBCache<B>, rc_strong), sync, default(off))]
pub struct VBStore<B>
where
    B: VBRemoteStore,
{
    store_key: String,
    index_key: String,

    // 0 means "no version yet". Only advanced after both writes of a save
    // have succeeded.
    #[fieldx(lock, get(copy), set(private), default(0), builder(off))]
    latest_version: u64,
}

impl<B> VBStore<B>
where
    B: VBRemoteStore,
{
    /// Find the newest persisted version through the index and fetch its
    /// payload. `Ok(None)` means the chain is empty (or the pointed payload
    /// is gone, which reads the same to callers).
    #[instrument(level = "trace", skip(self), fields(store = %self.store_key))]
    pub(crate) async fn load_latest(&self) -> Result<Option<VBValue>, VBError<B::Error>> {
        let parent = self.parent();
        let remote = parent.remote();
        let retry = parent.retry();

        let top = retry
            .run(|| {
                let remote = Arc::clone(&remote);
                let index_key = self.index_key.clone();
                async move { remote.index_top(&index_key, 1).await }
            })
            .await
            .map_err(|cause| VBError::Remote {
                attempts: retry.attempts(),
                cause,
            })?;

        let Some(latest) = top.first().copied()
        else {
            self.set_latest_version(0);
            return Ok(None);
        };

        self.set_latest_version(latest.version);

        retry
            .run(|| {
                let remote = Arc::clone(&remote);
                let store_key = self.store_key.clone();
                async move { remote.primary_get(&store_key, &latest.version.to_string()).await }
            })
            .await
            .map_err(|cause| VBError::Remote {
                attempts: retry.attempts(),
                cause,
            })
    }

    /// Append the next version of the chain: payload first, index second.
    /// A payload-write failure leaves `latest_version` untouched and the slot
    /// abandoned; an index-write failure is the narrow window where the
    /// payload exists but is not "latest" yet, and the next save overwrites
    /// the same slot.
    #[instrument(level = "trace", skip(self, value), fields(store = %self.store_key))]
    pub(crate) async fn save_next(&self, value: &VBValue) -> Result<u64, VBError<B::Error>> {
        let parent = self.parent();
        let remote = parent.remote();
        let retry = parent.retry();
        let next = self.latest_version() + 1;

        retry
            .run(|| {
                let remote = Arc::clone(&remote);
                let store_key = self.store_key.clone();
                let value = value.clone();
                async move { remote.primary_set(&store_key, &next.to_string(), &value).await }
            })
            .await
            .map_err(|cause| VBError::Remote {
                attempts: retry.attempts(),
                cause,
            })?;

        let stamp = chrono::Utc::now().timestamp();
        retry
            .run(|| {
                let remote = Arc::clone(&remote);
                let index_key = self.index_key.clone();
                async move { remote.index_set(&index_key, next, stamp).await }
            })
            .await
            .map_err(|cause| VBError::IndexWindow { version: next, cause })?;

        self.set_latest_version(next);
        Ok(next)
    }
}

impl<B> Debug for VBStore<B>
where
    B: VBRemoteStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VBStore")
            .field("store_key", &self.store_key)
            .field("index_key", &self.index_key)
            .field("latest_version", &self.latest_version())
            .finish()
    }
}
