use async_trait::async_trait;
use std::fmt::Debug;
use std::fmt::Display;

use crate::types::VBIndexEntry;
use crate::value::VBValue;

// For types that are in charge of talking to the remote key-value service.
#[async_trait]
pub trait VBRemoteStore: Sized + Send + Sync + 'static {
    /// Whatever the backend reports when a call fails. Transient failures are
    /// expected; every method here is only ever invoked through
    /// [`RetryPolicy`](crate::retry::RetryPolicy).
    type Error: Display + Debug + Send + Sync + 'static;

    /// Fetch one item from a primary store. `Ok(None)` means the item does
    /// not exist, which is not an error.
    async fn primary_get(&self, store: &str, item: &str) -> Result<Option<VBValue>, Self::Error>;

    /// Write one item into a primary store. Writing the same item twice must
    /// overwrite; the cache relies on this to make retried saves idempotent.
    async fn primary_set(&self, store: &str, item: &str, value: &VBValue) -> Result<(), Self::Error>;

    /// Return up to `limit` entries of an ordered index store, highest
    /// version first.
    async fn index_top(&self, store: &str, limit: usize) -> Result<Vec<VBIndexEntry>, Self::Error>;

    /// Record `version -> stamp` in an ordered index store.
    async fn index_set(&self, store: &str, version: u64, stamp: i64) -> Result<(), Self::Error>;
}

/// Host-provided mapping from raw caller identifiers to stable identity ids.
/// When a raw identifier resolves, the cache rewrites it to the reserved
/// `IdentityKeyPrefix + id` form so the same caller always lands on the same
/// logical key.
pub trait VBIdentityResolver: Send + Sync + 'static {
    fn identity_of(&self, raw: &str) -> Option<i64>;
}

/// Default resolver: knows nobody, every identifier is used verbatim.
pub struct NoIdentities;

impl VBIdentityResolver for NoIdentities {
    fn identity_of(&self, _raw: &str) -> Option<i64> {
        None
    }
}
