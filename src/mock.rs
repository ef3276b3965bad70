#![cfg(any(test, feature = "mock"))]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use crate::traits::VBRemoteStore;
use crate::types::VBIndexEntry;
use crate::value::VBValue;

/// Failure injected by [`VBMemoryRemote`], naming the operation it hit.
#[derive(Clone, Debug, thiserror::Error)]
#[error("simulated {0} outage")]
pub struct VBMockFault(pub &'static str);

/// In-memory stand-in for the remote key-value service: primary stores keyed
/// by item, ordered index stores keyed by version. Counts every call and can
/// be told to fail the next N calls, globally or for index writes only, to
/// exercise the retry and index-window paths.
#[derive(Default)]
pub struct VBMemoryRemote {
    primary:        Mutex<HashMap<String, HashMap<String, VBValue>>>,
    index:          Mutex<HashMap<String, BTreeMap<u64, i64>>>,
    fail_all:       AtomicU32,
    fail_index_set: AtomicU32,
    calls:          AtomicU64,
}

// Decrement-if-positive; true means "this call fails".
fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl VBMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `calls` remote calls of any kind.
    pub fn fail_next(&self, calls: u32) {
        self.fail_all.store(calls, Ordering::SeqCst);
    }

    /// Fail the next `calls` index writes; everything else keeps working.
    pub fn fail_next_index_set(&self, calls: u32) {
        self.fail_index_set.store(calls, Ordering::SeqCst);
    }

    /// Total remote calls seen so far, failed ones included.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn version_payload(&self, store: &str, version: u64) -> Option<VBValue> {
        self.primary
            .lock()
            .unwrap()
            .get(store)
            .and_then(|items| items.get(&version.to_string()))
            .cloned()
    }

    pub fn version_count(&self, store: &str) -> usize {
        self.primary.lock().unwrap().get(store).map_or(0, HashMap::len)
    }

    pub fn latest_indexed(&self, index: &str) -> Option<u64> {
        self.index
            .lock()
            .unwrap()
            .get(index)
            .and_then(|versions| versions.keys().next_back().copied())
    }

    fn tick(&self, op: &'static str) -> Result<(), VBMockFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.fail_all) {
            return Err(VBMockFault(op));
        }
        Ok(())
    }
}

#[async_trait]
impl VBRemoteStore for VBMemoryRemote {
    type Error = VBMockFault;

    async fn primary_get(&self, store: &str, item: &str) -> Result<Option<VBValue>, Self::Error> {
        self.tick("primary_get")?;
        Ok(self
            .primary
            .lock()
            .unwrap()
            .get(store)
            .and_then(|items| items.get(item))
            .cloned())
    }

    async fn primary_set(&self, store: &str, item: &str, value: &VBValue) -> Result<(), Self::Error> {
        self.tick("primary_set")?;
        self.primary
            .lock()
            .unwrap()
            .entry(store.to_string())
            .or_default()
            .insert(item.to_string(), value.clone());
        Ok(())
    }

    async fn index_top(&self, store: &str, limit: usize) -> Result<Vec<VBIndexEntry>, Self::Error> {
        self.tick("index_top")?;
        Ok(self
            .index
            .lock()
            .unwrap()
            .get(store)
            .map(|versions| {
                versions
                    .iter()
                    .rev()
                    .take(limit)
                    .map(|(version, stamp)| VBIndexEntry {
                        version: *version,
                        stamp:   *stamp,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn index_set(&self, store: &str, version: u64, stamp: i64) -> Result<(), Self::Error> {
        self.tick("index_set")?;
        if take_one(&self.fail_index_set) {
            return Err(VBMockFault("index_set"));
        }
        self.index
            .lock()
            .unwrap()
            .entry(store.to_string())
            .or_default()
            .insert(version, stamp);
        Ok(())
    }
}
