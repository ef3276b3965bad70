//! # vb-cache
//!
//! Versioned write-back caching for eventually-consistent remote key-value
//! backends.
//!
//! Think of it as the local, mutable face of data that actually lives in a
//! rate-limited remote store: callers get an in-memory handle that loads
//! lazily, tracks its own dirtiness, and persists changes as an append-only
//! chain of versions, with every remote call wrapped in a bounded retry loop.
//!
//! # The Basics
//!
//! The `vb-cache` crate is designed for the following use case:
//!
//! - Key-value remote storage with best-effort availability: calls fail
//!   transiently and must simply be retried.
//! - One logical value per caller (or per caller-and-scope) that is read and
//!   mutated far more often than it is worth persisting.
//! - Losing the last known-good payload to a partial write is unacceptable,
//!   so saves never overwrite in place.
//!
//! The cache operates on the following principles:
//!
//! - It is backend-agnostic: the remote service is consumed through the
//!   [`VBRemoteStore`] trait and never implemented here.
//! - One entry per `(logical key, scope)` pair, process-wide. Every caller
//!   that resolves the same key shares the same [`entry::VBEntry`] instance,
//!   so concurrent readers cannot grow divergent copies of the same data.
//! - Saves are appends. Version `n + 1` is written next to version `n`, then
//!   an ordered index advances the "latest" pointer; older payloads stay
//!   retrievable as backups, and a crashed write can never clobber the last
//!   good one.
//! - A save happens only when the value actually changed; clean entries cost
//!   zero remote calls.
//! - Fully async, on tokio.
//!
//! # Identity keys
//!
//! When the host maps a raw identifier to a session identity (see
//! [`traits::VBIdentityResolver`]), the cache rewrites the identifier to the
//! reserved `User<id>` form, so the same caller always lands on the same
//! logical key no matter which spelling arrives. The prefix is configurable
//! and reserved; verbatim keys that collide with it are logged.
//!
//! # Sessions
//!
//! Hosts with ephemeral sessions wire their join/leave/timer events into
//! [`session::VBSessionBridge`]; alternatively the cache's own autosave task
//! sweeps dirty entries in the background, exactly as often as its
//! `autosave_interval` allows.

pub mod cache;
pub mod entry;
pub mod mock;
pub mod retry;
pub mod session;
pub mod store;
pub mod traits;
pub mod types;
pub mod value;

#[doc(inline)]
pub use cache::VBCache;
#[doc(inline)]
pub use traits::VBRemoteStore;
#[doc(inline)]
pub use value::VBValue;

pub mod prelude {
    pub use crate::cache::VBCache;
    pub use crate::entry::VBEntry;
    pub use crate::session::VBSessionBridge;
    pub use crate::traits::*;
    pub use crate::types::*;
    pub use crate::value::VBValue;
}

/// Build a [`VBValue::Map`](crate::value::VBValue) from `key => value` pairs;
/// values go through `VBValue::from`.
#[macro_export]
macro_rules! vb_map {
    () => {
        $crate::value::VBValue::Map(::std::collections::BTreeMap::new())
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = ::std::collections::BTreeMap::new();
        $(
            map.insert(::std::string::String::from($key), $crate::value::VBValue::from($value));
        )+
        $crate::value::VBValue::Map(map)
    }};
}
