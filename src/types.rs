use crate::value::VBValue;
use std::fmt::Debug;
use std::fmt::Display;

/// Registry key: logical name plus scope namespace. Two keys with the same
/// name but different scopes address independent entries.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct VBKey {
    pub name:  String,
    pub scope: String,
}

impl VBKey {
    pub fn new(name: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            name:  name.into(),
            scope: scope.into(),
        }
    }
}

impl Display for VBKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.scope)
    }
}

/// One row of the ordered backup index: which version exists and when it was
/// written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VBIndexEntry {
    pub version: u64,
    pub stamp:   i64,
}

/// What an entry knows about its remote data. `NotLoaded` means the backend
/// was never consulted; `NotFound` means it was and came back empty. Neither
/// can collide with a legitimate stored value, `Nil` included.
#[derive(Clone, Debug, PartialEq)]
pub enum VBValueState {
    NotLoaded,
    NotFound,
    Loaded(VBValue),
}

impl VBValueState {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotLoaded => "not loaded",
            Self::NotFound => "no data",
            Self::Loaded(v) => v.kind(),
        }
    }
}

/// Outcome of [`VBEntry::save()`](crate::entry::VBEntry::save). `Unchanged`
/// is the not-dirty no-op; `Saved` carries the version number the backup
/// chain advanced to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VBSaveOutcome {
    Unchanged,
    Saved(u64),
}

/// Failures surfaced to callers. `E` is the backend's own error type; it is
/// carried by value and displayed, never rethrown as a panic.
#[derive(Debug, thiserror::Error)]
pub enum VBError<E>
where
    E: Display + Debug,
{
    /// A remote call kept failing until the retry budget ran out.
    #[error("remote call failed after {attempts} attempt(s): {cause}")]
    Remote { attempts: u32, cause: E },

    /// The payload for `version` was written but the index update failed, so
    /// the payload never became "latest". The slot is reused by the next
    /// save.
    #[error("backup {version} written but its index update failed: {cause}")]
    IndexWindow { version: u64, cause: E },

    /// `increment` on something that is not a loaded number.
    #[error("increment needs a loaded numeric value, found {actual}")]
    InvalidOperand { actual: &'static str },
}
