use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

/// A cacheable value: JSON-shaped tree of scalars, sequences, and string-keyed
/// maps. One number type, like the payloads the remote backends actually
/// store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VBValue {
    Nil,
    Bool(bool),
    Number(f64),
    Str(String),
    Seq(Vec<VBValue>),
    Map(BTreeMap<String, VBValue>),
}

impl VBValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Seq(_) => "sequence",
            Self::Map(_) => "map",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Default-fill merge: every key present in `defaults` but absent here is
    /// copied in, recursively for nested maps. Keys already present are never
    /// overwritten. Anything but a map-into-map merge returns `self`
    /// untouched; sequences are positional and are deliberately not merged.
    pub fn filled_from(mut self, defaults: &VBValue) -> VBValue {
        if let (Self::Map(values), Self::Map(defaults)) = (&mut self, defaults) {
            fill_map(values, defaults);
        }
        self
    }
}

fn fill_map(values: &mut BTreeMap<String, VBValue>, defaults: &BTreeMap<String, VBValue>) {
    for (key, default) in defaults {
        match values.get_mut(key) {
            None => {
                values.insert(key.clone(), default.clone());
            }
            Some(VBValue::Map(nested)) => {
                if let VBValue::Map(nested_defaults) = default {
                    fill_map(nested, nested_defaults);
                }
            }
            Some(_) => (),
        }
    }
}

impl From<bool> for VBValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for VBValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for VBValue {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<i32> for VBValue {
    fn from(v: i32) -> Self {
        Self::Number(v as f64)
    }
}

impl From<u32> for VBValue {
    fn from(v: u32) -> Self {
        Self::Number(v as f64)
    }
}

impl From<&str> for VBValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for VBValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<VBValue>> for VBValue {
    fn from(v: Vec<VBValue>) -> Self {
        Self::Seq(v)
    }
}

impl From<BTreeMap<String, VBValue>> for VBValue {
    fn from(v: BTreeMap<String, VBValue>) -> Self {
        Self::Map(v)
    }
}
