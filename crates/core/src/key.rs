//! Row identity within a collection.

use crate::value::Value;
use core::fmt;

use serde::{Deserialize, Serialize};

/// The identity of a row.
///
/// Collections key rows by integer or string; join outputs combine their
/// input keys into a `Composite`, and group-by outputs derive a key from
/// the group value. `Key` is totally ordered so it can break ties in
/// ordered windows deterministically.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    Int(i64),
    Str(String),
    Composite(Vec<Key>),
}

impl Key {
    /// Derives a key from a value.
    ///
    /// Integers and dates map to `Int`, strings to `Str`, composites of
    /// scalars (arrays) to `Composite`. Anything else goes through its
    /// canonical text rendering, so every value yields a stable key.
    pub fn of(value: &Value) -> Key {
        match value {
            Value::Int(i) | Value::Date(i) => Key::Int(*i),
            Value::Str(s) => Key::Str(s.clone()),
            Value::Array(items) => Key::Composite(items.iter().map(Key::of).collect()),
            other => Key::Str(other.to_string()),
        }
    }

    /// Combines two keys into a composite, flattening nothing.
    pub fn pair(left: Key, right: Key) -> Key {
        Key::Composite(vec![left, right])
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{i}"),
            Key::Str(s) => write!(f, "{s}"),
            Key::Composite(parts) => {
                write!(f, "(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{part}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Int(v)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Str(v.to_string())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::Str(v)
    }
}
