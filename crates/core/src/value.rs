//! Value type definitions for Rill collections.
//!
//! This module defines the `Value` enum which represents any value that can
//! appear in a row field. `Value` carries a total `Ord` and `Hash` so values
//! can key hash maps and ordered multisets inside the incremental operators.
//!
//! Ints, floats, and dates form one numeric equivalence class: `Int(1)`,
//! `Float(1.0)`, and `Date(1)` compare equal, hash alike, and land in the
//! same hash bucket. Equality, ordering, and hashing all agree, so a join
//! index lookup matches exactly the pairs the `eq` operator accepts.

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A value stored in a row field.
///
/// Untagged serde representation, so rows round-trip naturally through
/// JSON fixtures. An `i64` deserializes as `Int`, never `Date`; `Date`
/// values only arise from explicit construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent / unknown value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 string
    Str(String),
    /// Timestamp as Unix milliseconds
    Date(i64),
    /// Ordered list of values
    Array(Vec<Value>),
    /// Nested record, ordered by field name
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Returns true if this value is Null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value if this is a Bool, None otherwise.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the i64 value if this is an Int, None otherwise.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the f64 value if this is a Float, None otherwise.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a reference to the string if this is a Str, None otherwise.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns the timestamp if this is a Date, None otherwise.
    pub fn as_date(&self) -> Option<i64> {
        match self {
            Value::Date(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of this value, if it has one.
    ///
    /// Ints, Floats, and Dates are numeric; Bools map to 0/1. Everything
    /// else (including Null) is not numeric; callers decide how to coerce.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Date(v) => Some(*v as f64),
            Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    /// Equality is `cmp` equality, so numeric values of different
    /// variants compare equal and `Eq`, `Ord`, and `Hash` stay
    /// consistent with each other.
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Hashes one numeric value through its `f64` image, the same image
/// `cmp` uses for cross-type comparisons. Zeroes fold together and all
/// NaN payloads hash alike, matching their equality classes.
fn hash_numeric<H: Hasher>(n: f64, state: &mut H) {
    let bits = if n.is_nan() {
        f64::NAN.to_bits()
    } else if n == 0.0 {
        0u64
    } else {
        n.to_bits()
    };
    bits.hash(state);
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            // Int, Float, and Date share one tag: they are one
            // equivalence class under `cmp`.
            Value::Int(i) => {
                2u8.hash(state);
                hash_numeric(*i as f64, state);
            }
            Value::Float(f) => {
                2u8.hash(state);
                hash_numeric(*f, state);
            }
            Value::Date(d) => {
                2u8.hash(state);
                hash_numeric(*d as f64, state);
            }
            Value::Str(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Value::Array(a) => {
                4u8.hash(state);
                a.hash(state);
            }
            Value::Object(o) => {
                5u8.hash(state);
                o.hash(state);
            }
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            // Within the int-like variants the comparison stays exact
            (Value::Int(a) | Value::Date(a), Value::Int(b) | Value::Date(b)) => a.cmp(b),
            // Cross-type numeric comparisons against floats
            (Value::Int(a) | Value::Date(a), Value::Float(b)) => {
                if b.is_nan() {
                    Ordering::Less
                } else {
                    (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal)
                }
            }
            (Value::Float(a), Value::Int(b) | Value::Date(b)) => {
                if a.is_nan() {
                    Ordering::Greater
                } else {
                    a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal)
                }
            }
            (Value::Float(a), Value::Float(b)) => {
                // NaN ordered greater than every other float
                match (a.is_nan(), b.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
                }
            }
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            (Value::Object(a), Value::Object(b)) => a.cmp(b),
            // Different types: order by type discriminant
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl Value {
    /// Returns a type ordering value for comparing different types.
    fn type_order(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Date(_) => 4,
            Value::Str(_) => 5,
            Value::Array(_) => 6,
            Value::Object(_) => 7,
        }
    }
}

impl fmt::Display for Value {
    /// Canonical text rendering, used for string concatenation and for
    /// deriving keys from non-scalar group values.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "@{d}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Object(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{name}:{value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_null() {
        let v = Value::Null;
        assert!(v.is_null());
        assert!(!Value::Int(0).is_null());
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(100).as_i64(), Some(100));
        assert_eq!(Value::Float(3.5).as_f64(), Some(3.5));
        assert_eq!(Value::Str("hello".into()).as_str(), Some("hello"));
        assert_eq!(Value::Date(1234567890).as_date(), Some(1234567890));
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Int(42), Value::Int(42));
        assert_eq!(Value::Int(42), Value::Float(42.0));
        assert_eq!(Value::Date(42), Value::Int(42));
        assert_ne!(Value::Int(42), Value::Float(42.5));
        assert_ne!(Value::Int(1), Value::Str("1".into()));
        assert_eq!(Value::Null, Value::Null);
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    }

    #[test]
    fn test_value_ordering() {
        assert!(Value::Int(1) < Value::Int(2));
        assert!(Value::Str("a".into()) < Value::Str("b".into()));
        assert!(Value::Null < Value::Int(i64::MIN));
        // cross-type numeric
        assert!(Value::Int(1) < Value::Float(1.5));
        assert!(Value::Float(2.5) > Value::Int(2));
        assert!(Value::Date(5) < Value::Int(6));
        assert!(Value::Float(5.5) > Value::Date(5));
        // NaN greatest among floats
        assert!(Value::Float(f64::NAN) > Value::Float(f64::MAX));
        assert!(Value::Float(f64::NAN) > Value::Int(i64::MAX));
    }

    #[test]
    fn test_hash_agrees_with_equality() {
        use std::collections::HashMap;

        let mut index: HashMap<Value, &str> = HashMap::new();
        index.insert(Value::Int(1), "one");
        // numeric equivalents land in the same bucket
        assert_eq!(index.get(&Value::Float(1.0)), Some(&"one"));
        assert_eq!(index.get(&Value::Date(1)), Some(&"one"));
        assert_eq!(index.get(&Value::Float(1.5)), None);

        index.insert(Value::Float(0.0), "zero");
        assert_eq!(index.get(&Value::Float(-0.0)), Some(&"zero"));
        assert_eq!(index.get(&Value::Int(0)), Some(&"zero"));

        index.insert(Value::Float(f64::NAN), "nan");
        assert_eq!(index.get(&Value::Float(-f64::NAN)), Some(&"nan"));
    }

    #[test]
    fn test_value_as_number() {
        assert_eq!(Value::Int(3).as_number(), Some(3.0));
        assert_eq!(Value::Float(1.5).as_number(), Some(1.5));
        assert_eq!(Value::Bool(true).as_number(), Some(1.0));
        assert_eq!(Value::Null.as_number(), None);
        assert_eq!(Value::Str("3".into()).as_number(), None);
    }

    #[test]
    fn test_value_from_impls() {
        let v: Value = 42i64.into();
        assert_eq!(v.as_i64(), Some(42));

        let v: Value = "hello".into();
        assert_eq!(v.as_str(), Some("hello"));

        let v: Value = None::<i64>.into();
        assert!(v.is_null());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Int(7).to_string(), "7");
        assert_eq!(
            Value::Array(vec![Value::Int(1), Value::Str("a".into())]).to_string(),
            "[1,a]"
        );
    }

    #[test]
    fn test_value_json_round_trip() {
        let v: Value = serde_json::from_str(r#"{"a": 1, "b": [true, null, "x"]}"#).unwrap();
        match &v {
            Value::Object(fields) => {
                assert_eq!(fields.get("a"), Some(&Value::Int(1)));
            }
            other => panic!("expected object, got {other:?}"),
        }
        let text = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v, back);
    }
}
