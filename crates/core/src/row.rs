//! Row structure for Rill collections.
//!
//! A `Row` is an ordered mapping from field name to [`Value`]. Join
//! operators produce namespaced rows (`{alias: {…}, alias2: {…}}`), which
//! is why field access comes in both flat (`get`) and path (`get_path`)
//! flavors.

use crate::value::Value;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A row of named values.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    fields: BTreeMap<String, Value>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a row from (name, value) pairs.
    pub fn from_pairs<N, I>(pairs: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, Value)>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }

    /// Gets a field by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Walks a field path through nested `Object` values.
    ///
    /// Returns `None` when any segment is missing or lands on a
    /// non-object mid-path.
    pub fn get_path(&self, path: &[String]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.fields.get(first.as_str())?;
        for segment in rest {
            match current {
                Value::Object(fields) => current = fields.get(segment.as_str())?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Sets a field, replacing any existing value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    /// Removes a field, returning its value if present.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Wraps this row as a single `alias → Object` field, the shape join
    /// inputs take so both sides stay addressable in expressions.
    pub fn namespaced(self, alias: &str) -> Row {
        let mut fields = BTreeMap::new();
        fields.insert(alias.to_string(), Value::Object(self.fields));
        Row { fields }
    }

    /// Inverse of [`Row::namespaced`]: extracts the row stored under
    /// `alias`, if that field is an object.
    pub fn unwrap_alias(&self, alias: &str) -> Option<Row> {
        match self.fields.get(alias) {
            Some(Value::Object(fields)) => Some(Row {
                fields: fields.clone(),
            }),
            _ => None,
        }
    }

    /// Merges another row's fields into this one. Fields from `other`
    /// win on name collision.
    pub fn merge(&mut self, other: Row) {
        self.fields.extend(other.fields);
    }

    /// Iterates fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Returns the number of fields in this row.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if this row has no fields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Converts this row into an `Object` value.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl From<BTreeMap<String, Value>> for Row {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Row { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Row {
        Row::from_pairs([
            ("id", Value::Int(1)),
            ("name", Value::Str("Alice".into())),
        ])
    }

    #[test]
    fn test_row_get() {
        let row = person();
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
        assert_eq!(row.get("name"), Some(&Value::Str("Alice".into())));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_row_set_and_remove() {
        let mut row = person();
        row.set("id", Value::Int(100));
        assert_eq!(row.get("id"), Some(&Value::Int(100)));
        assert_eq!(row.remove("name"), Some(Value::Str("Alice".into())));
        assert_eq!(row.get("name"), None);
    }

    #[test]
    fn test_row_namespacing() {
        let row = person().namespaced("p");
        assert!(row.get("id").is_none());
        assert_eq!(
            row.get_path(&["p".into(), "id".into()]),
            Some(&Value::Int(1))
        );
        assert_eq!(row.unwrap_alias("p"), Some(person()));
        assert_eq!(row.unwrap_alias("q"), None);
    }

    #[test]
    fn test_row_get_path_non_object() {
        let row = person();
        assert_eq!(row.get_path(&["id".into()]), Some(&Value::Int(1)));
        assert_eq!(row.get_path(&["id".into(), "x".into()]), None);
        assert_eq!(row.get_path(&[]), None);
    }

    #[test]
    fn test_row_merge() {
        let mut left = person().namespaced("p");
        let right = Row::from_pairs([("team", Value::Str("red".into()))]).namespaced("t");
        left.merge(right);
        assert!(left.get("p").is_some());
        assert!(left.get("t").is_some());
    }

    #[test]
    fn test_row_from_json() {
        let row: Row = serde_json::from_str(r#"{"id": 7, "active": true}"#).unwrap();
        assert_eq!(row.get("id"), Some(&Value::Int(7)));
        assert_eq!(row.get("active"), Some(&Value::Bool(true)));
    }
}
