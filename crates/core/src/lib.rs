//! Rill Core - foundational types for the Rill incremental query engine.
//!
//! This crate provides the data model shared by every other Rill crate:
//!
//! - `Value`: Runtime values stored in collection rows (Null, Bool, Int,
//!   Float, Str, Date, Array, Object)
//! - `Row`: An ordered mapping of field names to values, with path access
//!   for namespaced rows produced by joins
//! - `Key`: The identity of a row within a collection (integer, string, or
//!   composite)
//! - `pattern`: SQL LIKE / ILIKE pattern matching, compiled once and
//!   matched many times
//!
//! # Example
//!
//! ```rust
//! use rill_core::{Key, Row, Value};
//!
//! let row = Row::from_pairs([
//!     ("id", Value::Int(1)),
//!     ("name", Value::Str("Alice".into())),
//! ]);
//!
//! assert_eq!(row.get("name"), Some(&Value::Str("Alice".into())));
//! assert_eq!(Key::of(&Value::Int(1)), Key::Int(1));
//! ```

mod key;
pub mod pattern;
mod row;
mod value;

pub use key::Key;
pub use row::Row;
pub use value::Value;
