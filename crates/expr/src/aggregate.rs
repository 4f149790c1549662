//! Incremental aggregate accumulators.
//!
//! An accumulator folds `(value, multiplicity)` pairs and reports the
//! current aggregate. Negative multiplicities retract earlier values, so
//! a group never needs rescanning: `min`/`max`/`collect` keep an ordered
//! multiset (the retraction-safe alternative to tracking a single
//! extremum), `sum`/`avg`/`count` keep running totals.

use rill_core::Value;
use std::collections::BTreeMap;

/// An incremental aggregate over one group.
pub trait Accumulator {
    /// Folds one value with the given multiplicity. `Null` values are
    /// ignored by every built-in except `count`, which counts rows.
    fn apply(&mut self, value: &Value, mult: i32);

    /// The current aggregate value. Empty accumulators report `Null`
    /// (except `count`, which reports `0`).
    fn value(&self) -> Value;

    /// Whether negative multiplicities are handled exactly. The group
    /// operator rebuilds groups of a non-retractable accumulator from
    /// their retained rows instead of retracting.
    fn is_retractable(&self) -> bool {
        true
    }
}

/// Row count.
#[derive(Debug, Default)]
pub struct CountAcc {
    count: i64,
}

impl Accumulator for CountAcc {
    fn apply(&mut self, _value: &Value, mult: i32) {
        self.count += mult as i64;
    }

    fn value(&self) -> Value {
        Value::Int(self.count)
    }
}

/// Numeric sum. Integer inputs keep an integer sum; the result is a
/// float while float inputs are live in the group, and returns to
/// integer once every float contribution has been retracted.
#[derive(Debug, Default)]
pub struct SumAcc {
    int_sum: i64,
    float_sum: f64,
    /// Net multiplicity of float inputs. Zero means no live floats, so
    /// the sum stays an exact integer.
    float_count: i64,
}

impl Accumulator for SumAcc {
    fn apply(&mut self, value: &Value, mult: i32) {
        match value {
            Value::Int(i) | Value::Date(i) => {
                self.int_sum = self.int_sum.wrapping_add(i.wrapping_mul(mult as i64));
            }
            Value::Float(f) => {
                self.float_sum += f * mult as f64;
                self.float_count += mult as i64;
                if self.float_count == 0 {
                    self.float_sum = 0.0;
                }
            }
            Value::Bool(b) => self.int_sum += (*b as i64) * mult as i64,
            _ => {}
        }
    }

    fn value(&self) -> Value {
        if self.float_count != 0 {
            Value::Float(self.int_sum as f64 + self.float_sum)
        } else {
            Value::Int(self.int_sum)
        }
    }
}

/// Numeric average via running sum and count of non-null inputs.
#[derive(Debug, Default)]
pub struct AvgAcc {
    sum: f64,
    count: i64,
}

impl Accumulator for AvgAcc {
    fn apply(&mut self, value: &Value, mult: i32) {
        if let Some(n) = value.as_number() {
            self.sum += n * mult as f64;
            self.count += mult as i64;
        }
    }

    fn value(&self) -> Value {
        if self.count == 0 {
            Value::Null
        } else {
            Value::Float(self.sum / self.count as f64)
        }
    }
}

/// Which values an extremum accumulator admits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Admit {
    /// Anything comparable (numbers, dates, bools) except strings.
    Comparable,
    /// Strings only, compared lexicographically.
    Strings,
}

impl Admit {
    fn admits(self, value: &Value) -> bool {
        match self {
            Admit::Comparable => !matches!(value, Value::Null | Value::Str(_)),
            Admit::Strings => matches!(value, Value::Str(_)),
        }
    }
}

/// Retraction-safe minimum over an ordered multiset.
#[derive(Debug)]
pub struct MinAcc {
    entries: BTreeMap<Value, i64>,
    admit: Admit,
}

impl MinAcc {
    /// `min`: numbers, dates, and bools.
    pub fn numeric() -> Self {
        Self {
            entries: BTreeMap::new(),
            admit: Admit::Comparable,
        }
    }

    /// `minStr`: lexicographic over strings.
    pub fn strings() -> Self {
        Self {
            entries: BTreeMap::new(),
            admit: Admit::Strings,
        }
    }
}

impl Accumulator for MinAcc {
    fn apply(&mut self, value: &Value, mult: i32) {
        if self.admit.admits(value) {
            multiset_apply(&mut self.entries, value, mult);
        }
    }

    fn value(&self) -> Value {
        self.entries
            .first_key_value()
            .map(|(v, _)| v.clone())
            .unwrap_or(Value::Null)
    }
}

/// Retraction-safe maximum over an ordered multiset.
#[derive(Debug)]
pub struct MaxAcc {
    entries: BTreeMap<Value, i64>,
    admit: Admit,
}

impl MaxAcc {
    /// `max`: numbers, dates, and bools.
    pub fn numeric() -> Self {
        Self {
            entries: BTreeMap::new(),
            admit: Admit::Comparable,
        }
    }

    /// `maxStr`: lexicographic over strings.
    pub fn strings() -> Self {
        Self {
            entries: BTreeMap::new(),
            admit: Admit::Strings,
        }
    }
}

impl Accumulator for MaxAcc {
    fn apply(&mut self, value: &Value, mult: i32) {
        if self.admit.admits(value) {
            multiset_apply(&mut self.entries, value, mult);
        }
    }

    fn value(&self) -> Value {
        self.entries
            .last_key_value()
            .map(|(v, _)| v.clone())
            .unwrap_or(Value::Null)
    }
}

/// Collects non-null values into an ordered list, duplicates included.
#[derive(Debug, Default)]
pub struct CollectAcc {
    entries: BTreeMap<Value, i64>,
}

impl Accumulator for CollectAcc {
    fn apply(&mut self, value: &Value, mult: i32) {
        if !value.is_null() {
            multiset_apply(&mut self.entries, value, mult);
        }
    }

    fn value(&self) -> Value {
        let mut items = Vec::new();
        for (value, count) in &self.entries {
            for _ in 0..*count {
                items.push(value.clone());
            }
        }
        Value::Array(items)
    }
}

fn multiset_apply(entries: &mut BTreeMap<Value, i64>, value: &Value, mult: i32) {
    let count = entries.entry(value.clone()).or_insert(0);
    *count += mult as i64;
    if *count <= 0 {
        entries.remove(value);
    }
}
