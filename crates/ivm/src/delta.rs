//! Keyed multiset deltas.
//!
//! A delta is a row change with a signed multiplicity: `+1` inserts,
//! `-1` deletes, and an update travels as a delete of the old row plus
//! an insert of the new one under the same key. Multiplicities add, so
//! batches can be consolidated without losing information.

use hashbrown::HashMap;
use rill_core::{Key, Row};

/// One keyed row change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub key: Key,
    pub row: Row,
    pub mult: i32,
}

impl Entry {
    /// An insertion (multiplicity +1).
    pub fn insert(key: Key, row: Row) -> Self {
        Self { key, row, mult: 1 }
    }

    /// A deletion (multiplicity -1). The row is the row being removed,
    /// so stateful operators can retract exactly what they stored.
    pub fn delete(key: Key, row: Row) -> Self {
        Self { key, row, mult: -1 }
    }

    /// An entry with an explicit multiplicity.
    pub fn with_mult(key: Key, row: Row, mult: i32) -> Self {
        Self { key, row, mult }
    }

    /// Returns this entry with its multiplicity negated.
    pub fn negate(&self) -> Entry {
        Entry {
            key: self.key.clone(),
            row: self.row.clone(),
            mult: -self.mult,
        }
    }

    #[inline]
    pub fn is_insert(&self) -> bool {
        self.mult > 0
    }

    #[inline]
    pub fn is_delete(&self) -> bool {
        self.mult < 0
    }
}

/// A batch of deltas produced by one tick.
pub type DeltaBatch = Vec<Entry>;

/// Batch-level helpers.
pub trait DeltaBatchExt {
    /// Sums multiplicities per `(key, row)` pair and drops zeros,
    /// keeping first-seen order.
    fn consolidated(self) -> DeltaBatch;

    /// Net change in row count carried by this batch.
    fn net_count(&self) -> i64;
}

impl DeltaBatchExt for DeltaBatch {
    fn consolidated(self) -> DeltaBatch {
        let mut order: Vec<(Key, Row)> = Vec::new();
        let mut sums: HashMap<(Key, Row), i32> = HashMap::new();
        for entry in self {
            let slot = (entry.key, entry.row);
            match sums.get_mut(&slot) {
                Some(mult) => *mult += entry.mult,
                None => {
                    sums.insert(slot.clone(), entry.mult);
                    order.push(slot);
                }
            }
        }
        order
            .into_iter()
            .filter_map(|slot| {
                let mult = sums[&slot];
                if mult == 0 {
                    None
                } else {
                    Some(Entry::with_mult(slot.0, slot.1, mult))
                }
            })
            .collect()
    }

    fn net_count(&self) -> i64 {
        self.iter().map(|e| e.mult as i64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_core::Value;

    fn row(n: i64) -> Row {
        Row::from_pairs([("n", Value::Int(n))])
    }

    #[test]
    fn test_entry_constructors() {
        let e = Entry::insert(Key::Int(1), row(1));
        assert!(e.is_insert());
        assert!(e.negate().is_delete());
        assert_eq!(Entry::delete(Key::Int(1), row(1)).mult, -1);
    }

    #[test]
    fn test_consolidation_cancels() {
        let batch = vec![
            Entry::insert(Key::Int(1), row(1)),
            Entry::insert(Key::Int(2), row(2)),
            Entry::delete(Key::Int(1), row(1)),
        ];
        let out = batch.consolidated();
        assert_eq!(out, vec![Entry::insert(Key::Int(2), row(2))]);
    }

    #[test]
    fn test_consolidation_keeps_distinct_rows_per_key() {
        // an update: delete old row, insert new row, same key
        let batch = vec![
            Entry::delete(Key::Int(1), row(1)),
            Entry::insert(Key::Int(1), row(2)),
        ];
        let out = batch.clone().consolidated();
        assert_eq!(out, batch);
        assert_eq!(out.net_count(), 0);
    }

    #[test]
    fn test_net_count() {
        let batch = vec![
            Entry::insert(Key::Int(1), row(1)),
            Entry::insert(Key::Int(2), row(2)),
            Entry::delete(Key::Int(3), row(3)),
        ];
        assert_eq!(batch.net_count(), 1);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn arb_batch() -> impl Strategy<Value = DeltaBatch> {
            proptest::collection::vec(
                (0i64..8, -3i32..=3).prop_map(|(k, mult)| Entry::with_mult(
                    Key::Int(k),
                    row(k),
                    mult,
                )),
                0..64,
            )
        }

        proptest! {
            #[test]
            fn consolidation_preserves_net_count(batch in arb_batch()) {
                let net = batch.net_count();
                let consolidated = batch.consolidated();
                prop_assert_eq!(consolidated.net_count(), net);
            }

            #[test]
            fn consolidation_is_idempotent(batch in arb_batch()) {
                let once = batch.consolidated();
                let twice = once.clone().consolidated();
                prop_assert_eq!(once, twice);
            }

            #[test]
            fn consolidation_has_unique_slots(batch in arb_batch()) {
                let out = batch.consolidated();
                for (i, a) in out.iter().enumerate() {
                    prop_assert!(a.mult != 0);
                    for b in &out[i + 1..] {
                        prop_assert!(a.key != b.key || a.row != b.row);
                    }
                }
            }
        }
    }
}
