//! Row-level change events.
//!
//! A consolidated delta batch is still multiset arithmetic: an update
//! travels as a delete of the old row plus an insert of the new one
//! under the same key. Subscribers want the row-level reading, so
//! `ChangeSet` pairs those up into modifications and reports everything
//! else as plain additions and removals.

use rill_core::{Key, Row};
use rill_ivm::{DeltaBatch, DeltaBatchExt};

/// Row-level changes derived from one output delta.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSet {
    pub added: Vec<(Key, Row)>,
    pub removed: Vec<(Key, Row)>,
    /// `(key, before, after)` for keys that were deleted and reinserted
    /// in the same tick.
    pub modified: Vec<(Key, Row, Row)>,
}

impl ChangeSet {
    /// Builds a change set from a delta batch.
    ///
    /// The batch is consolidated first, so offsetting entries cancel. A
    /// key carrying both a deletion and an insertion becomes one
    /// modification; multiplicities beyond one repeat the event.
    pub fn from_batch(batch: &DeltaBatch) -> Self {
        let consolidated = batch.clone().consolidated();

        let mut out = ChangeSet::default();
        let mut pending_deletes: Vec<(Key, Row, i32)> = Vec::new();
        let mut pending_inserts: Vec<(Key, Row, i32)> = Vec::new();

        for entry in consolidated {
            if entry.mult > 0 {
                pending_inserts.push((entry.key, entry.row, entry.mult));
            } else {
                pending_deletes.push((entry.key, entry.row, -entry.mult));
            }
        }

        for (key, before, mut weight) in pending_deletes {
            let matched = pending_inserts
                .iter()
                .position(|(k, _, w)| *k == key && *w > 0);
            if let Some(pos) = matched {
                let (_, after, avail) = &mut pending_inserts[pos];
                let paired = weight.min(*avail);
                for _ in 0..paired {
                    out.modified.push((key.clone(), before.clone(), after.clone()));
                }
                *avail -= paired;
                weight -= paired;
            }
            for _ in 0..weight {
                out.removed.push((key.clone(), before.clone()));
            }
        }
        for (key, row, weight) in pending_inserts {
            for _ in 0..weight {
                out.added.push((key.clone(), row.clone()));
            }
        }
        out
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Total number of row events.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_core::Value;
    use rill_ivm::Entry;

    fn row(n: i64) -> Row {
        Row::from_pairs([("n", Value::Int(n))])
    }

    #[test]
    fn test_plain_insert_and_delete() {
        let batch = vec![
            Entry::insert(Key::Int(1), row(10)),
            Entry::delete(Key::Int(2), row(20)),
        ];
        let cs = ChangeSet::from_batch(&batch);
        assert_eq!(cs.added, vec![(Key::Int(1), row(10))]);
        assert_eq!(cs.removed, vec![(Key::Int(2), row(20))]);
        assert!(cs.modified.is_empty());
    }

    #[test]
    fn test_update_pairs_into_modification() {
        let batch = vec![
            Entry::delete(Key::Int(1), row(10)),
            Entry::insert(Key::Int(1), row(11)),
        ];
        let cs = ChangeSet::from_batch(&batch);
        assert!(cs.added.is_empty());
        assert!(cs.removed.is_empty());
        assert_eq!(cs.modified, vec![(Key::Int(1), row(10), row(11))]);
    }

    #[test]
    fn test_offsetting_entries_cancel() {
        let batch = vec![
            Entry::insert(Key::Int(1), row(10)),
            Entry::delete(Key::Int(1), row(10)),
        ];
        let cs = ChangeSet::from_batch(&batch);
        assert!(cs.is_empty());
    }

    #[test]
    fn test_same_key_different_rows_without_pairing() {
        // two inserts under one key: both are additions, no modification
        let batch = vec![
            Entry::insert(Key::Int(1), row(10)),
            Entry::insert(Key::Int(1), row(11)),
        ];
        let cs = ChangeSet::from_batch(&batch);
        assert_eq!(cs.added.len(), 2);
        assert!(cs.modified.is_empty());
    }

    #[test]
    fn test_empty_batch() {
        assert!(ChangeSet::from_batch(&Vec::new()).is_empty());
        assert_eq!(ChangeSet::from_batch(&Vec::new()).len(), 0);
    }
}
