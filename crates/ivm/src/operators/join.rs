//! Incremental equi-join operator.
//!
//! Each side keeps an index `join key → entity key → (row, weight)`.
//! Join maintenance is bilinear: an arriving delta with multiplicity `m`
//! joined against `n` stored copies emits `m * n`. The outer variants
//! additionally track, per stored row, the weighted count of matching
//! rows on the other side; a null-padded result row exists exactly while
//! that count is zero, so emissions happen on zero crossings.
//!
//! `Null` join keys are never indexed and never match, but a row with a
//! `Null` key still survives (padded) under its side's outer variant.

use crate::delta::{DeltaBatch, Entry};
use crate::graph::Operator;
use hashbrown::HashMap;
use rill_core::{Key, Row, Value};
use rill_expr::{EvalError, Evaluator};

/// Which unmatched rows survive the join.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    #[inline]
    fn pads_left(self) -> bool {
        matches!(self, JoinType::Left | JoinType::Full)
    }

    #[inline]
    fn pads_right(self) -> bool {
        matches!(self, JoinType::Right | JoinType::Full)
    }
}

#[derive(Default)]
struct Side {
    /// join key value → entity key → (row, weight)
    index: HashMap<Value, HashMap<Key, (Row, i32)>>,
    /// entity key → weighted count of matching rows on the other side
    match_count: HashMap<Key, i64>,
}

/// Incremental equi-join. Port 0 is the left input, port 1 the right.
pub struct JoinOp {
    kind: JoinType,
    left_key: Evaluator,
    right_key: Evaluator,
    left: Side,
    right: Side,
}

/// Marker for the absent side of a padded result key.
fn null_side() -> Key {
    Key::Composite(Vec::new())
}

fn merge_rows(left: &Row, right: &Row) -> Row {
    let mut merged = left.clone();
    merged.merge(right.clone());
    merged
}

impl JoinOp {
    pub fn new(kind: JoinType, left_key: Evaluator, right_key: Evaluator) -> Self {
        Self {
            kind,
            left_key,
            right_key,
            left: Side::default(),
            right: Side::default(),
        }
    }

    /// Processes a batch arriving on one side. `from_left` selects which
    /// index the batch belongs to; the other side is only read.
    fn process(&mut self, from_left: bool, batch: &DeltaBatch) -> Result<DeltaBatch, EvalError> {
        // Evaluate join keys for the whole batch before touching state.
        let key_eval = if from_left {
            &self.left_key
        } else {
            &self.right_key
        };
        let keyed: Vec<(Value, &Entry)> = batch
            .iter()
            .map(|entry| Ok((key_eval(&entry.row)?, entry)))
            .collect::<Result<_, EvalError>>()?;

        let pads_arriving = if from_left {
            self.kind.pads_left()
        } else {
            self.kind.pads_right()
        };
        let pads_other = if from_left {
            self.kind.pads_right()
        } else {
            self.kind.pads_left()
        };

        let mut out = Vec::new();
        for (jk, entry) in keyed {
            let (arriving, other) = if from_left {
                (&mut self.left, &mut self.right)
            } else {
                (&mut self.right, &mut self.left)
            };
            let m = entry.mult;

            let matches: Vec<(Key, Row, i32)> = if jk.is_null() {
                Vec::new()
            } else {
                other
                    .index
                    .get(&jk)
                    .map(|rows| {
                        rows.iter()
                            .map(|(k, (row, w))| (k.clone(), row.clone(), *w))
                            .collect()
                    })
                    .unwrap_or_default()
            };
            let total_matches: i64 = matches.iter().map(|(_, _, w)| *w as i64).sum();

            // Joined emissions: m copies against each stored copy.
            for (other_key, other_row, other_weight) in &matches {
                let (key, row) = if from_left {
                    (
                        Key::pair(entry.key.clone(), other_key.clone()),
                        merge_rows(&entry.row, other_row),
                    )
                } else {
                    (
                        Key::pair(other_key.clone(), entry.key.clone()),
                        merge_rows(other_row, &entry.row),
                    )
                };
                out.push(Entry::with_mult(key, row, m * other_weight));
            }

            // Padded row for the arriving side while it has no matches.
            if pads_arriving && total_matches == 0 {
                let key = if from_left {
                    Key::pair(entry.key.clone(), null_side())
                } else {
                    Key::pair(null_side(), entry.key.clone())
                };
                out.push(Entry::with_mult(key, entry.row.clone(), m));
            }

            // Maintain the arriving index.
            if !jk.is_null() {
                let rows = arriving.index.entry(jk.clone()).or_default();
                let slot = rows
                    .entry(entry.key.clone())
                    .or_insert_with(|| (entry.row.clone(), 0));
                slot.0 = entry.row.clone();
                slot.1 += m;
                if slot.1 == 0 {
                    rows.remove(&entry.key);
                    arriving.match_count.remove(&entry.key);
                    if rows.is_empty() {
                        arriving.index.remove(&jk);
                    }
                } else {
                    arriving.match_count.insert(entry.key.clone(), total_matches);
                }
            }

            // Maintain the other side's match counts; emit padded
            // transitions when a stored row gains or loses its last match.
            for (other_key, other_row, other_weight) in &matches {
                let old = other.match_count.get(other_key).copied().unwrap_or(0);
                let new = old + m as i64;
                if new == 0 {
                    other.match_count.remove(other_key);
                } else {
                    other.match_count.insert(other_key.clone(), new);
                }
                if pads_other {
                    let key = if from_left {
                        Key::pair(null_side(), other_key.clone())
                    } else {
                        Key::pair(other_key.clone(), null_side())
                    };
                    if old == 0 && new > 0 {
                        out.push(Entry::with_mult(key, other_row.clone(), -other_weight));
                    } else if old > 0 && new == 0 {
                        out.push(Entry::with_mult(key, other_row.clone(), *other_weight));
                    }
                }
            }
        }
        Ok(out)
    }
}

impl Operator for JoinOp {
    fn on_batch(&mut self, port: usize, batch: &DeltaBatch) -> Result<DeltaBatch, EvalError> {
        self.process(port == 0, batch)
    }
}
