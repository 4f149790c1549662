//! Incremental order-by with an optional offset/limit window.
//!
//! Keeps every input row in a list sorted by (comparator, key) and emits
//! membership diffs of the `[offset, offset+limit)` window. Each emitted
//! row carries a fractional order index string under
//! [`ORDER_INDEX_FIELD`]: midpoint strings over `a..z` that never end in
//! `a`, so a new index always fits between two neighbors. Rows that keep
//! their place keep their index; only movers, arrivals, and departures
//! produce deltas.

use crate::delta::{DeltaBatch, Entry};
use crate::graph::Operator;
use hashbrown::HashMap;
use rill_core::{Key, Row, Value};
use rill_expr::{EvalError, RowComparator};
use std::cmp::Ordering;

/// Field name the window's order index is attached under.
pub const ORDER_INDEX_FIELD: &str = "_orderByIndex";

/// Incremental order-by + top-K window.
pub struct TopKOp {
    cmp: RowComparator,
    offset: usize,
    limit: Option<usize>,
    /// All retained rows, sorted by (comparator, key).
    rows: Vec<(Key, Row)>,
    /// Current window: key → (row without index, assigned index).
    window: HashMap<Key, (Row, String)>,
}

fn with_index(row: &Row, index: &str) -> Row {
    let mut out = row.clone();
    out.set(ORDER_INDEX_FIELD, Value::Str(index.to_string()));
    out
}

impl TopKOp {
    pub fn new(cmp: RowComparator, offset: usize, limit: Option<usize>) -> Self {
        Self {
            cmp,
            offset,
            limit,
            rows: Vec::new(),
            window: HashMap::new(),
        }
    }

    fn insert_sorted(&mut self, key: Key, row: Row) {
        let pos = self.rows.partition_point(|(k, r)| {
            match (self.cmp)(r, &row) {
                Ordering::Less => true,
                Ordering::Equal => *k < key,
                Ordering::Greater => false,
            }
        });
        self.rows.insert(pos, (key, row));
    }

    fn remove_by_key(&mut self, key: &Key) {
        if let Some(pos) = self.rows.iter().position(|(k, _)| k == key) {
            self.rows.remove(pos);
        }
    }

    fn current_window(&self) -> Vec<(Key, Row)> {
        let start = self.offset.min(self.rows.len());
        let end = match self.limit {
            Some(limit) => (start + limit).min(self.rows.len()),
            None => self.rows.len(),
        };
        self.rows[start..end].to_vec()
    }

    /// Walks the new window in order, keeping indexes that still sit in
    /// increasing position and assigning midpoints to everything else.
    /// Returns `None` when a midpoint cannot be computed, which sends
    /// the caller down the full-reindex path.
    fn diff_window(
        &self,
        new_window: &[(Key, Row)],
        out: &mut DeltaBatch,
        next: &mut HashMap<Key, (Row, String)>,
    ) -> Option<()> {
        let mut prev = String::new();
        for (i, (key, row)) in new_window.iter().enumerate() {
            let old = self.window.get(key);
            if let Some((old_row, old_index)) = old {
                if old_index.as_str() > prev.as_str() {
                    // position still valid; re-emit only if the row changed
                    if old_row != row {
                        out.push(Entry::delete(key.clone(), with_index(old_row, old_index)));
                        out.push(Entry::insert(key.clone(), with_index(row, old_index)));
                    }
                    prev = old_index.clone();
                    next.insert(key.clone(), (row.clone(), old_index.clone()));
                    continue;
                }
            }

            // needs a fresh index between prev and the nearest kept
            // index further down the window
            let bound = new_window[i + 1..]
                .iter()
                .find_map(|(k, _)| {
                    self.window
                        .get(k)
                        .map(|(_, idx)| idx.clone())
                        .filter(|idx| idx.as_str() > prev.as_str())
                })
                .unwrap_or_default();
            let index = midpoint(&prev, &bound)?;

            if let Some((old_row, old_index)) = old {
                out.push(Entry::delete(key.clone(), with_index(old_row, old_index)));
            }
            out.push(Entry::insert(key.clone(), with_index(row, &index)));
            prev = index.clone();
            next.insert(key.clone(), (row.clone(), index));
        }
        Some(())
    }

    /// Reassigns evenly spread indexes to the whole window.
    fn reindex(
        &self,
        new_window: &[(Key, Row)],
        out: &mut DeltaBatch,
        next: &mut HashMap<Key, (Row, String)>,
    ) {
        for (key, (row, index)) in &self.window {
            if new_window.iter().any(|(k, _)| k == key) {
                out.push(Entry::delete(key.clone(), with_index(row, index)));
            }
        }
        let indexes = spread_indexes(new_window.len());
        for ((key, row), index) in new_window.iter().zip(indexes) {
            out.push(Entry::insert(key.clone(), with_index(row, &index)));
            next.insert(key.clone(), (row.clone(), index));
        }
    }
}

impl Operator for TopKOp {
    fn on_batch(&mut self, _port: usize, batch: &DeltaBatch) -> Result<DeltaBatch, EvalError> {
        for entry in batch {
            if entry.mult > 0 {
                for _ in 0..entry.mult {
                    self.insert_sorted(entry.key.clone(), entry.row.clone());
                }
            } else {
                for _ in 0..(-entry.mult) {
                    self.remove_by_key(&entry.key);
                }
            }
        }

        let new_window = self.current_window();
        let mut out = Vec::new();

        // departures first, so downstream sees delete-before-insert
        for (key, (row, index)) in &self.window {
            if !new_window.iter().any(|(k, _)| k == key) {
                out.push(Entry::delete(key.clone(), with_index(row, index)));
            }
        }

        let mut next = HashMap::new();
        if self
            .diff_window(&new_window, &mut out, &mut next)
            .is_none()
        {
            out.truncate(0);
            for (key, (row, index)) in &self.window {
                if !new_window.iter().any(|(k, _)| k == key) {
                    out.push(Entry::delete(key.clone(), with_index(row, index)));
                }
            }
            next = HashMap::new();
            self.reindex(&new_window, &mut out, &mut next);
        }
        self.window = next;
        Ok(out)
    }
}

// -------------------------------------------------------------------------
// Fractional order indexes
// -------------------------------------------------------------------------

/// A string strictly between `low` and `high` over the digits `a..=z`,
/// never ending in `a`. An empty `low` is the lower bound, an empty
/// `high` is unbounded above. Returns `None` when `low >= high`.
fn midpoint(low: &str, high: &str) -> Option<String> {
    if !high.is_empty() && low >= high {
        return None;
    }
    let lo = low.as_bytes();
    let hi = high.as_bytes();

    let mut n = 0;
    while n < lo.len() && n < hi.len() && lo[n] == hi[n] {
        n += 1;
    }
    if n > 0 {
        let rest = midpoint(&low[n..], &high[n..])?;
        return Some(format!("{}{}", &low[..n], rest));
    }

    let digit_low = lo.first().map(|b| b - b'a').unwrap_or(0) as u8;
    let digit_high = if hi.is_empty() { 26 } else { hi[0] - b'a' };

    if digit_high == digit_low {
        // only reachable with an empty low and a high starting in 'a':
        // recurse under that digit
        if hi.len() > 1 {
            let rest = midpoint("", &high[1..])?;
            return Some(format!("a{rest}"));
        }
        return None;
    }

    if digit_high - digit_low > 1 {
        let mid = (digit_low + digit_high) / 2;
        return Some(((b'a' + mid) as char).to_string());
    }

    // consecutive leading digits
    if hi.len() > 1 {
        // high's first digit alone sits strictly between
        return Some(((b'a' + digit_high) as char).to_string());
    }

    // extend low
    let rest = midpoint(if lo.is_empty() { "" } else { &low[1..] }, "")?;
    Some(format!("{}{}", (b'a' + digit_low) as char, rest))
}

/// Evenly spread fixed-width indexes over digits `b..=z` for `n` rows.
fn spread_indexes(n: usize) -> Vec<String> {
    let mut width = 1usize;
    let mut capacity = 25u128;
    while capacity < n as u128 {
        width += 1;
        capacity *= 25;
    }
    (0..n)
        .map(|i| {
            let mut slot = i as u128 * capacity / n.max(1) as u128;
            let mut digits = vec![b'b'; width];
            for j in (0..width).rev() {
                digits[j] = b'b' + (slot % 25) as u8;
                slot /= 25;
            }
            String::from_utf8(digits).expect("ascii digits")
        })
        .collect()
}
