//! Collections and the sync session contract.
//!
//! A collection is the materialized `key → row` state of one entity
//! set, fed by a sync adapter through a [`SyncSession`] and by
//! optimistic local writes. It is also a delta source: every visible
//! change is described as a [`DeltaBatch`] the caller publishes to
//! dependent live queries.
//!
//! Lifecycle: `Idle → Loading → Ready`, with `Error` reachable from
//! `Loading` or `Ready` and `Idle` reached again only by reset or
//! garbage collection. Sync writes buffer between `begin` and `commit`;
//! a partial batch is never observable.

use crate::error::{MutationError, SyncError};
use hashbrown::HashMap;
use rill_core::{Key, Row};
use rill_ivm::{DeltaBatch, DeltaBatchExt, Entry};
use rill_reactive::ChangeRouter;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// Where a collection sits in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectionStatus {
    Idle,
    Loading,
    Ready,
    Error,
}

/// One materialized entity set.
pub struct Collection {
    name: String,
    status: CollectionStatus,
    last_error: Option<String>,
    /// key → (row, net multiplicity). Keys never stay at weight ≤ 0.
    rows: HashMap<Key, (Row, i64)>,
    /// Open sync batch, buffered between `begin` and `commit`.
    pending: Option<DeltaBatch>,
    subscribers: usize,
    gc_time_ms: u64,
    /// Teardown deadline, armed while the subscriber count is zero.
    gc_deadline: Option<u64>,
    teardowns: Vec<Box<dyn Fn()>>,
}

impl Collection {
    pub fn new(name: impl Into<String>, gc_time_ms: u64) -> Self {
        Self {
            name: name.into(),
            status: CollectionStatus::Idle,
            last_error: None,
            rows: HashMap::new(),
            pending: None,
            subscribers: 0,
            gc_time_ms,
            gc_deadline: None,
            teardowns: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn status(&self) -> CollectionStatus {
        self.status
    }

    #[inline]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &Key) -> Option<&Row> {
        self.rows.get(key).map(|(row, _)| row)
    }

    /// The current state as an insert-only delta, used to seed a freshly
    /// compiled query graph.
    pub fn snapshot(&self) -> DeltaBatch {
        self.rows
            .iter()
            .map(|(key, (row, _))| Entry::insert(key.clone(), row.clone()))
            .collect()
    }

    /// `Idle → Loading`. Returns false (and does nothing) when a sync is
    /// already running or complete.
    pub fn start_sync(&mut self) -> bool {
        if self.status != CollectionStatus::Idle {
            return false;
        }
        self.status = CollectionStatus::Loading;
        true
    }

    /// Registered callbacks run when garbage collection tears this
    /// collection down.
    pub fn on_teardown(&mut self, callback: impl Fn() + 'static) {
        self.teardowns.push(Box::new(callback));
    }

    // ---- sync batch contract ------------------------------------------

    pub fn begin(&mut self) -> Result<(), SyncError> {
        if self.pending.is_some() {
            return Err(SyncError::BatchAlreadyOpen);
        }
        self.pending = Some(Vec::new());
        Ok(())
    }

    pub fn write(&mut self, entry: Entry) -> Result<(), SyncError> {
        match &mut self.pending {
            Some(batch) => {
                batch.push(entry);
                Ok(())
            }
            None => Err(SyncError::WriteOutsideBatch),
        }
    }

    /// Applies the buffered batch atomically and returns the visible
    /// delta. The first successful commit promotes `Loading → Ready`.
    pub fn commit(&mut self) -> Result<DeltaBatch, SyncError> {
        let batch = self.pending.take().ok_or(SyncError::CommitWithoutBegin)?;
        let mut out = Vec::new();
        for entry in batch.consolidated() {
            out.extend(self.apply_weighted(entry));
        }
        if self.status == CollectionStatus::Loading {
            self.status = CollectionStatus::Ready;
        }
        debug!(collection = %self.name, changes = out.len(), "sync commit");
        Ok(out)
    }

    /// `Loading → Ready` without a delta, for adapters whose initial
    /// state is empty.
    pub fn mark_ready(&mut self) {
        if self.status == CollectionStatus::Loading {
            self.status = CollectionStatus::Ready;
        }
    }

    /// Records an adapter failure. Materialized rows stay readable.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.status = CollectionStatus::Error;
        self.last_error = Some(message.into());
        self.pending = None;
    }

    /// Explicit reset to `Idle`, clearing state and any recorded error.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.pending = None;
        self.last_error = None;
        self.status = CollectionStatus::Idle;
    }

    /// Applies one weighted entry to the materialized map, returning the
    /// visible row changes. A net weight ≤ 0 deletes the key; a positive
    /// write upserts the row. Re-writing an identical row is invisible,
    /// which makes reconciliation after a commit idempotent per key.
    fn apply_weighted(&mut self, entry: Entry) -> DeltaBatch {
        let Entry { key, row, mult } = entry;
        if !self.rows.contains_key(&key) {
            if mult > 0 {
                self.rows.insert(key.clone(), (row.clone(), mult as i64));
                return vec![Entry::insert(key, row)];
            }
            return Vec::new();
        }

        let mut emptied = false;
        let mut replaced = None;
        if let Some((current, weight)) = self.rows.get_mut(&key) {
            *weight += mult as i64;
            if *weight <= 0 {
                emptied = true;
            } else if mult > 0 && *current != row {
                replaced = Some(std::mem::replace(current, row.clone()));
            }
        }
        if emptied {
            return match self.rows.remove(&key) {
                Some((old, _)) => vec![Entry::delete(key, old)],
                None => Vec::new(),
            };
        }
        match replaced {
            Some(old) => vec![Entry::delete(key.clone(), old), Entry::insert(key, row)],
            None => Vec::new(),
        }
    }

    // ---- optimistic local writes --------------------------------------

    /// Inserts a new row. Fails on an existing key.
    pub fn insert(&mut self, key: Key, row: Row) -> Result<DeltaBatch, MutationError> {
        if self.rows.contains_key(&key) {
            return Err(MutationError::DuplicateKey(key));
        }
        self.rows.insert(key.clone(), (row.clone(), 1));
        Ok(vec![Entry::insert(key, row)])
    }

    /// Replaces an existing row, returning the prior row and the visible
    /// delta.
    pub fn update(&mut self, key: Key, row: Row) -> Result<(Row, DeltaBatch), MutationError> {
        let Some((current, _)) = self.rows.get_mut(&key) else {
            return Err(MutationError::MissingRow(key));
        };
        let before = current.clone();
        if before == row {
            return Ok((before, Vec::new()));
        }
        *current = row.clone();
        Ok((
            before.clone(),
            vec![Entry::delete(key.clone(), before), Entry::insert(key, row)],
        ))
    }

    /// Removes a row, returning it and the visible delta.
    pub fn delete(&mut self, key: Key) -> Result<(Row, DeltaBatch), MutationError> {
        match self.rows.remove(&key) {
            Some((row, _)) => Ok((row.clone(), vec![Entry::delete(key, row)])),
            None => Err(MutationError::MissingRow(key)),
        }
    }

    /// Restores a key to a prior state, used by transaction rollback.
    /// `None` means the key did not exist before.
    pub fn restore(&mut self, key: Key, before: Option<Row>) -> DeltaBatch {
        let mut out = Vec::new();
        if let Some((current, _)) = self.rows.get(&key) {
            if before.as_ref() == Some(current) {
                return out;
            }
            out.push(Entry::delete(key.clone(), current.clone()));
            self.rows.remove(&key);
        }
        if let Some(row) = before {
            self.rows.insert(key.clone(), (row.clone(), 1));
            out.push(Entry::insert(key, row));
        }
        out
    }

    // ---- subscribers and garbage collection ---------------------------

    /// Attaches a subscriber, cancelling any pending teardown deadline.
    pub fn subscribe(&mut self) {
        self.subscribers += 1;
        self.gc_deadline = None;
    }

    /// Detaches a subscriber. When the last one leaves, the teardown
    /// deadline is armed at `now + gc_time`.
    pub fn unsubscribe(&mut self, now: u64) {
        self.subscribers = self.subscribers.saturating_sub(1);
        if self.subscribers == 0 {
            self.gc_deadline = Some(now + self.gc_time_ms);
        }
    }

    #[inline]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
    }

    /// Tears the collection down if its deadline has elapsed with no
    /// subscriber. Runs teardown callbacks, clears state, and returns to
    /// `Idle`. Returns the retraction of every materialized row, which
    /// the caller publishes so dependent query graphs unwind; `None`
    /// means the deadline has not elapsed.
    pub fn run_gc(&mut self, now: u64) -> Option<DeltaBatch> {
        let due = self.subscribers == 0 && self.gc_deadline.is_some_and(|d| now >= d);
        if !due {
            return None;
        }
        for teardown in &self.teardowns {
            teardown();
        }
        let retraction = self
            .rows
            .iter()
            .map(|(key, (row, _))| Entry::delete(key.clone(), row.clone()))
            .collect();
        debug!(collection = %self.name, "gc teardown");
        self.gc_deadline = None;
        self.reset();
        Some(retraction)
    }
}

/// Cloneable handle a sync adapter drives. Writes buffer in the
/// collection; `commit` applies them atomically and publishes the
/// visible delta to dependent queries.
#[derive(Clone)]
pub struct SyncSession {
    collection: Rc<RefCell<Collection>>,
    router: Rc<RefCell<ChangeRouter>>,
}

impl SyncSession {
    pub(crate) fn new(
        collection: Rc<RefCell<Collection>>,
        router: Rc<RefCell<ChangeRouter>>,
    ) -> Self {
        Self { collection, router }
    }

    pub fn begin(&self) -> Result<(), SyncError> {
        self.collection.borrow_mut().begin()
    }

    pub fn write(&self, entry: Entry) -> Result<(), SyncError> {
        self.collection.borrow_mut().write(entry)
    }

    pub fn commit(&self) -> Result<(), SyncError> {
        let (name, delta) = {
            let mut collection = self.collection.borrow_mut();
            let delta = collection.commit()?;
            (collection.name().to_string(), delta)
        };
        if !delta.is_empty() {
            self.router.borrow_mut().publish(&name, &delta);
        }
        Ok(())
    }

    pub fn mark_ready(&self) {
        self.collection.borrow_mut().mark_ready();
    }

    pub fn error(&self, message: impl Into<String>) {
        self.collection.borrow_mut().set_error(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_core::Value;

    fn row(text: &str) -> Row {
        Row::from_pairs([("text", Value::from(text))])
    }

    #[test]
    fn test_lifecycle_idle_loading_ready() {
        let mut c = Collection::new("todos", 100);
        assert_eq!(c.status(), CollectionStatus::Idle);
        assert!(c.start_sync());
        assert_eq!(c.status(), CollectionStatus::Loading);
        assert!(!c.start_sync());

        c.begin().unwrap();
        c.write(Entry::insert(Key::Int(1), row("a"))).unwrap();
        c.commit().unwrap();
        assert_eq!(c.status(), CollectionStatus::Ready);
        assert_eq!(c.get(&Key::Int(1)), Some(&row("a")));
    }

    #[test]
    fn test_writes_invisible_until_commit() {
        let mut c = Collection::new("todos", 100);
        c.start_sync();
        c.begin().unwrap();
        c.write(Entry::insert(Key::Int(1), row("a"))).unwrap();
        assert!(c.is_empty());
        assert_eq!(c.status(), CollectionStatus::Loading);

        let delta = c.commit().unwrap();
        assert_eq!(delta, vec![Entry::insert(Key::Int(1), row("a"))]);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_batch_protocol_errors() {
        let mut c = Collection::new("todos", 100);
        assert_eq!(
            c.write(Entry::insert(Key::Int(1), row("a"))),
            Err(SyncError::WriteOutsideBatch)
        );
        assert_eq!(c.commit().unwrap_err(), SyncError::CommitWithoutBegin);
        c.begin().unwrap();
        assert_eq!(c.begin().unwrap_err(), SyncError::BatchAlreadyOpen);
    }

    #[test]
    fn test_weighted_apply_deletes_at_zero() {
        let mut c = Collection::new("todos", 100);
        c.begin().unwrap();
        c.write(Entry::insert(Key::Int(1), row("a"))).unwrap();
        c.commit().unwrap();

        c.begin().unwrap();
        c.write(Entry::delete(Key::Int(1), row("a"))).unwrap();
        let delta = c.commit().unwrap();
        assert_eq!(delta, vec![Entry::delete(Key::Int(1), row("a"))]);
        assert!(c.is_empty());
    }

    #[test]
    fn test_rewrite_of_identical_row_is_invisible() {
        let mut c = Collection::new("todos", 100);
        c.begin().unwrap();
        c.write(Entry::insert(Key::Int(1), row("a"))).unwrap();
        c.commit().unwrap();

        // reconciliation after an optimistic write re-delivers the row
        c.begin().unwrap();
        c.write(Entry::insert(Key::Int(1), row("a"))).unwrap();
        let delta = c.commit().unwrap();
        assert!(delta.is_empty());
        assert_eq!(c.get(&Key::Int(1)), Some(&row("a")));
    }

    #[test]
    fn test_upsert_emits_update_delta() {
        let mut c = Collection::new("todos", 100);
        c.begin().unwrap();
        c.write(Entry::insert(Key::Int(1), row("a"))).unwrap();
        c.commit().unwrap();

        c.begin().unwrap();
        c.write(Entry::insert(Key::Int(1), row("b"))).unwrap();
        let delta = c.commit().unwrap();
        assert_eq!(
            delta,
            vec![
                Entry::delete(Key::Int(1), row("a")),
                Entry::insert(Key::Int(1), row("b")),
            ]
        );
    }

    #[test]
    fn test_optimistic_writes() {
        let mut c = Collection::new("todos", 100);
        c.insert(Key::Int(1), row("a")).unwrap();
        assert_eq!(
            c.insert(Key::Int(1), row("b")).unwrap_err(),
            MutationError::DuplicateKey(Key::Int(1))
        );

        let (before, delta) = c.update(Key::Int(1), row("b")).unwrap();
        assert_eq!(before, row("a"));
        assert_eq!(delta.len(), 2);

        let (removed, _) = c.delete(Key::Int(1)).unwrap();
        assert_eq!(removed, row("b"));
        assert_eq!(
            c.update(Key::Int(1), row("c")).unwrap_err(),
            MutationError::MissingRow(Key::Int(1))
        );
    }

    #[test]
    fn test_restore_round_trip() {
        let mut c = Collection::new("todos", 100);
        c.insert(Key::Int(1), row("a")).unwrap();
        let (before, _) = c.update(Key::Int(1), row("b")).unwrap();

        let delta = c.restore(Key::Int(1), Some(before));
        assert_eq!(c.get(&Key::Int(1)), Some(&row("a")));
        assert_eq!(delta.len(), 2);

        // restoring a key that never existed removes it again
        c.restore(Key::Int(1), None);
        assert!(c.is_empty());
    }

    #[test]
    fn test_gc_waits_for_deadline() {
        let mut c = Collection::new("todos", 100);
        c.start_sync();
        c.begin().unwrap();
        c.write(Entry::insert(Key::Int(1), row("a"))).unwrap();
        c.commit().unwrap();

        c.subscribe();
        c.unsubscribe(1000);
        assert!(c.run_gc(1050).is_none());
        assert_eq!(c.status(), CollectionStatus::Ready);

        // teardown retracts every materialized row
        let retraction = c.run_gc(1100).unwrap();
        assert_eq!(retraction, vec![Entry::delete(Key::Int(1), row("a"))]);
        assert_eq!(c.status(), CollectionStatus::Idle);
        assert!(c.is_empty());
    }

    #[test]
    fn test_resubscribe_cancels_gc() {
        let mut c = Collection::new("todos", 100);
        c.subscribe();
        c.unsubscribe(1000);
        c.subscribe();
        assert!(c.run_gc(2000).is_none());
    }

    #[test]
    fn test_teardown_callbacks_run_on_gc() {
        use std::cell::Cell;
        let fired = Rc::new(Cell::new(false));
        let mut c = Collection::new("todos", 10);
        let flag = fired.clone();
        c.on_teardown(move || flag.set(true));
        c.unsubscribe(0);
        assert!(c.run_gc(10).is_some());
        assert!(fired.get());
    }

    #[test]
    fn test_error_keeps_rows_readable() {
        let mut c = Collection::new("todos", 100);
        c.start_sync();
        c.begin().unwrap();
        c.write(Entry::insert(Key::Int(1), row("a"))).unwrap();
        c.commit().unwrap();

        c.set_error("adapter unreachable");
        assert_eq!(c.status(), CollectionStatus::Error);
        assert_eq!(c.last_error(), Some("adapter unreachable"));
        assert_eq!(c.get(&Key::Int(1)), Some(&row("a")));

        c.reset();
        assert_eq!(c.status(), CollectionStatus::Idle);
        assert!(c.is_empty());
    }
}
