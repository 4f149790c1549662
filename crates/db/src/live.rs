//! Live queries.
//!
//! A live query owns a compiled dataflow graph and materializes its
//! output rows. It is seeded once from source snapshots, then kept
//! current by source deltas arriving through the change router. Its
//! status is derived from its sources; a tick evaluation error parks it
//! in `Error` while the last good rows stay readable.

use crate::clock::Clock;
use crate::collection::{Collection, CollectionStatus};
use hashbrown::HashMap;
use rill_core::{Key, Row, Value};
use rill_ivm::{DataflowGraph, DeltaBatch, ORDER_INDEX_FIELD};
use rill_query::CompiledQuery;
use rill_reactive::{ChangeSet, DeltaSink, SubscriptionId, SubscriptionManager};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::warn;

/// A continuously maintained query result.
pub struct LiveQuery {
    graph: DataflowGraph,
    sources: Vec<Rc<RefCell<Collection>>>,
    /// key → (row, net multiplicity) of the current result.
    rows: HashMap<Key, (Row, i64)>,
    error: Option<String>,
    subscriptions: SubscriptionManager,
    clock: Rc<dyn Clock>,
}

impl LiveQuery {
    pub(crate) fn new(
        compiled: CompiledQuery,
        sources: Vec<Rc<RefCell<Collection>>>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        Self {
            graph: compiled.graph,
            sources,
            rows: HashMap::new(),
            error: None,
            subscriptions: SubscriptionManager::new(),
            clock,
        }
    }

    /// Feeds a source snapshot through the graph without notifying
    /// subscribers; used once at construction.
    pub(crate) fn seed(&mut self, source: &str, snapshot: &DeltaBatch) {
        match self.graph.push(source, snapshot) {
            Ok(output) => self.apply(&output),
            Err(error) => {
                warn!(source, %error, "seed tick failed");
                self.error = Some(error.to_string());
            }
        }
    }

    fn apply(&mut self, batch: &DeltaBatch) {
        for entry in batch {
            if entry.mult > 0 {
                let slot = self
                    .rows
                    .entry(entry.key.clone())
                    .or_insert_with(|| (entry.row.clone(), 0));
                slot.0 = entry.row.clone();
                slot.1 += entry.mult as i64;
            } else if let Some((_, weight)) = self.rows.get_mut(&entry.key) {
                *weight += entry.mult as i64;
                if *weight <= 0 {
                    self.rows.remove(&entry.key);
                }
            }
        }
    }

    /// Status derived from the sources: any `Error` wins, any source not
    /// yet `Ready` reads as `Loading`. A tick error on the query itself
    /// also reads as `Error`.
    pub fn status(&self) -> CollectionStatus {
        if self.error.is_some() {
            return CollectionStatus::Error;
        }
        let mut loading = false;
        for source in &self.sources {
            match source.borrow().status() {
                CollectionStatus::Error => return CollectionStatus::Error,
                CollectionStatus::Idle | CollectionStatus::Loading => loading = true,
                CollectionStatus::Ready => {}
            }
        }
        if loading {
            CollectionStatus::Loading
        } else {
            CollectionStatus::Ready
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Current result rows. Ordered queries sort by their order index,
    /// everything else by key.
    pub fn rows(&self) -> Vec<(Key, Row)> {
        let mut out: Vec<(Key, Row)> = self
            .rows
            .iter()
            .filter(|(_, (_, weight))| *weight > 0)
            .map(|(key, (row, _))| (key.clone(), row.clone()))
            .collect();
        out.sort_by(|(ka, ra), (kb, rb)| {
            let ia = order_index(ra);
            let ib = order_index(rb);
            ia.cmp(&ib).then_with(|| ka.cmp(kb))
        });
        out
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Attaches a change callback, counting as a subscriber on every
    /// source collection.
    pub fn subscribe(&mut self, callback: impl Fn(&ChangeSet) + 'static) -> SubscriptionId {
        for source in &self.sources {
            source.borrow_mut().subscribe();
        }
        self.subscriptions.subscribe(callback)
    }

    /// Detaches a callback; the last detach arms each source's GC
    /// deadline.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        if !self.subscriptions.unsubscribe(id) {
            return false;
        }
        let now = self.clock.now_ms();
        for source in &self.sources {
            source.borrow_mut().unsubscribe(now);
        }
        true
    }
}

fn order_index(row: &Row) -> Option<&str> {
    match row.get(ORDER_INDEX_FIELD) {
        Some(Value::Str(index)) => Some(index),
        _ => None,
    }
}

impl DeltaSink for LiveQuery {
    fn deliver(&mut self, source: &str, batch: &DeltaBatch) {
        match self.graph.push(source, batch) {
            Ok(output) => {
                self.error = None;
                self.apply(&output);
                let changes = ChangeSet::from_batch(&output);
                self.subscriptions.notify(&changes);
            }
            Err(error) => {
                warn!(source, %error, "tick failed, keeping last good rows");
                self.error = Some(error.to_string());
            }
        }
    }
}
