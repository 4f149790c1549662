//! The database facade.
//!
//! Owns the collections, the change router, the query compiler, and the
//! transaction manager. Everything is single-threaded: collections and
//! live queries are shared as `Rc<RefCell<...>>`, and the router holds
//! weak references so dropping a live query unregisters it.

use crate::clock::{Clock, SystemClock};
use crate::collection::{Collection, SyncSession};
use crate::error::{DbError, MutationError};
use crate::live::LiveQuery;
use crate::transaction::{MutationRecord, TransactionId, TransactionManager, TransactionState};
use hashbrown::HashMap;
use rill_core::{Key, Row};
use rill_expr::{ExprCompiler, OperatorRegistry};
use rill_query::{QueryCompiler, QueryIr};
use rill_reactive::{ChangeRouter, DeltaSink};
use std::cell::RefCell;
use std::rc::Rc;

/// Top-level handle tying collections, queries, and transactions
/// together.
pub struct Database {
    clock: Rc<dyn Clock>,
    router: Rc<RefCell<ChangeRouter>>,
    collections: HashMap<String, Rc<RefCell<Collection>>>,
    compiler: QueryCompiler,
    transactions: TransactionManager,
}

impl Database {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self::with_registry(OperatorRegistry::with_builtins(), clock)
    }

    /// Builds a database over a custom operator registry, for callers
    /// registering their own scalars or aggregates.
    pub fn with_registry(registry: OperatorRegistry, clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            router: Rc::new(RefCell::new(ChangeRouter::new())),
            collections: HashMap::new(),
            compiler: QueryCompiler::new(ExprCompiler::new(Rc::new(registry))),
            transactions: TransactionManager::new(),
        }
    }

    /// Registers a collection. Returns the existing handle if the name
    /// is already taken.
    pub fn create_collection(
        &mut self,
        name: &str,
        gc_time_ms: u64,
    ) -> Rc<RefCell<Collection>> {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| Rc::new(RefCell::new(Collection::new(name, gc_time_ms))))
            .clone()
    }

    pub fn collection(&self, name: &str) -> Option<Rc<RefCell<Collection>>> {
        self.collections.get(name).cloned()
    }

    /// Starts syncing a collection and hands back the session its
    /// adapter drives. Starting an already syncing collection just
    /// returns another session handle.
    pub fn start_sync(&mut self, name: &str) -> Result<SyncSession, DbError> {
        let collection = self
            .collections
            .get(name)
            .ok_or_else(|| DbError::UnknownCollection(name.to_string()))?;
        collection.borrow_mut().start_sync();
        Ok(SyncSession::new(collection.clone(), self.router.clone()))
    }

    /// Compiles a query, seeds it from source snapshots, and wires it to
    /// source deltas. The result stays current as long as the returned
    /// handle is alive.
    pub fn live_query(&mut self, ir: &QueryIr) -> Result<Rc<RefCell<LiveQuery>>, DbError> {
        let compiled = self.compiler.compile(ir)?;

        let mut sources = Vec::new();
        for name in ir.collections() {
            let collection = self
                .collections
                .get(name)
                .ok_or_else(|| DbError::UnknownCollection(name.to_string()))?;
            sources.push(collection.clone());
        }

        let live = Rc::new(RefCell::new(LiveQuery::new(
            compiled,
            sources.clone(),
            self.clock.clone(),
        )));
        for (name, collection) in ir.collections().into_iter().zip(&sources) {
            let snapshot = collection.borrow().snapshot();
            live.borrow_mut().seed(name, &snapshot);
        }

        let sink: Rc<RefCell<dyn DeltaSink>> = live.clone();
        let mut router = self.router.borrow_mut();
        for name in ir.collections() {
            router.register(name, Rc::downgrade(&sink));
        }
        drop(router);

        Ok(live)
    }

    /// Runs an optimistic mutation. Every write inside the closure
    /// applies immediately and propagates to live queries; the returned
    /// transaction is `Persisting` until [`Database::settle`] resolves
    /// it. A closure error undoes the writes already applied.
    pub fn mutate(
        &mut self,
        f: impl FnOnce(&mut MutationScope<'_>) -> Result<(), MutationError>,
    ) -> Result<TransactionId, MutationError> {
        let id = self.transactions.open();
        let mut scope = MutationScope {
            collections: &self.collections,
            router: &self.router,
            records: Vec::new(),
        };
        let outcome = f(&mut scope);
        let records = scope.records;

        match outcome {
            Ok(()) => {
                for record in records {
                    self.transactions.record(id, record)?;
                }
                self.transactions.begin_persist(id)?;
                Ok(id)
            }
            Err(error) => {
                undo(&self.collections, &self.router, records.into_iter().rev());
                self.transactions.rollback(id)?;
                Err(error)
            }
        }
    }

    /// Settles a transaction with the outcome of its persistence call.
    /// Success commits; failure rolls every recorded write back in
    /// reverse order and resurfaces the failure.
    pub fn settle(
        &mut self,
        id: TransactionId,
        outcome: Result<(), String>,
    ) -> Result<(), MutationError> {
        match outcome {
            Ok(()) => self.transactions.commit(id),
            Err(message) => {
                let records = self.transactions.rollback(id)?;
                undo(&self.collections, &self.router, records.into_iter());
                Err(MutationError::PersistenceFailed(message))
            }
        }
    }

    /// Tears down collections whose GC deadline has elapsed. Each
    /// teardown publishes the retraction of the collection's rows, so
    /// live queries over it unwind their state instead of double
    /// counting a later resync.
    pub fn run_gc(&mut self) {
        let now = self.clock.now_ms();
        for (name, collection) in &self.collections {
            let retraction = collection.borrow_mut().run_gc(now);
            if let Some(batch) = retraction {
                if !batch.is_empty() {
                    self.router.borrow_mut().publish(name, &batch);
                }
            }
        }
    }

    #[inline]
    pub fn unsettled_transactions(&self) -> usize {
        self.transactions.unsettled()
    }

    pub fn transaction_state(&self, id: TransactionId) -> Option<TransactionState> {
        self.transactions.state(id)
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new(Rc::new(SystemClock))
    }
}

/// Undoes mutation records, newest first, publishing the restore deltas.
fn undo(
    collections: &HashMap<String, Rc<RefCell<Collection>>>,
    router: &Rc<RefCell<ChangeRouter>>,
    records: impl Iterator<Item = MutationRecord>,
) {
    for record in records {
        let Some(collection) = collections.get(&record.collection) else {
            continue;
        };
        let delta = collection
            .borrow_mut()
            .restore(record.key, record.before);
        if !delta.is_empty() {
            router.borrow_mut().publish(&record.collection, &delta);
        }
    }
}

/// Write surface handed to [`Database::mutate`] closures. Each call
/// applies immediately, publishes the delta, and records the before and
/// after images for rollback.
pub struct MutationScope<'a> {
    collections: &'a HashMap<String, Rc<RefCell<Collection>>>,
    router: &'a Rc<RefCell<ChangeRouter>>,
    records: Vec<MutationRecord>,
}

impl MutationScope<'_> {
    fn target(&self, name: &str) -> Result<Rc<RefCell<Collection>>, MutationError> {
        self.collections
            .get(name)
            .cloned()
            .ok_or_else(|| MutationError::UnknownCollection(name.to_string()))
    }

    pub fn insert(&mut self, collection: &str, key: Key, row: Row) -> Result<(), MutationError> {
        let target = self.target(collection)?;
        let delta = target.borrow_mut().insert(key.clone(), row.clone())?;
        self.router.borrow_mut().publish(collection, &delta);
        self.records.push(MutationRecord {
            collection: collection.to_string(),
            key,
            before: None,
            after: Some(row),
        });
        Ok(())
    }

    pub fn update(&mut self, collection: &str, key: Key, row: Row) -> Result<(), MutationError> {
        let target = self.target(collection)?;
        let (before, delta) = target.borrow_mut().update(key.clone(), row.clone())?;
        if !delta.is_empty() {
            self.router.borrow_mut().publish(collection, &delta);
        }
        self.records.push(MutationRecord {
            collection: collection.to_string(),
            key,
            before: Some(before),
            after: Some(row),
        });
        Ok(())
    }

    pub fn delete(&mut self, collection: &str, key: Key) -> Result<(), MutationError> {
        let target = self.target(collection)?;
        let (before, delta) = target.borrow_mut().delete(key.clone())?;
        self.router.borrow_mut().publish(collection, &delta);
        self.records.push(MutationRecord {
            collection: collection.to_string(),
            key,
            before: Some(before),
            after: None,
        });
        Ok(())
    }
}
