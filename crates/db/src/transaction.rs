//! Optimistic transactions.
//!
//! A transaction records every optimistic write as `(collection, key,
//! before, after)`. Rollback hands those records back newest-first, so
//! restoring `before` in order reproduces the exact prior state even
//! when one key was touched twice.
//!
//! The manager retains every unsettled transaction: an invocation
//! abandoned by the caller (a coalesced paced call, say) still has live
//! optimistic writes, so it stays tracked until a later settle commits
//! or rolls it back.

use crate::error::MutationError;
use hashbrown::HashMap;
use rill_core::{Key, Row};
use std::collections::VecDeque;
use tracing::debug;

/// How many settled outcomes stay observable. Settling transaction
/// N + RETENTION evicts N's outcome; unsettled transactions are never
/// evicted.
const SETTLED_RETENTION: usize = 256;

/// Handle to one transaction. Ids are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransactionId(pub(crate) u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Pending,
    Persisting,
    Committed,
    RolledBack,
}

/// One recorded optimistic write. `before` of `None` means the key did
/// not exist; `after` of `None` means the write deleted it.
#[derive(Clone, Debug, PartialEq)]
pub struct MutationRecord {
    pub collection: String,
    pub key: Key,
    pub before: Option<Row>,
    pub after: Option<Row>,
}

struct Transaction {
    state: TransactionState,
    mutations: Vec<MutationRecord>,
}

/// Tracks open transactions through their state machine.
#[derive(Default)]
pub struct TransactionManager {
    next_id: u64,
    open: HashMap<u64, Transaction>,
    /// Final state of recently settled transactions, so late observers
    /// of a coalesced invocation can still learn its outcome. Bounded:
    /// the oldest outcome is evicted past [`SETTLED_RETENTION`].
    settled: HashMap<u64, TransactionState>,
    settled_order: VecDeque<u64>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a transaction in `Pending`.
    pub fn open(&mut self) -> TransactionId {
        let id = self.next_id;
        self.next_id += 1;
        self.open.insert(
            id,
            Transaction {
                state: TransactionState::Pending,
                mutations: Vec::new(),
            },
        );
        TransactionId(id)
    }

    pub fn record(&mut self, id: TransactionId, record: MutationRecord) -> Result<(), MutationError> {
        let txn = self
            .open
            .get_mut(&id.0)
            .ok_or(MutationError::UnknownTransaction(id.0))?;
        txn.mutations.push(record);
        Ok(())
    }

    /// `Pending → Persisting`, when the persistence call is issued.
    pub fn begin_persist(&mut self, id: TransactionId) -> Result<(), MutationError> {
        let txn = self
            .open
            .get_mut(&id.0)
            .ok_or(MutationError::UnknownTransaction(id.0))?;
        if txn.state == TransactionState::Pending {
            txn.state = TransactionState::Persisting;
        }
        Ok(())
    }

    /// Settles a transaction as `Committed` and stops tracking it. The
    /// optimistic writes stand; reconciliation happens through the
    /// collection's idempotent sync apply.
    pub fn commit(&mut self, id: TransactionId) -> Result<(), MutationError> {
        self.open
            .remove(&id.0)
            .ok_or(MutationError::UnknownTransaction(id.0))?;
        self.note_settled(id.0, TransactionState::Committed);
        debug!(transaction = id.0, "committed");
        Ok(())
    }

    /// Settles a transaction as `RolledBack`, returning its mutation
    /// records newest-first for the caller to undo.
    pub fn rollback(&mut self, id: TransactionId) -> Result<Vec<MutationRecord>, MutationError> {
        let txn = self
            .open
            .remove(&id.0)
            .ok_or(MutationError::UnknownTransaction(id.0))?;
        let mut records = txn.mutations;
        records.reverse();
        self.note_settled(id.0, TransactionState::RolledBack);
        debug!(transaction = id.0, mutations = records.len(), "rolled back");
        Ok(records)
    }

    fn note_settled(&mut self, id: u64, state: TransactionState) {
        if self.settled.insert(id, state).is_none() {
            self.settled_order.push_back(id);
        }
        while self.settled_order.len() > SETTLED_RETENTION {
            if let Some(oldest) = self.settled_order.pop_front() {
                self.settled.remove(&oldest);
            }
        }
    }

    /// Number of transactions not yet settled.
    #[inline]
    pub fn unsettled(&self) -> usize {
        self.open.len()
    }

    pub fn state(&self, id: TransactionId) -> Option<TransactionState> {
        self.open
            .get(&id.0)
            .map(|txn| txn.state)
            .or_else(|| self.settled.get(&id.0).copied())
    }
}

/// Debounce for mutation actions: every optimistic write applies
/// immediately, but the downstream persistence call is coalesced behind
/// a sliding deadline. `flush_due` drains the coalesced payloads once
/// the deadline passes.
pub struct PacedAction<T> {
    delay_ms: u64,
    deadline: Option<u64>,
    pending: Vec<T>,
}

impl<T> PacedAction<T> {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            deadline: None,
            pending: Vec::new(),
        }
    }

    /// Queues a payload and pushes the deadline out to `now + delay`.
    pub fn invoke(&mut self, now: u64, payload: T) {
        self.pending.push(payload);
        self.deadline = Some(now + self.delay_ms);
    }

    /// Drains the queued payloads if the deadline has elapsed. Returns
    /// an empty vec while the action is still settling or idle.
    pub fn flush_due(&mut self, now: u64) -> Vec<T> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                std::mem::take(&mut self.pending)
            }
            _ => Vec::new(),
        }
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
