//! Database-layer errors.

use rill_core::Key;
use rill_query::QueryError;
use thiserror::Error;

/// Errors raised by the sync session contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("sync batch already open")]
    BatchAlreadyOpen,

    #[error("write outside an open batch")]
    WriteOutsideBatch,

    #[error("commit without an open batch")]
    CommitWithoutBegin,
}

/// Errors raised by optimistic mutations and their settlement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("collection `{0}` is not registered")]
    UnknownCollection(String),

    #[error("key `{0}` already exists")]
    DuplicateKey(Key),

    #[error("no row under key `{0}`")]
    MissingRow(Key),

    #[error("transaction {0} is not open")]
    UnknownTransaction(u64),

    #[error("persistence failed: {0}")]
    PersistenceFailed(String),
}

/// Errors raised by the database facade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("collection `{0}` is not registered")]
    UnknownCollection(String),
}
