//! Rill DB - the client-side database facade.
//!
//! Ties the layers together: collections synced by external adapters,
//! live queries maintained incrementally by the dataflow runtime, and
//! optimistic transactions with rollback. Single-threaded by design;
//! shared state is `Rc<RefCell<...>>`.
//!
//! # Example
//!
//! ```rust
//! use rill_db::{Database, ManualClock};
//! use rill_core::{Key, Row, Value};
//! use rill_expr::Expr;
//! use rill_ivm::Entry;
//! use rill_query::Query;
//! use std::rc::Rc;
//!
//! let mut db = Database::new(Rc::new(ManualClock::new(0)));
//! db.create_collection("todos", 60_000);
//!
//! let session = db.start_sync("todos").unwrap();
//! session.begin().unwrap();
//! session.write(Entry::insert(
//!     Key::Int(1),
//!     Row::from_pairs([("done", Value::Bool(false))]),
//! )).unwrap();
//! session.commit().unwrap();
//!
//! let open = db.live_query(
//!     &Query::from(("t", "todos"))
//!         .filter(Expr::field("t.done").eq(Expr::lit(false)))
//!         .build(),
//! ).unwrap();
//! assert_eq!(open.borrow().len(), 1);
//! ```

mod clock;
mod collection;
mod database;
mod error;
mod live;
mod transaction;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collection::{Collection, CollectionStatus, SyncSession};
pub use database::{Database, MutationScope};
pub use error::{DbError, MutationError, SyncError};
pub use live::LiveQuery;
pub use transaction::{
    MutationRecord, PacedAction, TransactionId, TransactionManager, TransactionState,
};
