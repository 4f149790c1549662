//! Rill Reactive - change notification plumbing.
//!
//! Sits between the dataflow runtime and whoever is watching results:
//! [`ChangeSet`] turns raw multiset deltas into added/removed/modified
//! row events, [`SubscriptionManager`] fans them out to callbacks, and
//! [`ChangeRouter`] delivers source deltas to the live queries that read
//! that source.

mod change_set;
mod router;
mod subscription;

pub use change_set::ChangeSet;
pub use router::{ChangeRouter, DeltaSink};
pub use subscription::{SubscriptionId, SubscriptionManager};
