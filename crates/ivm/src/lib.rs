//! Rill IVM - incremental view maintenance runtime.
//!
//! Collections change in keyed multiset deltas ([`Entry`]): a row with a
//! signed multiplicity. Queries compile to a [`DataflowGraph`] of
//! stateful operators; pushing a source delta through the graph yields
//! the delta of the query result, without rescanning inputs.
//!
//! Operators: map, filter, equi-join (inner and outer), group-by with
//! incremental aggregates, order-by with a top-K window, and union.

mod delta;
mod graph;
pub mod operators;

pub use delta::{DeltaBatch, DeltaBatchExt, Entry};
pub use graph::{DataflowGraph, NodeId, Operator};
pub use operators::join::JoinType;
pub use operators::topk::ORDER_INDEX_FIELD;
