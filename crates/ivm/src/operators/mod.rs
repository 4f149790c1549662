//! Incremental operators.

pub mod filter;
pub mod group;
pub mod join;
pub mod map;
pub mod topk;
