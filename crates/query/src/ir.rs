//! Declarative query representation.
//!
//! `QueryIr` is what the builder produces and the compiler consumes:
//! plain data describing sources, join conditions, predicates, grouping,
//! projection, and ordering. Nothing here executes.

use rill_expr::{Expr, SortOrder};
use rill_ivm::JoinType;

/// A collection source with the alias its rows are namespaced under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceRef {
    pub alias: String,
    pub collection: String,
}

impl SourceRef {
    pub fn new(alias: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            collection: collection.into(),
        }
    }
}

/// One join clause: the joined source, the equi-join condition, and the
/// join variant.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinClause {
    pub source: SourceRef,
    pub on: Expr,
    pub kind: JoinType,
}

/// A complete query description.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryIr {
    pub from: SourceRef,
    pub joins: Vec<JoinClause>,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    /// `(output field, expression)` pairs; empty means "rows as-is".
    pub select: Vec<(String, Expr)>,
    pub order_by: Vec<(Expr, SortOrder)>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl QueryIr {
    /// Distinct collections this query reads, in source order.
    pub fn collections(&self) -> Vec<&str> {
        let mut out = vec![self.from.collection.as_str()];
        for join in &self.joins {
            if !out.contains(&join.source.collection.as_str()) {
                out.push(join.source.collection.as_str());
            }
        }
        out
    }
}
