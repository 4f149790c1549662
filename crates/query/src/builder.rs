//! Fluent query builder.

use crate::ir::{JoinClause, QueryIr, SourceRef};
use rill_expr::{Expr, SortOrder};
use rill_ivm::JoinType;

/// Builds a [`QueryIr`] step by step. Purely declarative; nothing is
/// validated or executed until the query is compiled.
#[derive(Clone, Debug)]
pub struct Query {
    ir: QueryIr,
}

impl Query {
    /// Starts a query from `(alias, collection)`.
    pub fn from(source: (&str, &str)) -> Self {
        Self {
            ir: QueryIr {
                from: SourceRef::new(source.0, source.1),
                joins: Vec::new(),
                filter: None,
                group_by: Vec::new(),
                select: Vec::new(),
                order_by: Vec::new(),
                offset: 0,
                limit: None,
            },
        }
    }

    /// Joins `(alias, collection)` on an equi-join condition.
    pub fn join(mut self, source: (&str, &str), on: Expr, kind: JoinType) -> Self {
        self.ir.joins.push(JoinClause {
            source: SourceRef::new(source.0, source.1),
            on,
            kind,
        });
        self
    }

    /// Adds a predicate. Multiple calls combine with `and`.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.ir.filter = Some(match self.ir.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Groups by the given expressions.
    pub fn group_by(mut self, exprs: Vec<Expr>) -> Self {
        self.ir.group_by = exprs;
        self
    }

    /// Projects output rows as `(field, expression)` pairs.
    pub fn select(mut self, items: Vec<(&str, Expr)>) -> Self {
        self.ir.select = items
            .into_iter()
            .map(|(name, expr)| (name.to_string(), expr))
            .collect();
        self
    }

    /// Appends a sort key. Keys apply in call order.
    pub fn order_by(mut self, expr: Expr, order: SortOrder) -> Self {
        self.ir.order_by.push((expr, order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.ir.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.ir.offset = offset;
        self
    }

    /// Finishes the builder, yielding the declarative query.
    pub fn build(self) -> QueryIr {
        self.ir
    }
}
