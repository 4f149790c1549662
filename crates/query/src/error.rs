//! Query compilation errors.

use rill_expr::CompileError;
use thiserror::Error;

/// Errors raised while compiling a query into a dataflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("duplicate source alias `{0}`")]
    DuplicateAlias(String),

    #[error("join condition must be an equality, or an `and` of equalities, between the joined source and the sources before it")]
    UnsupportedJoinCondition,

    #[error("select item `{0}` must be an aggregate or match a group-by expression")]
    UngroupedSelect(String),

    #[error("grouped queries require a select")]
    GroupedQueryWithoutSelect,

    #[error("select item `{0}` mixes aggregate and scalar computation")]
    MixedAggregateSelect(String),

    #[error("limit/offset requires an order_by")]
    LimitWithoutOrderBy,
}
