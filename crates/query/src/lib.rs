//! Rill Query - fluent query builder and dataflow compiler.
//!
//! A query is assembled with [`Query`] into a declarative [`QueryIr`]
//! (pure data, no execution), then compiled by [`QueryCompiler`] into a
//! dataflow graph of incremental operators. Structural problems such as
//! non-equi join conditions, ungrouped select items, or unknown
//! operators surface at compile time as [`QueryError`].
//!
//! # Example
//!
//! ```rust
//! use rill_expr::Expr;
//! use rill_query::Query;
//!
//! let ir = Query::from(("u", "users"))
//!     .filter(Expr::field("u.age").gte(Expr::lit(18)))
//!     .select(vec![("name", Expr::field("u.name"))])
//!     .build();
//! assert_eq!(ir.from.collection, "users");
//! ```

mod builder;
mod compiler;
mod error;
mod ir;

pub use builder::Query;
pub use compiler::{CompiledQuery, QueryCompiler};
pub use error::QueryError;
pub use ir::{JoinClause, QueryIr, SourceRef};
