//! Rill Expr - expression IR, compiler, and operator registry.
//!
//! Queries carry expressions as plain data ([`Expr`]); at query-build time
//! the compiler turns them into evaluator closures over rows. Compilation
//! is where unknown operators and arity mistakes surface
//! ([`CompileError`]); the built-in evaluators themselves are total, so
//! [`EvalError`] only arises from user-registered operators.
//!
//! Comparison and boolean operators follow SQL three-valued logic;
//! arithmetic coerces `Null` to `0`. The asymmetry is deliberate:
//! `add(null, 2)` is `2` while `gt(null, 2)` is unknown.
//!
//! # Example
//!
//! ```rust
//! use rill_core::{Row, Value};
//! use rill_expr::{Expr, ExprCompiler, OperatorRegistry};
//! use std::rc::Rc;
//!
//! let compiler = ExprCompiler::new(Rc::new(OperatorRegistry::with_builtins()));
//! let pred = compiler
//!     .compile(&Expr::field("age").gte(Expr::lit(18)))
//!     .unwrap();
//!
//! let row = Row::from_pairs([("age", Value::Int(30))]);
//! assert_eq!(pred(&row).unwrap(), Value::Bool(true));
//! ```

mod aggregate;
mod compile;
mod error;
mod ir;
mod registry;

pub use aggregate::{
    Accumulator, AvgAcc, CollectAcc, CountAcc, MaxAcc, MinAcc, SumAcc,
};
pub use compile::{compile_comparator, truth, Evaluator, ExprCompiler, RowComparator};
pub use error::{CompileError, EvalError};
pub use ir::{Expr, SortOrder};
pub use registry::{AggregateFactory, OperatorRegistry, ScalarBuilder};
