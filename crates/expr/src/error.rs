//! Error types for expression compilation and evaluation.

use thiserror::Error;

/// Errors raised while compiling an expression, at query-build time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("unknown operator `{0}`")]
    UnknownOperator(String),

    #[error("unknown aggregate `{0}`")]
    UnknownAggregate(String),

    #[error("operator `{op}` expects {expected} argument(s), got {got}")]
    Arity {
        op: String,
        expected: &'static str,
        got: usize,
    },

    #[error("`{0}` pattern must be a string literal")]
    PatternNotLiteral(String),

    #[error("aggregate `{0}` is not allowed in a scalar expression")]
    AggregateInScalar(String),

    #[error("field path must not be empty")]
    EmptyFieldPath,
}

/// Errors raised while evaluating a compiled expression against a row.
///
/// Built-in operators never fail; this exists for user-registered
/// operators, and a tick that hits one leaves retained operator state
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("operator `{op}` failed: {message}")]
    Operator { op: String, message: String },
}

impl EvalError {
    pub fn operator(op: impl Into<String>, message: impl Into<String>) -> Self {
        EvalError::Operator {
            op: op.into(),
            message: message.into(),
        }
    }
}
