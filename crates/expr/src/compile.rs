//! Expression compilation.
//!
//! Lowers [`Expr`] trees into evaluator closures. All structural
//! validation (unknown operators, arity, non-literal patterns) happens
//! here, at query-build time; the produced closures are total for every
//! built-in operator.
//!
//! Semantics:
//! - comparisons and boolean operators use SQL three-valued logic
//!   (`Null` operands yield `Null`),
//! - arithmetic coerces `Null` (and non-numeric values) to `0`,
//! - `div` by zero yields `Null`,
//! - `like` / `ilike` require a literal pattern so it compiles once.

use crate::error::{CompileError, EvalError};
use crate::ir::{Expr, SortOrder};
use crate::registry::OperatorRegistry;
use core::cmp::Ordering;
use rill_core::pattern::LikePattern;
use rill_core::{Row, Value};
use std::rc::Rc;

/// A compiled expression: a closure from row to value.
pub type Evaluator = Rc<dyn Fn(&Row) -> Result<Value, EvalError>>;

/// A compiled ordering over rows. Total; evaluation failures inside a
/// sort key collapse to `Null`, which orders first.
pub type RowComparator = Rc<dyn Fn(&Row, &Row) -> Ordering>;

/// Compiles expressions against an operator registry.
#[derive(Clone)]
pub struct ExprCompiler {
    registry: Rc<OperatorRegistry>,
}

impl ExprCompiler {
    pub fn new(registry: Rc<OperatorRegistry>) -> Self {
        Self { registry }
    }

    #[inline]
    pub fn registry(&self) -> &Rc<OperatorRegistry> {
        &self.registry
    }

    /// Compiles a scalar expression.
    ///
    /// Aggregates are rejected here; they are only meaningful inside
    /// grouped select items, which the query compiler handles separately.
    pub fn compile(&self, expr: &Expr) -> Result<Evaluator, CompileError> {
        match expr {
            Expr::Literal(value) => {
                let value = value.clone();
                Ok(Rc::new(move |_| Ok(value.clone())))
            }
            Expr::Field(path) => {
                if path.is_empty() {
                    return Err(CompileError::EmptyFieldPath);
                }
                let path = path.clone();
                Ok(Rc::new(move |row| {
                    Ok(row.get_path(&path).cloned().unwrap_or(Value::Null))
                }))
            }
            Expr::Func { name, args } if name == "like" || name == "ilike" => {
                self.compile_like(name, args)
            }
            Expr::Func { name, args } => {
                let builder = self
                    .registry
                    .scalar(name)
                    .ok_or_else(|| CompileError::UnknownOperator(name.clone()))?;
                let compiled = args
                    .iter()
                    .map(|arg| self.compile(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                builder(compiled)
            }
            Expr::Aggregate { name, .. } => {
                Err(CompileError::AggregateInScalar(name.clone()))
            }
        }
    }

    fn compile_like(&self, name: &str, args: &[Expr]) -> Result<Evaluator, CompileError> {
        exactly(name, 2, args.len())?;
        let pattern = match &args[1] {
            Expr::Literal(Value::Str(p)) => p,
            _ => return Err(CompileError::PatternNotLiteral(name.to_string())),
        };
        let matcher = if name == "ilike" {
            LikePattern::ilike(pattern)
        } else {
            LikePattern::like(pattern)
        };
        let value = self.compile(&args[0])?;
        Ok(Rc::new(move |row| {
            Ok(match value(row)? {
                Value::Null => Value::Null,
                Value::Str(s) => Value::Bool(matcher.matches(&s)),
                _ => Value::Bool(false),
            })
        }))
    }
}

/// Compiles a multi-key ordering from `(expr, order)` pairs.
///
/// `Null` sorts first ascending (and therefore last descending), which
/// falls straight out of `Value`'s total order.
pub fn compile_comparator(
    specs: &[(Expr, SortOrder)],
    compiler: &ExprCompiler,
) -> Result<RowComparator, CompileError> {
    let keys = specs
        .iter()
        .map(|(expr, order)| Ok((compiler.compile(expr)?, *order)))
        .collect::<Result<Vec<_>, CompileError>>()?;
    Ok(Rc::new(move |a, b| {
        for (eval, order) in &keys {
            let va = eval(a).unwrap_or(Value::Null);
            let vb = eval(b).unwrap_or(Value::Null);
            let ord = match order {
                SortOrder::Asc => va.cmp(&vb),
                SortOrder::Desc => vb.cmp(&va),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }))
}

// -------------------------------------------------------------------------
// Built-in scalar operators
// -------------------------------------------------------------------------

/// Three-valued truth of a value: `Null` is unknown, everything else
/// follows loose truthiness (zero, empty string, and NaN are false).
pub fn truth(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        Value::Int(i) => Some(*i != 0),
        Value::Float(f) => Some(*f != 0.0 && !f.is_nan()),
        Value::Str(s) => Some(!s.is_empty()),
        _ => Some(true),
    }
}

enum Num {
    I(i64),
    F(f64),
}

/// Arithmetic coercion: `Null` and non-numeric values become integer 0.
fn to_num(value: &Value) -> Num {
    match value {
        Value::Int(i) | Value::Date(i) => Num::I(*i),
        Value::Float(f) => Num::F(*f),
        Value::Bool(b) => Num::I(*b as i64),
        _ => Num::I(0),
    }
}

fn exactly(op: &str, expected: usize, got: usize) -> Result<(), CompileError> {
    if got == expected {
        Ok(())
    } else {
        Err(CompileError::Arity {
            op: op.to_string(),
            expected: match expected {
                1 => "1",
                2 => "2",
                _ => "several",
            },
            got,
        })
    }
}

fn at_least(op: &str, min: usize, got: usize) -> Result<(), CompileError> {
    if got >= min {
        Ok(())
    } else {
        Err(CompileError::Arity {
            op: op.to_string(),
            expected: "at least 1",
            got,
        })
    }
}

/// Registers every built-in scalar operator into `registry`.
pub(crate) fn install_builtins(registry: &mut OperatorRegistry) {
    comparison(registry, "eq", |ord| ord == Ordering::Equal);
    comparison(registry, "ne", |ord| ord != Ordering::Equal);
    comparison(registry, "gt", |ord| ord == Ordering::Greater);
    comparison(registry, "gte", |ord| ord != Ordering::Less);
    comparison(registry, "lt", |ord| ord == Ordering::Less);
    comparison(registry, "lte", |ord| ord != Ordering::Greater);

    registry.register_scalar("and", |evals| {
        at_least("and", 1, evals.len())?;
        Ok(Rc::new(move |row: &Row| {
            let mut unknown = false;
            for eval in &evals {
                match truth(&eval(row)?) {
                    Some(false) => return Ok(Value::Bool(false)),
                    None => unknown = true,
                    Some(true) => {}
                }
            }
            Ok(if unknown { Value::Null } else { Value::Bool(true) })
        }))
    });

    registry.register_scalar("or", |evals| {
        at_least("or", 1, evals.len())?;
        Ok(Rc::new(move |row: &Row| {
            let mut unknown = false;
            for eval in &evals {
                match truth(&eval(row)?) {
                    Some(true) => return Ok(Value::Bool(true)),
                    None => unknown = true,
                    Some(false) => {}
                }
            }
            Ok(if unknown { Value::Null } else { Value::Bool(false) })
        }))
    });

    registry.register_scalar("not", |evals| {
        exactly("not", 1, evals.len())?;
        let arg = evals[0].clone();
        Ok(Rc::new(move |row: &Row| {
            Ok(match truth(&arg(row)?) {
                None => Value::Null,
                Some(b) => Value::Bool(!b),
            })
        }))
    });

    registry.register_scalar("isNull", |evals| {
        exactly("isNull", 1, evals.len())?;
        let arg = evals[0].clone();
        Ok(Rc::new(move |row: &Row| Ok(Value::Bool(arg(row)?.is_null()))))
    });

    registry.register_scalar("isNotNull", |evals| {
        exactly("isNotNull", 1, evals.len())?;
        let arg = evals[0].clone();
        Ok(Rc::new(move |row: &Row| {
            Ok(Value::Bool(!arg(row)?.is_null()))
        }))
    });

    registry.register_scalar("in", |evals| {
        at_least("in", 1, evals.len())?;
        Ok(Rc::new(move |row: &Row| {
            let needle = evals[0](row)?;
            if needle.is_null() {
                return Ok(Value::Null);
            }
            let mut saw_null = false;
            for item in &evals[1..] {
                let candidate = item(row)?;
                if candidate.is_null() {
                    saw_null = true;
                } else if candidate.cmp(&needle) == Ordering::Equal {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(if saw_null { Value::Null } else { Value::Bool(false) })
        }))
    });

    arithmetic(registry, "add", i64::wrapping_add, |a, b| a + b);
    arithmetic(registry, "sub", i64::wrapping_sub, |a, b| a - b);
    arithmetic(registry, "mul", i64::wrapping_mul, |a, b| a * b);

    registry.register_scalar("div", |evals| {
        exactly("div", 2, evals.len())?;
        let lhs = evals[0].clone();
        let rhs = evals[1].clone();
        Ok(Rc::new(move |row: &Row| {
            let a = match to_num(&lhs(row)?) {
                Num::I(i) => i as f64,
                Num::F(f) => f,
            };
            let b = match to_num(&rhs(row)?) {
                Num::I(i) => i as f64,
                Num::F(f) => f,
            };
            Ok(if b == 0.0 {
                Value::Null
            } else {
                Value::Float(a / b)
            })
        }))
    });

    registry.register_scalar("concat", |evals| {
        at_least("concat", 1, evals.len())?;
        Ok(Rc::new(move |row: &Row| {
            let mut out = String::new();
            for eval in &evals {
                let value = eval(row)?;
                if !value.is_null() {
                    out.push_str(&value.to_string());
                }
            }
            Ok(Value::Str(out))
        }))
    });

    string_fold(registry, "upper", str::to_uppercase);
    string_fold(registry, "lower", str::to_lowercase);

    registry.register_scalar("coalesce", |evals| {
        at_least("coalesce", 1, evals.len())?;
        Ok(Rc::new(move |row: &Row| {
            for eval in &evals {
                let value = eval(row)?;
                if !value.is_null() {
                    return Ok(value);
                }
            }
            Ok(Value::Null)
        }))
    });
}

fn comparison(
    registry: &mut OperatorRegistry,
    name: &'static str,
    accept: fn(Ordering) -> bool,
) {
    registry.register_scalar(name, move |evals| {
        exactly(name, 2, evals.len())?;
        let lhs = evals[0].clone();
        let rhs = evals[1].clone();
        Ok(Rc::new(move |row: &Row| {
            let a = lhs(row)?;
            let b = rhs(row)?;
            if a.is_null() || b.is_null() {
                return Ok(Value::Null);
            }
            Ok(Value::Bool(accept(a.cmp(&b))))
        }))
    });
}

fn arithmetic(
    registry: &mut OperatorRegistry,
    name: &'static str,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) {
    registry.register_scalar(name, move |evals| {
        exactly(name, 2, evals.len())?;
        let lhs = evals[0].clone();
        let rhs = evals[1].clone();
        Ok(Rc::new(move |row: &Row| {
            let a = to_num(&lhs(row)?);
            let b = to_num(&rhs(row)?);
            Ok(match (a, b) {
                (Num::I(x), Num::I(y)) => Value::Int(int_op(x, y)),
                (Num::I(x), Num::F(y)) => Value::Float(float_op(x as f64, y)),
                (Num::F(x), Num::I(y)) => Value::Float(float_op(x, y as f64)),
                (Num::F(x), Num::F(y)) => Value::Float(float_op(x, y)),
            })
        }))
    });
}

fn string_fold(
    registry: &mut OperatorRegistry,
    name: &'static str,
    fold: fn(&str) -> String,
) {
    registry.register_scalar(name, move |evals| {
        exactly(name, 1, evals.len())?;
        let arg = evals[0].clone();
        Ok(Rc::new(move |row: &Row| {
            Ok(match arg(row)? {
                Value::Str(s) => Value::Str(fold(&s)),
                _ => Value::Null,
            })
        }))
    });
}
