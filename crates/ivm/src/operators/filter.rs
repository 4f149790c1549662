//! Incremental filter operator.

use crate::delta::DeltaBatch;
use crate::graph::Operator;
use rill_expr::{truth, EvalError, Evaluator};

/// Keeps deltas whose row satisfies the predicate, signs intact. A
/// predicate evaluating to `Null` (unknown) drops the row, matching SQL
/// `WHERE`.
pub struct FilterOp {
    predicate: Evaluator,
}

impl FilterOp {
    pub fn new(predicate: Evaluator) -> Self {
        Self { predicate }
    }
}

impl Operator for FilterOp {
    fn on_batch(&mut self, _port: usize, batch: &DeltaBatch) -> Result<DeltaBatch, EvalError> {
        let mut out = Vec::new();
        for entry in batch {
            if truth(&(self.predicate)(&entry.row)?) == Some(true) {
                out.push(entry.clone());
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::Entry;
    use rill_core::{Key, Row, Value};
    use rill_expr::{Expr, ExprCompiler, OperatorRegistry};
    use std::rc::Rc;

    fn pred(expr: Expr) -> Evaluator {
        ExprCompiler::new(Rc::new(OperatorRegistry::with_builtins()))
            .compile(&expr)
            .unwrap()
    }

    #[test]
    fn test_filter_drops_unknown() {
        let mut op = FilterOp::new(pred(Expr::field("n").gt(Expr::lit(10))));
        let batch = vec![
            Entry::insert(Key::Int(1), Row::from_pairs([("n", Value::Int(20))])),
            Entry::insert(Key::Int(2), Row::from_pairs([("n", Value::Null)])),
            Entry::insert(Key::Int(3), Row::from_pairs([("n", Value::Int(5))])),
        ];
        let out = op.on_batch(0, &batch).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key, Key::Int(1));
    }

    #[test]
    fn test_filter_preserves_sign() {
        let mut op = FilterOp::new(pred(Expr::field("n").gt(Expr::lit(0))));
        let batch = vec![Entry::delete(
            Key::Int(1),
            Row::from_pairs([("n", Value::Int(1))]),
        )];
        let out = op.on_batch(0, &batch).unwrap();
        assert!(out[0].is_delete());
    }
}
