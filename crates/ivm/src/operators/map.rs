//! Incremental map (projection) operator.

use crate::delta::{DeltaBatch, Entry};
use crate::graph::Operator;
use rill_core::Row;
use rill_expr::EvalError;
use std::rc::Rc;

/// A row-to-row projection.
pub type Projector = Rc<dyn Fn(&Row) -> Result<Row, EvalError>>;

/// Applies a projection to every delta, preserving keys and
/// multiplicities. The projection must be deterministic: a retraction
/// re-projects the old row and has to reproduce the row emitted when it
/// was inserted.
pub struct MapOp {
    projector: Projector,
}

impl MapOp {
    pub fn new(projector: Projector) -> Self {
        Self { projector }
    }
}

impl Operator for MapOp {
    fn on_batch(&mut self, _port: usize, batch: &DeltaBatch) -> Result<DeltaBatch, EvalError> {
        batch
            .iter()
            .map(|entry| {
                Ok(Entry::with_mult(
                    entry.key.clone(),
                    (self.projector)(&entry.row)?,
                    entry.mult,
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_core::{Key, Value};

    #[test]
    fn test_map_preserves_key_and_mult() {
        let mut op = MapOp::new(Rc::new(|row: &Row| {
            let mut out = Row::new();
            out.set("double", match row.get("n") {
                Some(Value::Int(n)) => Value::Int(n * 2),
                _ => Value::Null,
            });
            Ok(out)
        }));

        let input = vec![Entry::with_mult(
            Key::Int(7),
            Row::from_pairs([("n", Value::Int(21))]),
            -1,
        )];
        let out = op.on_batch(0, &input).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key, Key::Int(7));
        assert_eq!(out[0].mult, -1);
        assert_eq!(out[0].row.get("double"), Some(&Value::Int(42)));
    }
}
