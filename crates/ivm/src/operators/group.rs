//! Incremental group-by + aggregate operator.
//!
//! Buckets input deltas by group key, folds them into per-group
//! accumulators, and re-emits each affected group as a delete of its old
//! aggregate row plus an insert of the new one. Groups whose row count
//! drops to zero are removed outright.
//!
//! Every input row is also retained in a per-group multiset: when an
//! accumulator reports it cannot retract (a user-registered one, say),
//! its group is rebuilt from the retained rows instead.

use crate::delta::{DeltaBatch, Entry};
use crate::graph::Operator;
use hashbrown::HashMap;
use rill_core::{Key, Row, Value};
use rill_expr::{Accumulator, AggregateFactory, EvalError, Evaluator};

/// One aggregate select item: output field, accumulator factory, and the
/// optional argument expression.
pub struct AggSpec {
    pub field: String,
    pub factory: AggregateFactory,
    pub arg: Option<Evaluator>,
}

struct GroupState {
    key_values: Vec<Value>,
    accumulators: Vec<Box<dyn Accumulator>>,
    /// Retained input rows, kept for rebuilds.
    rows: HashMap<Row, i32>,
    weight: i64,
}

/// Incremental group-by. With no key expressions this is a single global
/// group, which appears once the first row does.
pub struct GroupOp {
    /// (output field, key expression) pairs.
    keys: Vec<(String, Evaluator)>,
    aggs: Vec<AggSpec>,
    groups: HashMap<Value, GroupState>,
}

impl GroupOp {
    pub fn new(keys: Vec<(String, Evaluator)>, aggs: Vec<AggSpec>) -> Self {
        Self {
            keys,
            aggs,
            groups: HashMap::new(),
        }
    }

    fn group_value(values: &[Value]) -> Value {
        if values.len() == 1 {
            values[0].clone()
        } else {
            Value::Array(values.to_vec())
        }
    }

    fn output_row(&self, state: &GroupState) -> Row {
        let mut row = Row::new();
        for ((field, _), value) in self.keys.iter().zip(&state.key_values) {
            row.set(field.clone(), value.clone());
        }
        for (spec, acc) in self.aggs.iter().zip(&state.accumulators) {
            row.set(spec.field.clone(), acc.value());
        }
        row
    }

    fn fresh_accumulators(&self) -> Vec<Box<dyn Accumulator>> {
        self.aggs.iter().map(|spec| (spec.factory)()).collect()
    }

    /// Re-folds a group's accumulators from its retained rows. Builds
    /// into fresh accumulators and swaps only on success, so an argument
    /// evaluation error leaves the group intact.
    fn rebuild(&self, state: &mut GroupState) -> Result<(), EvalError> {
        let mut accumulators = self.fresh_accumulators();
        for (row, weight) in &state.rows {
            for (spec, acc) in self.aggs.iter().zip(accumulators.iter_mut()) {
                let value = match &spec.arg {
                    Some(arg) => arg(row)?,
                    None => Value::Null,
                };
                acc.apply(&value, *weight);
            }
        }
        state.accumulators = accumulators;
        Ok(())
    }
}

impl Operator for GroupOp {
    fn on_batch(&mut self, _port: usize, batch: &DeltaBatch) -> Result<DeltaBatch, EvalError> {
        // Evaluate group keys and aggregate arguments for the whole
        // batch before mutating any group.
        struct Prepared<'a> {
            group: Value,
            key_values: Vec<Value>,
            arg_values: Vec<Value>,
            entry: &'a Entry,
        }
        let mut prepared = Vec::with_capacity(batch.len());
        for entry in batch {
            let key_values = self
                .keys
                .iter()
                .map(|(_, eval)| eval(&entry.row))
                .collect::<Result<Vec<_>, _>>()?;
            let arg_values = self
                .aggs
                .iter()
                .map(|spec| match &spec.arg {
                    Some(arg) => arg(&entry.row),
                    None => Ok(Value::Null),
                })
                .collect::<Result<Vec<_>, _>>()?;
            prepared.push(Prepared {
                group: Self::group_value(&key_values),
                key_values,
                arg_values,
                entry,
            });
        }

        // Bucket by group, preserving arrival order within each group.
        let mut buckets: Vec<(Value, Vec<usize>)> = Vec::new();
        let mut positions: HashMap<Value, usize> = HashMap::new();
        for (i, p) in prepared.iter().enumerate() {
            match positions.get(&p.group) {
                Some(&slot) => buckets[slot].1.push(i),
                None => {
                    positions.insert(p.group.clone(), buckets.len());
                    buckets.push((p.group.clone(), vec![i]));
                }
            }
        }

        let mut out = Vec::new();
        for (group, members) in buckets {
            let key = Key::of(&group);
            let old_row = self
                .groups
                .get(&group)
                .filter(|state| state.weight > 0)
                .map(|state| self.output_row(state));

            let mut state = self.groups.remove(&group).unwrap_or_else(|| GroupState {
                key_values: prepared[members[0]].key_values.clone(),
                accumulators: self.fresh_accumulators(),
                rows: HashMap::new(),
                weight: 0,
            });

            let mut needs_rebuild = false;
            for &i in &members {
                let p = &prepared[i];
                let mult = p.entry.mult;

                let slot = state.rows.entry(p.entry.row.clone()).or_insert(0);
                *slot += mult;
                if *slot <= 0 {
                    state.rows.remove(&p.entry.row);
                }
                state.weight += mult as i64;

                for (acc, value) in state.accumulators.iter_mut().zip(&p.arg_values) {
                    if mult < 0 && !acc.is_retractable() {
                        needs_rebuild = true;
                    } else {
                        acc.apply(value, mult);
                    }
                }
            }

            if needs_rebuild {
                self.rebuild(&mut state)?;
            }

            let new_row = if state.weight > 0 {
                Some(self.output_row(&state))
            } else {
                None
            };

            if old_row != new_row {
                if let Some(old) = old_row {
                    out.push(Entry::delete(key.clone(), old));
                }
                if let Some(new) = new_row {
                    out.push(Entry::insert(key.clone(), new));
                }
            }

            if state.weight > 0 {
                self.groups.insert(group, state);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_expr::{Expr, ExprCompiler, OperatorRegistry};
    use std::rc::Rc;

    fn compiler() -> ExprCompiler {
        ExprCompiler::new(Rc::new(OperatorRegistry::with_builtins()))
    }

    fn count_by_team() -> GroupOp {
        let c = compiler();
        let registry = c.registry().clone();
        GroupOp::new(
            vec![("team".into(), c.compile(&Expr::field("team")).unwrap())],
            vec![
                AggSpec {
                    field: "members".into(),
                    factory: registry.aggregate("count").unwrap().clone(),
                    arg: None,
                },
                AggSpec {
                    field: "total".into(),
                    factory: registry.aggregate("sum").unwrap().clone(),
                    arg: Some(c.compile(&Expr::field("score")).unwrap()),
                },
            ],
        )
    }

    fn player(id: i64, team: &str, score: i64) -> Entry {
        Entry::insert(
            Key::Int(id),
            Row::from_pairs([
                ("id", Value::Int(id)),
                ("team", Value::from(team)),
                ("score", Value::Int(score)),
            ]),
        )
    }

    #[test]
    fn test_group_insert_emits_update_pair() {
        let mut op = count_by_team();
        let out = op.on_batch(0, &vec![player(1, "red", 10)]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].mult, 1);
        assert_eq!(out[0].key, Key::Str("red".into()));
        assert_eq!(out[0].row.get("members"), Some(&Value::Int(1)));
        assert_eq!(out[0].row.get("total"), Some(&Value::Int(10)));

        // second member: old aggregate row retracted, new one inserted
        let out = op.on_batch(0, &vec![player(2, "red", 5)]).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].mult, -1);
        assert_eq!(out[0].row.get("members"), Some(&Value::Int(1)));
        assert_eq!(out[1].mult, 1);
        assert_eq!(out[1].row.get("members"), Some(&Value::Int(2)));
        assert_eq!(out[1].row.get("total"), Some(&Value::Int(15)));
    }

    #[test]
    fn test_group_retraction_and_removal() {
        let mut op = count_by_team();
        op.on_batch(0, &vec![player(1, "red", 10), player(2, "red", 5)])
            .unwrap();

        let out = op
            .on_batch(0, &vec![player(2, "red", 5).negate()])
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].row.get("total"), Some(&Value::Int(10)));

        // removing the last member deletes the group row entirely
        let out = op
            .on_batch(0, &vec![player(1, "red", 10).negate()])
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].mult, -1);
    }

    #[test]
    fn test_group_batch_touching_two_groups() {
        let mut op = count_by_team();
        let out = op
            .on_batch(0, &vec![player(1, "red", 1), player(2, "blue", 2)])
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| e.mult == 1));
    }

    #[test]
    fn test_group_unchanged_aggregate_emits_nothing() {
        let c = compiler();
        let registry = c.registry().clone();
        // min over score: adding a larger score leaves the row unchanged
        let mut op = GroupOp::new(
            vec![("team".into(), c.compile(&Expr::field("team")).unwrap())],
            vec![AggSpec {
                field: "best".into(),
                factory: registry.aggregate("min").unwrap().clone(),
                arg: Some(c.compile(&Expr::field("score")).unwrap()),
            }],
        );
        op.on_batch(0, &vec![player(1, "red", 10)]).unwrap();
        let out = op.on_batch(0, &vec![player(2, "red", 50)]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_global_group_without_keys() {
        let c = compiler();
        let registry = c.registry().clone();
        let mut op = GroupOp::new(
            vec![],
            vec![AggSpec {
                field: "n".into(),
                factory: registry.aggregate("count").unwrap().clone(),
                arg: None,
            }],
        );
        let out = op.on_batch(0, &vec![player(1, "red", 1)]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].row.get("n"), Some(&Value::Int(1)));

        let out = op.on_batch(0, &vec![player(2, "blue", 2)]).unwrap();
        assert_eq!(out[1].row.get("n"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_rebuild_for_non_retractable_aggregate() {
        struct LastSeen {
            values: Vec<Value>,
        }
        impl Accumulator for LastSeen {
            fn apply(&mut self, value: &Value, mult: i32) {
                // positive folds only; retraction unsupported
                for _ in 0..mult.max(0) {
                    self.values.push(value.clone());
                }
            }
            fn value(&self) -> Value {
                self.values.last().cloned().unwrap_or(Value::Null)
            }
            fn is_retractable(&self) -> bool {
                false
            }
        }

        let c = compiler();
        let mut op = GroupOp::new(
            vec![("team".into(), c.compile(&Expr::field("team")).unwrap())],
            vec![AggSpec {
                field: "last".into(),
                factory: Rc::new(|| Box::new(LastSeen { values: vec![] })),
                arg: Some(c.compile(&Expr::field("score")).unwrap()),
            }],
        );
        op.on_batch(0, &vec![player(1, "red", 10), player(2, "red", 20)])
            .unwrap();

        // retracting forces a rebuild from retained rows
        let out = op
            .on_batch(0, &vec![player(2, "red", 20).negate()])
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].row.get("last"), Some(&Value::Int(10)));
    }
}
