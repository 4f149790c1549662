//! Query-to-dataflow compilation.
//!
//! Each source's rows are namespaced under its alias, so expressions
//! address them as `alias.field` throughout the pipeline. Join
//! conditions must decompose into equalities between the accumulated
//! sides and the newly joined alias; grouped selects must project only
//! aggregates and group-by expressions. Single-source queries with no
//! select get their rows un-namespaced again at the output, so callers
//! see plain collection rows.

use crate::error::QueryError;
use crate::ir::QueryIr;
use hashbrown::HashSet;
use rill_core::{Row, Value};
use rill_expr::{
    compile_comparator, CompileError, Expr, Evaluator, ExprCompiler,
};
use rill_ivm::operators::group::{AggSpec, GroupOp};
use rill_ivm::operators::join::JoinOp;
use rill_ivm::operators::map::Projector;
use rill_ivm::operators::topk::TopKOp;
use rill_ivm::{DataflowGraph, NodeId};
use std::rc::Rc;

/// A compiled query: the operator graph, ready to be seeded and ticked.
pub struct CompiledQuery {
    pub graph: DataflowGraph,
}

impl std::fmt::Debug for CompiledQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledQuery").finish_non_exhaustive()
    }
}

/// Compiles [`QueryIr`] into a [`DataflowGraph`].
pub struct QueryCompiler {
    expr: ExprCompiler,
}

fn namespacer(alias: &str) -> Projector {
    let alias = alias.to_string();
    Rc::new(move |row: &Row| Ok(row.clone().namespaced(&alias)))
}

/// Combines per-equality key evaluators into one join-key evaluator. A
/// `Null` in any part nullifies the whole key, so it never matches.
fn combined_key(mut evals: Vec<Evaluator>) -> Evaluator {
    if evals.len() == 1 {
        if let Some(single) = evals.pop() {
            return single;
        }
    }
    Rc::new(move |row: &Row| {
        let mut parts = Vec::with_capacity(evals.len());
        for eval in &evals {
            let value = eval(row)?;
            if value.is_null() {
                return Ok(Value::Null);
            }
            parts.push(value);
        }
        Ok(Value::Array(parts))
    })
}

#[derive(PartialEq)]
enum JoinSide {
    Accumulated,
    Joined,
}

/// Which side of the join an expression reads, judged by the aliases its
/// field paths start with. Expressions reading no fields (or both sides)
/// have no side.
fn side_of(expr: &Expr, accumulated: &HashSet<String>, joined: &str) -> Option<JoinSide> {
    let paths = expr.field_paths();
    if paths.is_empty() {
        return None;
    }
    let mut acc = true;
    let mut join = true;
    for path in paths {
        let head = path.first().map(String::as_str).unwrap_or("");
        acc &= accumulated.contains(head);
        join &= head == joined;
    }
    match (acc, join) {
        (true, false) => Some(JoinSide::Accumulated),
        (false, true) => Some(JoinSide::Joined),
        _ => None,
    }
}

/// Decomposes a join condition into `(left, right)` equality pairs.
fn split_equalities(expr: &Expr, out: &mut Vec<(Expr, Expr)>) -> Result<(), QueryError> {
    match expr {
        Expr::Func { name, args } if name == "eq" && args.len() == 2 => {
            out.push((args[0].clone(), args[1].clone()));
            Ok(())
        }
        Expr::Func { name, args } if name == "and" => {
            for arg in args {
                split_equalities(arg, out)?;
            }
            Ok(())
        }
        _ => Err(QueryError::UnsupportedJoinCondition),
    }
}

impl QueryCompiler {
    pub fn new(expr: ExprCompiler) -> Self {
        Self { expr }
    }

    pub fn compile(&self, ir: &QueryIr) -> Result<CompiledQuery, QueryError> {
        let mut aliases: HashSet<String> = HashSet::new();
        aliases.insert(ir.from.alias.clone());
        for join in &ir.joins {
            if !aliases.insert(join.source.alias.clone()) {
                return Err(QueryError::DuplicateAlias(join.source.alias.clone()));
            }
        }
        let mut graph = DataflowGraph::new();
        let input = graph.add_input(&ir.from.collection);
        let mut node = graph.add_map(input, namespacer(&ir.from.alias));

        let mut accumulated: HashSet<String> = HashSet::new();
        accumulated.insert(ir.from.alias.clone());

        for join in &ir.joins {
            let right_input = graph.add_input(&join.source.collection);
            let right = graph.add_map(right_input, namespacer(&join.source.alias));

            let mut pairs = Vec::new();
            split_equalities(&join.on, &mut pairs)?;
            if pairs.is_empty() {
                return Err(QueryError::UnsupportedJoinCondition);
            }

            let mut left_keys = Vec::new();
            let mut right_keys = Vec::new();
            for (a, b) in &pairs {
                let sa = side_of(a, &accumulated, &join.source.alias);
                let sb = side_of(b, &accumulated, &join.source.alias);
                match (sa, sb) {
                    (Some(JoinSide::Accumulated), Some(JoinSide::Joined)) => {
                        left_keys.push(self.expr.compile(a)?);
                        right_keys.push(self.expr.compile(b)?);
                    }
                    (Some(JoinSide::Joined), Some(JoinSide::Accumulated)) => {
                        left_keys.push(self.expr.compile(b)?);
                        right_keys.push(self.expr.compile(a)?);
                    }
                    _ => return Err(QueryError::UnsupportedJoinCondition),
                }
            }

            node = graph.add_join(
                node,
                right,
                JoinOp::new(
                    join.kind,
                    combined_key(left_keys),
                    combined_key(right_keys),
                ),
            );
            accumulated.insert(join.source.alias.clone());
        }

        if let Some(filter) = &ir.filter {
            node = graph.add_filter(node, self.expr.compile(filter)?);
        }

        let grouped = !ir.group_by.is_empty()
            || ir.select.iter().any(|(_, e)| e.contains_aggregate());
        if grouped {
            node = self.compile_group(ir, &mut graph, node)?;
        } else if !ir.select.is_empty() {
            node = graph.add_map(node, self.projector(&ir.select)?);
        } else if ir.joins.is_empty() {
            // single source, rows as-is: strip the alias namespace
            let alias = ir.from.alias.clone();
            node = graph.add_map(
                node,
                Rc::new(move |row: &Row| {
                    Ok(row.unwrap_alias(&alias).unwrap_or_else(|| row.clone()))
                }),
            );
        }

        if !ir.order_by.is_empty() {
            let cmp = compile_comparator(&ir.order_by, &self.expr)?;
            node = graph.add_topk(node, TopKOp::new(cmp, ir.offset, ir.limit));
        } else if ir.limit.is_some() || ir.offset > 0 {
            return Err(QueryError::LimitWithoutOrderBy);
        }

        graph.set_output(node);
        Ok(CompiledQuery { graph })
    }

    fn projector(&self, select: &[(String, Expr)]) -> Result<Projector, CompileError> {
        let items = select
            .iter()
            .map(|(name, expr)| Ok((name.clone(), self.expr.compile(expr)?)))
            .collect::<Result<Vec<_>, CompileError>>()?;
        Ok(Rc::new(move |row: &Row| {
            let mut out = Row::new();
            for (name, eval) in &items {
                out.set(name.clone(), eval(row)?);
            }
            Ok(out)
        }))
    }

    fn compile_group(
        &self,
        ir: &QueryIr,
        graph: &mut DataflowGraph,
        upstream: NodeId,
    ) -> Result<NodeId, QueryError> {
        if ir.select.is_empty() {
            return Err(QueryError::GroupedQueryWithoutSelect);
        }

        // every non-aggregate select item must be one of the group-by
        // expressions
        for (name, expr) in &ir.select {
            if expr.is_aggregate() {
                continue;
            }
            if expr.contains_aggregate() {
                return Err(QueryError::MixedAggregateSelect(name.clone()));
            }
            if !ir.group_by.contains(expr) {
                return Err(QueryError::UngroupedSelect(name.clone()));
            }
        }

        // group identity spans all group-by expressions, projected or
        // not; unprojected ones get hidden names and are stripped after
        let mut keys = Vec::new();
        let mut hidden = Vec::new();
        for (i, group_expr) in ir.group_by.iter().enumerate() {
            let name = ir
                .select
                .iter()
                .find(|(_, e)| e == group_expr)
                .map(|(n, _)| n.clone())
                .unwrap_or_else(|| {
                    let name = format!("__group{i}");
                    hidden.push(name.clone());
                    name
                });
            keys.push((name, self.expr.compile(group_expr)?));
        }

        let registry = self.expr.registry().clone();
        let mut aggs = Vec::new();
        for (name, expr) in &ir.select {
            if let Expr::Aggregate { name: agg, arg } = expr {
                let factory = registry
                    .aggregate(agg)
                    .ok_or_else(|| CompileError::UnknownAggregate(agg.clone()))?
                    .clone();
                let arg = match arg {
                    Some(arg) => Some(self.expr.compile(arg)?),
                    None => None,
                };
                aggs.push(AggSpec {
                    field: name.clone(),
                    factory,
                    arg,
                });
            }
        }

        let mut node = graph.add_group(upstream, GroupOp::new(keys, aggs));
        if !hidden.is_empty() {
            node = graph.add_map(
                node,
                Rc::new(move |row: &Row| {
                    let mut out = row.clone();
                    for name in &hidden {
                        out.remove(name);
                    }
                    Ok(out)
                }),
            );
        }
        Ok(node)
    }
}
