//! The dataflow graph.
//!
//! Nodes live in an arena and are wired by id. Ids are assigned in
//! construction order and every node's upstreams are created before it,
//! so ascending id order is a topological order; one tick drains node
//! inboxes in that order. Fan-out delivers the same emitted batch to
//! every downstream port.

use crate::delta::DeltaBatch;
use crate::operators::filter::FilterOp;
use crate::operators::group::GroupOp;
use crate::operators::join::JoinOp;
use crate::operators::map::{MapOp, Projector};
use crate::operators::topk::TopKOp;
use hashbrown::HashMap;
use rill_expr::{EvalError, Evaluator};
use tracing::{debug, warn};

/// Index of a node in the graph arena.
pub type NodeId = usize;

/// A stateful dataflow operator.
///
/// `on_batch` receives one input batch on one port and returns the
/// operator's output delta. Implementations evaluate every expression
/// for the batch before mutating retained state, so a failing tick
/// leaves state from earlier ticks intact.
pub trait Operator {
    fn on_batch(&mut self, port: usize, batch: &DeltaBatch) -> Result<DeltaBatch, EvalError>;
}

/// Stateless pass-through, used for inputs, unions, and the output tap.
struct Passthrough;

impl Operator for Passthrough {
    fn on_batch(&mut self, _port: usize, batch: &DeltaBatch) -> Result<DeltaBatch, EvalError> {
        Ok(batch.clone())
    }
}

struct Node {
    op: Box<dyn Operator>,
    label: &'static str,
    /// (target node, target port) pairs fed by this node's output.
    downstream: Vec<(NodeId, usize)>,
}

/// An operator graph maintaining one query.
pub struct DataflowGraph {
    nodes: Vec<Node>,
    inputs: HashMap<String, NodeId>,
    output: Option<NodeId>,
}

impl DataflowGraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            inputs: HashMap::new(),
            output: None,
        }
    }

    /// Adds an operator wired to `upstreams`; the i-th upstream feeds
    /// port i.
    pub fn add_node(
        &mut self,
        op: Box<dyn Operator>,
        label: &'static str,
        upstreams: &[NodeId],
    ) -> NodeId {
        let id = self.nodes.len();
        for (port, &up) in upstreams.iter().enumerate() {
            self.nodes[up].downstream.push((id, port));
        }
        self.nodes.push(Node {
            op,
            label,
            downstream: Vec::new(),
        });
        id
    }

    /// Adds a named input. Pushing a batch for `name` seeds this node.
    pub fn add_input(&mut self, name: &str) -> NodeId {
        if let Some(&existing) = self.inputs.get(name) {
            return existing;
        }
        let id = self.add_node(Box::new(Passthrough), "input", &[]);
        self.inputs.insert(name.to_string(), id);
        id
    }

    pub fn add_map(&mut self, upstream: NodeId, projector: Projector) -> NodeId {
        self.add_node(Box::new(MapOp::new(projector)), "map", &[upstream])
    }

    pub fn add_filter(&mut self, upstream: NodeId, predicate: Evaluator) -> NodeId {
        self.add_node(Box::new(FilterOp::new(predicate)), "filter", &[upstream])
    }

    pub fn add_join(&mut self, left: NodeId, right: NodeId, op: JoinOp) -> NodeId {
        self.add_node(Box::new(op), "join", &[left, right])
    }

    pub fn add_group(&mut self, upstream: NodeId, op: GroupOp) -> NodeId {
        self.add_node(Box::new(op), "group", &[upstream])
    }

    pub fn add_topk(&mut self, upstream: NodeId, op: TopKOp) -> NodeId {
        self.add_node(Box::new(op), "topk", &[upstream])
    }

    pub fn add_union(&mut self, upstreams: &[NodeId]) -> NodeId {
        self.add_node(Box::new(Passthrough), "union", upstreams)
    }

    /// Marks the node whose emissions are the query result.
    pub fn set_output(&mut self, id: NodeId) {
        self.output = Some(id);
    }

    /// The input names this graph consumes.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    /// Returns true if `name` is one of this graph's inputs.
    pub fn has_source(&self, name: &str) -> bool {
        self.inputs.contains_key(name)
    }

    /// Runs one tick: seeds the named input with `batch`, propagates
    /// through the graph in topological order, and returns the output
    /// node's emissions.
    pub fn push(&mut self, source: &str, batch: &DeltaBatch) -> Result<DeltaBatch, EvalError> {
        let Some(&entry) = self.inputs.get(source) else {
            warn!(source, "delta for unknown input dropped");
            return Ok(Vec::new());
        };
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut inbox: Vec<Vec<(usize, DeltaBatch)>> = vec![Vec::new(); self.nodes.len()];
        inbox[entry].push((0, batch.clone()));

        let mut result = Vec::new();
        for id in 0..self.nodes.len() {
            let arrivals = std::mem::take(&mut inbox[id]);
            for (port, incoming) in arrivals {
                if incoming.is_empty() {
                    continue;
                }
                let node = &mut self.nodes[id];
                let emitted = node.op.on_batch(port, &incoming)?;
                debug!(
                    node = id,
                    label = node.label,
                    input = incoming.len(),
                    output = emitted.len(),
                    "tick"
                );
                if emitted.is_empty() {
                    continue;
                }
                if self.output == Some(id) {
                    result.extend(emitted.iter().cloned());
                }
                for &(target, tport) in &node.downstream {
                    inbox[target].push((tport, emitted.clone()));
                }
            }
        }
        Ok(result)
    }
}

impl Default for DataflowGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{DeltaBatchExt, Entry};
    use rill_core::{Key, Row, Value};
    use rill_expr::{Expr, ExprCompiler, OperatorRegistry};
    use std::rc::Rc;

    fn compiler() -> ExprCompiler {
        ExprCompiler::new(Rc::new(OperatorRegistry::with_builtins()))
    }

    fn row(n: i64) -> Row {
        Row::from_pairs([("n", Value::Int(n))])
    }

    #[test]
    fn test_filter_pipeline() {
        let c = compiler();
        let mut graph = DataflowGraph::new();
        let input = graph.add_input("items");
        let filtered = graph.add_filter(
            input,
            c.compile(&Expr::field("n").gt(Expr::lit(10))).unwrap(),
        );
        graph.set_output(filtered);

        let out = graph
            .push(
                "items",
                &vec![
                    Entry::insert(Key::Int(1), row(5)),
                    Entry::insert(Key::Int(2), row(20)),
                ],
            )
            .unwrap();
        assert_eq!(out, vec![Entry::insert(Key::Int(2), row(20))]);

        // retraction flows through with its sign intact
        let out = graph
            .push("items", &vec![Entry::delete(Key::Int(2), row(20))])
            .unwrap();
        assert_eq!(out, vec![Entry::delete(Key::Int(2), row(20))]);
    }

    #[test]
    fn test_unknown_input_is_dropped() {
        let mut graph = DataflowGraph::new();
        let input = graph.add_input("items");
        graph.set_output(input);
        let out = graph
            .push("other", &vec![Entry::insert(Key::Int(1), row(1))])
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_fanout_and_union() {
        // items splits into two filters whose outputs are unioned:
        // n > 10 keeps 20, n < 3 keeps 1.
        let c = compiler();
        let mut graph = DataflowGraph::new();
        let input = graph.add_input("items");
        let high = graph.add_filter(
            input,
            c.compile(&Expr::field("n").gt(Expr::lit(10))).unwrap(),
        );
        let low = graph.add_filter(
            input,
            c.compile(&Expr::field("n").lt(Expr::lit(3))).unwrap(),
        );
        let merged = graph.add_union(&[high, low]);
        graph.set_output(merged);

        let out = graph
            .push(
                "items",
                &vec![
                    Entry::insert(Key::Int(1), row(1)),
                    Entry::insert(Key::Int(2), row(5)),
                    Entry::insert(Key::Int(3), row(20)),
                ],
            )
            .unwrap();
        assert_eq!(out.net_count(), 2);
        assert!(out.contains(&Entry::insert(Key::Int(1), row(1))));
        assert!(out.contains(&Entry::insert(Key::Int(3), row(20))));
    }

    #[test]
    fn test_input_reuse_by_name() {
        let mut graph = DataflowGraph::new();
        let a = graph.add_input("items");
        let b = graph.add_input("items");
        assert_eq!(a, b);
        assert!(graph.has_source("items"));
        assert!(!graph.has_source("other"));
    }
}
