//! Benchmarks for rill-ivm delta propagation.
//!
//! Target: single row delta through a filter+join+group pipeline < 100μs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rill_core::{Key, Row, Value};
use rill_expr::{Expr, ExprCompiler, OperatorRegistry};
use rill_ivm::operators::group::{AggSpec, GroupOp};
use rill_ivm::operators::join::JoinOp;
use rill_ivm::{DataflowGraph, Entry, JoinType};
use std::rc::Rc;

fn user(id: i64, team: i64, score: i64) -> Entry {
    Entry::insert(
        Key::Int(id),
        Row::from_pairs([
            ("id", Value::Int(id)),
            ("team", Value::Int(team)),
            ("score", Value::Int(score)),
        ])
        .namespaced("u"),
    )
}

fn team(id: i64) -> Entry {
    Entry::insert(
        Key::Int(id),
        Row::from_pairs([("id", Value::Int(id))]).namespaced("t"),
    )
}

fn build_graph(compiler: &ExprCompiler) -> DataflowGraph {
    let registry = compiler.registry().clone();
    let mut graph = DataflowGraph::new();
    let users = graph.add_input("users");
    let teams = graph.add_input("teams");
    let active = graph.add_filter(
        users,
        compiler
            .compile(&Expr::field("u.score").gt(Expr::lit(0)))
            .unwrap(),
    );
    let joined = graph.add_join(
        active,
        teams,
        JoinOp::new(
            JoinType::Inner,
            compiler.compile(&Expr::field("u.team")).unwrap(),
            compiler.compile(&Expr::field("t.id")).unwrap(),
        ),
    );
    let grouped = graph.add_group(
        joined,
        GroupOp::new(
            vec![(
                "team".into(),
                compiler.compile(&Expr::field("t.id")).unwrap(),
            )],
            vec![AggSpec {
                field: "total".into(),
                factory: registry.aggregate("sum").unwrap().clone(),
                arg: Some(compiler.compile(&Expr::field("u.score")).unwrap()),
            }],
        ),
    );
    graph.set_output(grouped);
    graph
}

fn bench_single_row_update(c: &mut Criterion) {
    let compiler = ExprCompiler::new(Rc::new(OperatorRegistry::with_builtins()));
    let mut group = c.benchmark_group("single_row");

    for size in [100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("pipeline", size), &size, |b, &size| {
            let mut graph = build_graph(&compiler);
            let teams: Vec<Entry> = (0..10).map(team).collect();
            graph.push("teams", &teams).unwrap();
            let users: Vec<Entry> = (0..size as i64)
                .map(|i| user(i, i % 10, i % 100))
                .collect();
            graph.push("users", &users).unwrap();

            let mut next = size as i64;
            b.iter(|| {
                let batch = vec![user(next, next % 10, 42)];
                next += 1;
                black_box(graph.push("users", &batch).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_batch_propagation(c: &mut Criterion) {
    let compiler = ExprCompiler::new(Rc::new(OperatorRegistry::with_builtins()));
    let mut group = c.benchmark_group("batch");

    for size in [10usize, 100, 1_000] {
        group.bench_with_input(BenchmarkId::new("seed", size), &size, |b, &size| {
            let users: Vec<Entry> = (0..size as i64)
                .map(|i| user(i, i % 10, i % 100))
                .collect();
            let teams: Vec<Entry> = (0..10).map(team).collect();
            b.iter(|| {
                let mut graph = build_graph(&compiler);
                graph.push("teams", &teams).unwrap();
                black_box(graph.push("users", &users).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_row_update, bench_batch_propagation);
criterion_main!(benches);
