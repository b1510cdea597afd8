use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mongo_diff_harness::backend::in_process::InProcessBackend;
use mongo_diff_harness::backend::Backend;
use mongo_diff_harness::scenario::{Scenario, ScenarioCommand};
use mongo_diff_harness::value::{OrderedMap2, Value};
use tokio::runtime::Runtime;

fn ping_scenario() -> Scenario {
    Scenario::build("bench-ping", "ping probe", vec![ScenarioCommand::new("ping", OrderedMap2::new())])
        .expect("ping scenario is always well-formed")
}

fn insert_scenario(batch_size: usize) -> Scenario {
    let commands = (0..batch_size)
        .map(|i| {
            let mut payload = OrderedMap2::new();
            payload.insert("collection", Value::String("bench_widgets".to_string()));
            payload.insert(
                "documents",
                Value::Array(vec![Value::object([
                    ("_id".to_string(), Value::Int32(i as i32)),
                    ("label".to_string(), Value::String(format!("widget-{i}"))),
                ])]),
            );
            ScenarioCommand::new("insert", payload)
        })
        .collect();
    Scenario::build("bench-insert", "insert batch", commands).expect("insert scenario is always well-formed")
}

fn ping_throughput(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let backend = InProcessBackend::new();
    let scenario = ping_scenario();

    c.bench_function("ping_roundtrip", |b| {
        b.iter(|| {
            rt.block_on(async {
                let outcome = backend.execute(black_box(&scenario)).await;
                black_box(outcome);
            });
        });
    });
}

fn insert_batch_throughput(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let backend = InProcessBackend::new();

    let mut group = c.benchmark_group("insert_batch");
    group.measurement_time(Duration::from_secs(10));

    for batch_size in [1usize, 10, 100] {
        let scenario = insert_scenario(batch_size);
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &batch_size, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let outcome = backend.execute(black_box(&scenario)).await;
                    black_box(outcome);
                });
            });
        });
    }

    group.finish();
}

criterion_group!(benches, ping_throughput, insert_batch_throughput);
criterion_main!(benches);
