//! R1 automation: an in-process benchmarker (cold-start,
//! reset, warmup, then measured CRUD ops) plus a flake evaluator that
//! re-runs a scenario list `R` times and fingerprints each result,
//! rolled up into a four-gate report.

use std::collections::HashSet;
use std::time::Instant;

use crate::backend::Backend;
use crate::diff::{DiffResult, DiffStatus};
use crate::harness::DifferentialHarness;
use crate::quality_gate::{percentile, Gate, QualityGateReport};
use crate::scenario::{Scenario, ScenarioCommand};
use crate::value::{OrderedMap2, Value};

fn ping_scenario(id: &str) -> Scenario {
    Scenario::build(id, "r1 benchmarker probe", vec![ScenarioCommand::new("ping", OrderedMap2::new())])
        .expect("ping scenario is always well-formed")
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Benchmark one in-process backend instance: the first `execute` call is
/// cold-start, the second is reset overhead, then `warmup` discarded
/// iterations followed by `measured` iterations of `crud_scenario`
/// contribute latency samples for the crud-p95 gate.
pub struct BenchmarkSummary {
    pub cold_start_ms: f64,
    pub reset_ms: f64,
    pub crud_p95_ms: f64,
    pub crud_latencies_ms: Vec<f64>,
}

pub async fn benchmark<B: Backend>(backend: &B, crud_scenario: &Scenario, warmup: usize, measured: usize) -> BenchmarkSummary {
    let probe = ping_scenario("r1-cold-start");

    let start = Instant::now();
    let _ = backend.execute(&probe).await;
    let cold_start_ms = elapsed_ms(start);

    let reset_probe = ping_scenario("r1-reset");
    let start = Instant::now();
    let _ = backend.execute(&reset_probe).await;
    let reset_ms = elapsed_ms(start);

    for _ in 0..warmup {
        let _ = backend.execute(crud_scenario).await;
    }

    let mut crud_latencies_ms = Vec::with_capacity(measured);
    for _ in 0..measured {
        let start = Instant::now();
        let _ = backend.execute(crud_scenario).await;
        crud_latencies_ms.push(elapsed_ms(start));
    }

    let crud_p95_ms = percentile(&crud_latencies_ms, 0.95);

    BenchmarkSummary {
        cold_start_ms,
        reset_ms,
        crud_p95_ms,
        crud_latencies_ms,
    }
}

/// A deterministic, order-insensitive fingerprint of a `DiffResult`: its
/// status, error message, and per-entry `(path, leftJson, rightJson,
/// note)` tuples.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResultFingerprint {
    status: String,
    error_message: Option<String>,
    entries: Vec<(String, String, String, String)>,
}

fn status_label(status: &DiffStatus) -> &'static str {
    match status {
        DiffStatus::Match => "MATCH",
        DiffStatus::Mismatch => "MISMATCH",
        DiffStatus::Error => "ERROR",
    }
}

fn fingerprint(result: &DiffResult) -> ResultFingerprint {
    ResultFingerprint {
        status: status_label(&result.status).to_string(),
        error_message: result.error_message.clone(),
        entries: result
            .entries
            .iter()
            .map(|e| {
                (
                    e.path.clone(),
                    e.left.to_string(),
                    e.right.to_string(),
                    e.note.clone(),
                )
            })
            .collect(),
    }
}

/// Re-run `scenarios` through `harness` `repetitions` times; a scenario
/// is flaky if its fingerprint differs across runs. `flake_rate` is the
/// fraction of scenarios observed to be flaky.
pub async fn evaluate_flake_rate<L: Backend, R: Backend>(
    harness: &DifferentialHarness<L, R>,
    scenarios: &[Scenario],
    repetitions: usize,
    generated_at: &str,
) -> f64 {
    if scenarios.is_empty() || repetitions == 0 {
        return 0.0;
    }

    let mut fingerprints_by_scenario: Vec<HashSet<ResultFingerprint>> =
        vec![HashSet::new(); scenarios.len()];

    for _ in 0..repetitions {
        let report = harness.run_all(scenarios, generated_at).await;
        for (index, result) in report.results.iter().enumerate() {
            fingerprints_by_scenario[index].insert(fingerprint(result));
        }
    }

    let flaky = fingerprints_by_scenario.iter().filter(|set| set.len() > 1).count();
    flaky as f64 / scenarios.len() as f64
}

/// Emit the four-gate R1 report: `cold-start ≤ 150ms`, `reset ≤ 10ms`,
/// `crud-p95 ≤ 5ms`, `flake-rate ≤ 0.002`.
pub fn build_report(summary: &BenchmarkSummary, flake_rate: f64) -> QualityGateReport {
    let gates = vec![
        Gate::le("cold-start-ms", 150.0).evaluate(summary.cold_start_ms),
        Gate::le("reset-ms", 10.0).evaluate(summary.reset_ms),
        Gate::le("crud-p95-ms", 5.0).evaluate(summary.crud_p95_ms),
        Gate::le("flake-rate", 0.002).evaluate(flake_rate),
    ];
    QualityGateReport::new("r1-automation", gates, "cold-start/reset/crud-p95/flake-rate")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::in_process::InProcessBackend;

    fn crud_scenario() -> Scenario {
        Scenario::build(
            "r1-crud",
            "ping loop",
            vec![ScenarioCommand::new("ping", OrderedMap2::new())],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn benchmark_collects_expected_sample_count() {
        let backend = InProcessBackend::new();
        let summary = benchmark(&backend, &crud_scenario(), 2, 10).await;
        assert_eq!(summary.crud_latencies_ms.len(), 10);
        assert!(summary.crud_p95_ms >= 0.0);
    }

    #[tokio::test]
    async fn identical_in_process_runs_have_zero_flake_rate() {
        let harness = DifferentialHarness::new(InProcessBackend::new(), InProcessBackend::new());
        let scenarios = vec![crud_scenario()];
        let rate = evaluate_flake_rate(&harness, &scenarios, 3, "2026-01-01T00:00:00Z").await;
        assert_eq!(rate, 0.0);
    }

    #[test]
    fn report_fails_when_cold_start_exceeds_threshold() {
        let summary = BenchmarkSummary {
            cold_start_ms: 200.0,
            reset_ms: 1.0,
            crud_p95_ms: 1.0,
            crud_latencies_ms: vec![1.0],
        };
        let report = build_report(&summary, 0.0);
        assert!(!report.all_passed());
    }
}
