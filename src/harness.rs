//! The differential harness: runs one scenario to completion
//! against the left backend, then the right backend, and diffs the two
//! outcomes. Scenarios are independent of one another and may run
//! concurrently, but within a scenario the two backend executions are
//! strictly sequential and order-preserving (left first, always).

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::diff::{diff_outcomes, DiffResult, DiffStatus};
use crate::scenario::Scenario;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffCounters {
    pub total: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub errored: usize,
}

impl DiffCounters {
    fn record(&mut self, status: &DiffStatus) {
        self.total += 1;
        match status {
            DiffStatus::Match => self.matched += 1,
            DiffStatus::Mismatch => self.mismatched += 1,
            DiffStatus::Error => self.errored += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifferentialReport {
    pub generated_at: String,
    pub left_backend: String,
    pub right_backend: String,
    pub results: Vec<DiffResult>,
    pub counters: DiffCounters,
}

pub struct DifferentialHarness<L: Backend, R: Backend> {
    left: L,
    right: R,
}

impl<L: Backend, R: Backend> DifferentialHarness<L, R> {
    pub fn new(left: L, right: R) -> Self {
        Self { left, right }
    }

    /// Run one scenario against both backends, left before right, and
    /// diff the two outcomes.
    pub async fn run_one(&self, scenario: &Scenario) -> DiffResult {
        let left_outcome = self.left.execute(scenario).await;
        let right_outcome = self.right.execute(scenario).await;
        diff_outcomes(
            scenario.id(),
            self.left.name(),
            self.right.name(),
            &left_outcome,
            &right_outcome,
        )
    }

    /// Run a whole corpus, sequentially, preserving input order in the
    /// report's `results`.
    pub async fn run_all(&self, scenarios: &[Scenario], generated_at: impl Into<String>) -> DifferentialReport {
        let mut results = Vec::with_capacity(scenarios.len());
        let mut counters = DiffCounters::default();
        for scenario in scenarios {
            let result = self.run_one(scenario).await;
            counters.record(&result.status);
            results.push(result);
        }
        DifferentialReport {
            generated_at: generated_at.into(),
            left_backend: self.left.name().to_string(),
            right_backend: self.right.name().to_string(),
            results,
            counters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::in_process::InProcessBackend;
    use crate::scenario::ScenarioCommand;
    use crate::value::OrderedMap2;

    #[tokio::test]
    async fn identical_backends_always_match() {
        let harness = DifferentialHarness::new(InProcessBackend::new(), InProcessBackend::new());
        let scenario = Scenario::build(
            "ping",
            "trivial ping",
            vec![ScenarioCommand::new("ping", OrderedMap2::new())],
        )
        .unwrap();
        let result = harness.run_one(&scenario).await;
        assert_eq!(result.status, DiffStatus::Match);
    }

    #[tokio::test]
    async fn run_all_preserves_order_and_counts() {
        let harness = DifferentialHarness::new(InProcessBackend::new(), InProcessBackend::new());
        let scenarios = vec![
            Scenario::build(
                "a",
                "first",
                vec![ScenarioCommand::new("ping", OrderedMap2::new())],
            )
            .unwrap(),
            Scenario::build(
                "b",
                "second",
                vec![ScenarioCommand::new("ping", OrderedMap2::new())],
            )
            .unwrap(),
        ];
        let report = harness.run_all(&scenarios, "2026-07-28T00:00:00Z").await;
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].scenario_id, "a");
        assert_eq!(report.results[1].scenario_id, "b");
        assert_eq!(report.counters.total, 2);
        assert_eq!(report.counters.matched, 2);
    }
}
