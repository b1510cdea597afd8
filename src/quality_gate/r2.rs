//! R2 scorecard and canary certification.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::diff::{DiffResult, DiffStatus};
use crate::harness::DifferentialReport;
use crate::quality_gate::{Gate, QualityGateReport};

/// One row of an externally supplied Spring Data MongoDB compatibility
/// matrix: whether a named feature's test passed against this engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpringMatrixEntry {
    pub feature: String,
    pub passed: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpringMatrixReport {
    pub entries: Vec<SpringMatrixEntry>,
}

impl SpringMatrixReport {
    pub fn pass_rate(&self) -> f64 {
        if self.entries.is_empty() {
            return 1.0;
        }
        let passed = self.entries.iter().filter(|e| e.passed).count();
        passed as f64 / self.entries.len() as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupportLevel {
    Supported,
    Partial,
    Unsupported,
}

fn support_level(result: &DiffResult) -> (SupportLevel, String) {
    match result.status {
        DiffStatus::Match => (SupportLevel::Supported, "matched the reference".to_string()),
        DiffStatus::Mismatch => (
            SupportLevel::Partial,
            format!("{} field-level divergence(s)", result.entries.len()),
        ),
        DiffStatus::Error => (
            SupportLevel::Unsupported,
            result
                .error_message
                .clone()
                .unwrap_or_else(|| "execution error".to_string()),
        ),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportManifestEntry {
    pub feature: String,
    pub status: SupportLevel,
    pub note: String,
}

/// A static feature → `{SUPPORTED, PARTIAL, UNSUPPORTED, note}` manifest
/// derived from a differential report, one entry per scenario id.
pub fn support_manifest(report: &DifferentialReport) -> BTreeMap<String, SupportManifestEntry> {
    report
        .results
        .iter()
        .map(|result| {
            let (status, note) = support_level(result);
            (
                result.scenario_id.clone(),
                SupportManifestEntry {
                    feature: result.scenario_id.clone(),
                    status,
                    note,
                },
            )
        })
        .collect()
}

/// Gate a differential report + Spring matrix: `mismatch = 0 & error =
/// 0`, `spring pass-rate >= 0.98`.
pub fn scorecard(report: &DifferentialReport, spring: &SpringMatrixReport) -> QualityGateReport {
    let gates = vec![
        Gate::le("mismatch-count", 0.0).evaluate(report.counters.mismatched as f64),
        Gate::le("error-count", 0.0).evaluate(report.counters.errored as f64),
        Gate::ge("spring-pass-rate", 0.98).evaluate(spring.pass_rate()),
    ];
    QualityGateReport::new("r2-scorecard", gates, "mismatch=0, error=0, spring pass-rate>=0.98")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CanaryProject {
    pub name: String,
    pub canary_failed: bool,
    pub rollback_succeeded: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CanaryProjects {
    pub projects: Vec<CanaryProject>,
}

/// Gate a canary certification run: `>= 3 projects`, zero canary
/// failures, `100%` successful rollbacks.
pub fn canary_certification(projects: &CanaryProjects) -> QualityGateReport {
    let count = projects.projects.len();
    let failures = projects.projects.iter().filter(|p| p.canary_failed).count();
    let rollback_rate = if count == 0 {
        0.0
    } else {
        projects.projects.iter().filter(|p| p.rollback_succeeded).count() as f64 / count as f64
    };

    let gates = vec![
        Gate::ge("project-count", 3.0).evaluate(count as f64),
        Gate::le("canary-failures", 0.0).evaluate(failures as f64),
        Gate::ge("rollback-success-rate", 1.0).evaluate(rollback_rate),
    ];
    QualityGateReport::new(
        "r2-canary-certification",
        gates,
        "projects>=3, zero canary failures, 100% rollback success",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::DiffCounters;

    fn report_with(matched: usize, mismatched: usize, errored: usize) -> DifferentialReport {
        DifferentialReport {
            generated_at: "2026-01-01T00:00:00Z".to_string(),
            left_backend: "in-process".to_string(),
            right_backend: "reference".to_string(),
            results: Vec::new(),
            counters: DiffCounters {
                total: matched + mismatched + errored,
                matched,
                mismatched,
                errored,
            },
        }
    }

    #[test]
    fn scorecard_passes_when_clean_and_spring_compatible() {
        let report = report_with(10, 0, 0);
        let spring = SpringMatrixReport {
            entries: vec![SpringMatrixEntry {
                feature: "repository-query".to_string(),
                passed: true,
            }],
        };
        assert!(scorecard(&report, &spring).all_passed());
    }

    #[test]
    fn scorecard_fails_on_any_mismatch() {
        let report = report_with(9, 1, 0);
        let spring = SpringMatrixReport { entries: vec![] };
        assert!(!scorecard(&report, &spring).all_passed());
    }

    #[test]
    fn canary_requires_at_least_three_projects() {
        let projects = CanaryProjects {
            projects: vec![
                CanaryProject {
                    name: "a".to_string(),
                    canary_failed: false,
                    rollback_succeeded: true,
                },
                CanaryProject {
                    name: "b".to_string(),
                    canary_failed: false,
                    rollback_succeeded: true,
                },
            ],
        };
        assert!(!canary_certification(&projects).all_passed());
    }

    #[test]
    fn canary_passes_with_three_clean_projects() {
        let projects = CanaryProjects {
            projects: (0..3)
                .map(|i| CanaryProject {
                    name: format!("project-{i}"),
                    canary_failed: false,
                    rollback_succeeded: true,
                })
                .collect(),
        };
        assert!(canary_certification(&projects).all_passed());
    }
}
