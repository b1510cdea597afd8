//! R3 failure ledger: re-runs the unified-spec corpus per
//! configured suite, collects non-MATCH results, and classifies each
//! into a track. Gate fails if any ledger entry exists, or a configured
//! suite's spec root is missing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::corpus::{run_corpus, CorpusConfig};
use crate::diff::DiffStatus;
use crate::harness::DifferentialHarness;
use crate::importer::{import_spec_root, ImportProfile, RunOnContext};
use crate::quality_gate::{Gate, QualityGateReport};
use crate::scenario::ScenarioCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    Txn,
    Distinct,
    Aggregation,
    QueryUpdate,
    Protocol,
}

const TRANSACTION_COMMANDS: [&str; 3] = ["startTransaction", "commitTransaction", "abortTransaction"];
const CRUD_COMMANDS: [&str; 6] = ["insert", "find", "update", "delete", "findAndModify", "countDocuments"];

/// Classify one failing case into a track, in priority order:
/// `txn` wins on a path or command match, then `distinct`/`aggregation`
/// by the same path-substring convention, then `query_update` if any
/// CRUD command appears, else `protocol`.
pub fn classify(suite_path: &Path, source_path: &Path, commands: &[ScenarioCommand]) -> Track {
    let haystack = format!(
        "{} {}",
        suite_path.to_string_lossy().to_lowercase(),
        source_path.to_string_lossy().to_lowercase()
    );
    let uses_txn_command = commands.iter().any(|c| {
        TRANSACTION_COMMANDS.contains(&c.command_name.as_str()) || c.payload.contains_key("txnNumber")
    });
    if haystack.contains("transaction") || uses_txn_command {
        return Track::Txn;
    }
    if haystack.contains("distinct") {
        return Track::Distinct;
    }
    if haystack.contains("aggregat") {
        return Track::Aggregation;
    }
    if commands.iter().any(|c| CRUD_COMMANDS.contains(&c.command_name.as_str())) {
        return Track::QueryUpdate;
    }
    Track::Protocol
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub suite_id: String,
    pub scenario_id: String,
    pub status: String,
    pub track: Track,
    pub note: String,
}

pub struct SuiteConfig {
    pub suite_id: String,
    pub spec_root: PathBuf,
}

/// Re-run every configured suite's corpus and build the failure ledger.
/// A suite whose `spec_root` doesn't exist is recorded as a missing-suite
/// note and fails the gate regardless of ledger contents.
pub async fn build_ledger<L, R, RB>(
    harness: &DifferentialHarness<L, R>,
    suites: &[SuiteConfig],
    ctx: &RunOnContext,
    profile: ImportProfile,
    replay_backend: &RB,
    seed: &str,
    generated_at: &str,
) -> Result<Vec<LedgerEntry>, Vec<String>>
where
    L: Backend,
    R: Backend,
    RB: Backend,
{
    let mut entries = Vec::new();
    let mut missing = Vec::new();

    for suite in suites {
        if !suite.spec_root.exists() {
            missing.push(format!("suite '{}' spec root not found: {}", suite.suite_id, suite.spec_root.display()));
            continue;
        }

        let import = match import_spec_root(&suite.spec_root, ctx, profile) {
            Ok(report) => report,
            Err(e) => {
                missing.push(format!("suite '{}' failed to import: {e}", suite.suite_id));
                continue;
            }
        };

        let commands_by_case: std::collections::HashMap<String, (PathBuf, Vec<ScenarioCommand>)> = import
            .imported
            .iter()
            .map(|i| (i.case_id.clone(), (i.source_path.clone(), i.scenario.commands().to_vec())))
            .collect();

        let config = CorpusConfig {
            seed: seed.to_string(),
            replay_limit: 0,
        };
        let result = run_corpus(
            harness,
            &suite.suite_id,
            import.imported,
            &config,
            replay_backend,
            generated_at,
        )
        .await;

        for diff in &result.report.results {
            if diff.status == DiffStatus::Match {
                continue;
            }
            let Some((source_path, commands)) = commands_by_case.get(&diff.scenario_id) else {
                continue;
            };
            let track = classify(&suite.spec_root, source_path, commands);
            let status = match diff.status {
                DiffStatus::Mismatch => "MISMATCH",
                DiffStatus::Error => "ERROR",
                DiffStatus::Match => unreachable!("filtered above"),
            };
            let note = diff
                .error_message
                .clone()
                .unwrap_or_else(|| format!("{} field-level divergence(s)", diff.entries.len()));
            entries.push(LedgerEntry {
                suite_id: suite.suite_id.clone(),
                scenario_id: diff.scenario_id.clone(),
                status: status.to_string(),
                track,
                note,
            });
        }
    }

    if !missing.is_empty() {
        return Err(missing);
    }
    Ok(entries)
}

/// Gate the ledger: fails if any entry exists.
pub fn gate_ledger(entries: &[LedgerEntry]) -> QualityGateReport {
    let gates = vec![Gate::le("ledger-entry-count", 0.0).evaluate(entries.len() as f64)];
    QualityGateReport::new("r3-failure-ledger", gates, "zero non-MATCH results across configured suites")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::OrderedMap2;

    #[test]
    fn transaction_command_wins_priority() {
        let commands = vec![ScenarioCommand::new("commitTransaction", OrderedMap2::new())];
        let track = classify(Path::new("suites/crud"), Path::new("case.json"), &commands);
        assert_eq!(track, Track::Txn);
    }

    #[test]
    fn path_substring_detects_distinct_before_aggregation() {
        let commands = vec![ScenarioCommand::new("ping", OrderedMap2::new())];
        let track = classify(Path::new("suites/distinct"), Path::new("case.json"), &commands);
        assert_eq!(track, Track::Distinct);
    }

    #[test]
    fn crud_command_falls_back_to_query_update() {
        let commands = vec![ScenarioCommand::new("find", OrderedMap2::new())];
        let track = classify(Path::new("suites/misc"), Path::new("case.json"), &commands);
        assert_eq!(track, Track::QueryUpdate);
    }

    #[test]
    fn no_signal_falls_back_to_protocol() {
        let commands = vec![ScenarioCommand::new("ping", OrderedMap2::new())];
        let track = classify(Path::new("suites/misc"), Path::new("case.json"), &commands);
        assert_eq!(track, Track::Protocol);
    }

    #[test]
    fn gate_fails_on_nonempty_ledger() {
        let entries = vec![LedgerEntry {
            suite_id: "unified-spec".to_string(),
            scenario_id: "case-1".to_string(),
            status: "MISMATCH".to_string(),
            track: Track::QueryUpdate,
            note: "1 field-level divergence(s)".to_string(),
        }];
        assert!(!gate_ledger(&entries).all_passed());
    }

    #[test]
    fn gate_passes_on_empty_ledger() {
        assert!(gate_ledger(&[]).all_passed());
    }
}
