//! Corpus runner: feeds imported scenarios through the
//! differential harness in seeded deterministic order, then materializes
//! replay bundles for every non-MATCH result and verifies up to
//! `replayLimit` of them.

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

use crate::backend::Backend;
use crate::diff::DiffStatus;
use crate::harness::{DifferentialHarness, DifferentialReport};
use crate::importer::ImportedScenario;
use crate::replay::probe::ReplayProbe;
use crate::replay::ReplayBundle;
use crate::scenario::ScenarioCommand;
use crate::value::Value;

/// A stable 64-bit hash of the seed string: SHA-256 truncated to its
/// first 8 bytes, read little-endian.
fn seed_to_u64(seed: &str) -> u64 {
    let digest = Sha256::digest(seed.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Sort by caseId, then Fisher–Yates shuffle with a PRNG seeded from
/// `seed`. Reproducible across machines for a fixed seed.
pub fn deterministic_order(imported: &mut [ImportedScenario], seed: &str) {
    imported.sort_by(|a, b| a.case_id.cmp(&b.case_id));
    let mut rng = ChaCha8Rng::seed_from_u64(seed_to_u64(seed));
    for i in (1..imported.len()).rev() {
        let j = rng.gen_range(0..=i);
        imported.swap(i, j);
    }
}

pub struct CorpusConfig {
    pub seed: String,
    pub replay_limit: usize,
}

pub struct ReplayVerification {
    pub failure_id: String,
    pub probe_matched: bool,
}

pub struct CorpusRunResult {
    pub report: DifferentialReport,
    /// One bundle per non-MATCH result.
    pub bundles: Vec<ReplayBundle>,
    /// Replay verifications, capped at `replayLimit`.
    pub replays: Vec<ReplayVerification>,
}

/// The default probe attached to a corpus-generated bundle when no more
/// specific assertion is available: the replay is expected to succeed
/// (`$.success == true`), i.e. the bundle exists to confirm a fix.
fn default_probe() -> ReplayProbe {
    ReplayProbe::new("$.success", Value::Bool(true)).expect("'$.success' is always a valid probe path")
}

fn bundle_message(status: &DiffStatus, error_message: &Option<String>, entries_len: usize) -> String {
    match status {
        DiffStatus::Error => error_message.clone().unwrap_or_else(|| "execution error".to_string()),
        DiffStatus::Mismatch => format!("{entries_len} field-level divergence(s)"),
        DiffStatus::Match => "match".to_string(),
    }
}

/// Run an imported corpus end to end: order, diff, bundle, and replay.
pub async fn run_corpus<L, R, RB>(
    harness: &DifferentialHarness<L, R>,
    suite_id: &str,
    mut imported: Vec<ImportedScenario>,
    config: &CorpusConfig,
    replay_backend: &RB,
    generated_at: &str,
) -> CorpusRunResult
where
    L: Backend,
    R: Backend,
    RB: Backend,
{
    deterministic_order(&mut imported, &config.seed);

    let commands_by_case: HashMap<String, Vec<ScenarioCommand>> = imported
        .iter()
        .map(|i| (i.case_id.clone(), i.scenario.commands().to_vec()))
        .collect();
    let scenarios: Vec<_> = imported.iter().map(|i| i.scenario.clone()).collect();

    let report = harness.run_all(&scenarios, generated_at).await;

    let mut bundles = Vec::new();
    for result in &report.results {
        if result.status == DiffStatus::Match {
            continue;
        }
        let Some(commands) = commands_by_case.get(&result.scenario_id) else {
            continue;
        };
        let message = bundle_message(&result.status, &result.error_message, result.entries.len());
        if let Ok(bundle) = ReplayBundle::build(
            suite_id,
            &result.scenario_id,
            result.status.clone(),
            message,
            commands.clone(),
            &default_probe(),
        ) {
            bundles.push(bundle);
        }
    }

    let mut replays = Vec::with_capacity(config.replay_limit.min(bundles.len()));
    for bundle in bundles.iter().take(config.replay_limit) {
        if let Ok(outcome) = crate::replay::replay_bundle(bundle, replay_backend).await {
            replays.push(ReplayVerification {
                failure_id: bundle.failure_id.clone(),
                probe_matched: outcome.probe_matched,
            });
        }
    }

    CorpusRunResult {
        report,
        bundles,
        replays,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_to_u64_is_deterministic() {
        assert_eq!(seed_to_u64("abc"), seed_to_u64("abc"));
        assert_ne!(seed_to_u64("abc"), seed_to_u64("xyz"));
    }

    #[test]
    fn deterministic_order_is_stable_for_same_seed() {
        use crate::scenario::{Scenario, ScenarioCommand};
        use crate::value::OrderedMap2;
        use std::path::PathBuf;

        let make = |id: &str| ImportedScenario {
            case_id: id.to_string(),
            source_path: PathBuf::from("spec.json"),
            scenario: Scenario::build(
                id,
                "desc",
                vec![ScenarioCommand::new("ping", OrderedMap2::new())],
            )
            .unwrap(),
        };

        let mut a = vec![make("c"), make("a"), make("b")];
        let mut b = vec![make("b"), make("c"), make("a")];
        deterministic_order(&mut a, "seed-1");
        deterministic_order(&mut b, "seed-1");
        let ids_a: Vec<&str> = a.iter().map(|i| i.case_id.as_str()).collect();
        let ids_b: Vec<&str> = b.iter().map(|i| i.case_id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
    }
}
