//! Deterministic replay & failure-bundle subsystem.
//!
//! A bundle captures the exact command sequence behind a non-MATCH
//! `DiffResult`, keyed by a stable `failureId`, plus a probe assertion
//! that a replay through a chosen backend is expected to satisfy.

pub mod probe;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::diff::DiffStatus;
use crate::errors::{HarnessError, ValidationError};
use crate::replay::probe::ReplayProbe;
use crate::scenario::{Scenario, ScenarioCommand};

fn lower_status(status: &DiffStatus) -> &'static str {
    match status {
        DiffStatus::Match => "match",
        DiffStatus::Mismatch => "mismatch",
        DiffStatus::Error => "error",
    }
}

/// `suiteId::lower(status)::scenarioId`.
pub fn failure_id(suite_id: &str, status: &DiffStatus, scenario_id: &str) -> String {
    format!("{suite_id}::{}::{scenario_id}", lower_status(status))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayBundle {
    pub failure_id: String,
    pub status: DiffStatus,
    pub message: String,
    pub commands: Vec<ScenarioCommand>,
    pub replay_probe_path: String,
    pub replay_probe_expected: crate::value::Value,
}

impl ReplayBundle {
    pub fn build(
        suite_id: &str,
        scenario_id: &str,
        status: DiffStatus,
        message: impl Into<String>,
        commands: Vec<ScenarioCommand>,
        probe: &ReplayProbe,
    ) -> Result<ReplayBundle, ValidationError> {
        if commands.is_empty() {
            return Err(ValidationError(
                "a replay bundle must carry at least one command".to_string(),
            ));
        }
        Ok(ReplayBundle {
            failure_id: failure_id(suite_id, &status, scenario_id),
            status,
            message: message.into(),
            commands,
            replay_probe_path: probe.path.as_str().to_string(),
            replay_probe_expected: probe.expected_value.clone(),
        })
    }

    pub fn probe(&self) -> Result<ReplayProbe, ValidationError> {
        ReplayProbe::new(&self.replay_probe_path, self.replay_probe_expected.clone())
    }

    /// Rebuild the `Scenario` this bundle replays, using the failure id
    /// as the scenario id (replay bundles have no separate scenario model
    /// of their own once persisted).
    pub fn to_scenario(&self) -> Result<Scenario, ValidationError> {
        Scenario::build(self.failure_id.clone(), "replayed failure bundle", self.commands.clone())
    }
}

fn sanitize_filename(failure_id: &str) -> String {
    failure_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestEntry {
    failure_id: String,
    file: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Manifest {
    entries: Vec<ManifestEntry>,
}

/// A directory of persisted bundles plus a manifest indexed by failureId.
pub struct BundleStore {
    dir: PathBuf,
}

impl BundleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join("manifest.json")
    }

    fn read_manifest(&self) -> Result<Manifest, HarnessError> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(Manifest::default());
        }
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_manifest(&self, mut manifest: Manifest) -> Result<(), HarnessError> {
        manifest.entries.sort_by(|a, b| a.failure_id.cmp(&b.failure_id));
        let bytes = serde_json::to_vec_pretty(&manifest)?;
        fs::write(self.manifest_path(), bytes)?;
        Ok(())
    }

    /// Persist a bundle, creating the store directory if needed and
    /// updating the manifest's entry for this `failureId` (overwriting
    /// any prior bundle under the same id).
    pub fn save(&self, bundle: &ReplayBundle) -> Result<(), HarnessError> {
        fs::create_dir_all(&self.dir)?;
        let filename = format!("{}.json", sanitize_filename(&bundle.failure_id));
        let bytes = serde_json::to_vec_pretty(bundle)?;
        fs::write(self.dir.join(&filename), bytes)?;

        let mut manifest = self.read_manifest()?;
        manifest.entries.retain(|e| e.failure_id != bundle.failure_id);
        manifest.entries.push(ManifestEntry {
            failure_id: bundle.failure_id.clone(),
            file: filename,
        });
        self.write_manifest(manifest)
    }

    pub fn load(&self, failure_id: &str) -> Result<ReplayBundle, HarnessError> {
        let manifest = self.read_manifest()?;
        let entry = manifest
            .entries
            .iter()
            .find(|e| e.failure_id == failure_id)
            .ok_or_else(|| {
                HarnessError::Validation(vec![format!("no bundle found for failure id '{failure_id}'")])
            })?;
        let bytes = fs::read(self.dir.join(&entry.file))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn list_failure_ids(&self) -> Result<Vec<String>, HarnessError> {
        let manifest = self.read_manifest()?;
        Ok(manifest.entries.into_iter().map(|e| e.failure_id).collect())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Result of replaying one bundle through a chosen backend.
pub struct ReplayOutcome {
    pub probe_matched: bool,
    pub replay_state: crate::value::Value,
}

/// Re-execute a bundle's recorded command sequence via `backend` and
/// evaluate its replay probe.
pub async fn replay_bundle<B: Backend>(
    bundle: &ReplayBundle,
    backend: &B,
) -> Result<ReplayOutcome, HarnessError> {
    let scenario = bundle
        .to_scenario()
        .map_err(|e| HarnessError::Validation(vec![e.0]))?;
    let outcome = backend.execute(&scenario).await;
    let replay_state = outcome.as_replay_state();
    let probe = bundle
        .probe()
        .map_err(|e| HarnessError::Validation(vec![e.0]))?;
    let probe_matched = probe.matches(&replay_state);
    Ok(ReplayOutcome {
        probe_matched,
        replay_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::in_process::InProcessBackend;
    use crate::value::{OrderedMap2, Value};

    #[test]
    fn failure_id_is_stable() {
        let id = failure_id("unified-spec", &DiffStatus::Mismatch, "insert-basic");
        assert_eq!(id, "unified-spec::mismatch::insert-basic");
    }

    #[test]
    fn bundle_requires_at_least_one_command() {
        let probe = ReplayProbe::new("$.success", Value::Bool(true)).unwrap();
        let err = ReplayBundle::build("suite", "s1", DiffStatus::Error, "boom", vec![], &probe)
            .unwrap_err();
        assert!(err.0.contains("at least one command"));
    }

    #[test]
    fn save_and_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BundleStore::new(tmp.path());
        let probe = ReplayProbe::new("$.success", Value::Bool(true)).unwrap();
        let bundle = ReplayBundle::build(
            "suite",
            "s1",
            DiffStatus::Mismatch,
            "field drift",
            vec![ScenarioCommand::new("ping", OrderedMap2::new())],
            &probe,
        )
        .unwrap();
        store.save(&bundle).unwrap();

        let loaded = store.load(&bundle.failure_id).unwrap();
        assert_eq!(loaded.failure_id, bundle.failure_id);
        assert_eq!(loaded.commands.len(), 1);
        assert_eq!(store.list_failure_ids().unwrap(), vec![bundle.failure_id.clone()]);
    }

    #[tokio::test]
    async fn replay_through_in_process_backend_matches_probe() {
        let probe = ReplayProbe::new("$.success", Value::Bool(true)).unwrap();
        let bundle = ReplayBundle::build(
            "suite",
            "ping",
            DiffStatus::Error,
            "transient error",
            vec![ScenarioCommand::new("ping", OrderedMap2::new())],
            &probe,
        )
        .unwrap();
        let backend = InProcessBackend::new();
        let outcome = replay_bundle(&bundle, &backend).await.unwrap();
        assert!(outcome.probe_matched);
    }
}
