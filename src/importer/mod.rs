//! Unified spec importer: walks a spec root, derives
//! scenarios, and filters them against a `RunOnContext` gathered once
//! from the reference server.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{HarnessError, ValidationError};
use crate::scenario::{Scenario, ScenarioCommand};

/// A comparable `(major, minor, patch)` server version, used instead of
/// string comparison for `runOn.minServerVersion`/`maxServerVersion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerVersion(pub u32, pub u32, pub u32);

impl ServerVersion {
    pub fn parse(s: &str) -> Result<ServerVersion, ValidationError> {
        let mut parts = s.trim().split('.');
        let major = parts
            .next()
            .ok_or_else(|| ValidationError("empty server version string".to_string()))?
            .parse()
            .map_err(|_| ValidationError(format!("invalid server version '{s}'")))?;
        let minor = parts
            .next()
            .map(|p| p.parse())
            .transpose()
            .map_err(|_| ValidationError(format!("invalid server version '{s}'")))?
            .unwrap_or(0);
        let patch = parts
            .next()
            .map(|p| p.parse())
            .transpose()
            .map_err(|_| ValidationError(format!("invalid server version '{s}'")))?
            .unwrap_or(0);
        Ok(ServerVersion(major, minor, patch))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    Single,
    #[serde(rename = "replicaset")]
    ReplicaSet,
    Sharded,
    #[serde(rename = "load-balanced")]
    LoadBalanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerlessRequirement {
    Require,
    Forbid,
    Allow,
}

/// The `{serverVersion, topology, isServerless}` triple gathered once
/// from the reference server's `buildInfo` + `hello` before import.
#[derive(Debug, Clone)]
pub struct RunOnContext {
    pub server_version: ServerVersion,
    pub topology: Topology,
    pub is_serverless: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct RunOnRequirementRaw {
    #[serde(rename = "minServerVersion")]
    min_server_version: Option<String>,
    #[serde(rename = "maxServerVersion")]
    max_server_version: Option<String>,
    topologies: Option<Vec<Topology>>,
    serverless: Option<ServerlessRequirement>,
}

impl RunOnRequirementRaw {
    fn matches(&self, ctx: &RunOnContext) -> Result<bool, ValidationError> {
        if let Some(min) = &self.min_server_version {
            if ctx.server_version < ServerVersion::parse(min)? {
                return Ok(false);
            }
        }
        if let Some(max) = &self.max_server_version {
            if ctx.server_version > ServerVersion::parse(max)? {
                return Ok(false);
            }
        }
        if let Some(topologies) = &self.topologies {
            if !topologies.contains(&ctx.topology) {
                return Ok(false);
            }
        }
        match self.serverless {
            Some(ServerlessRequirement::Require) if !ctx.is_serverless => return Ok(false),
            Some(ServerlessRequirement::Forbid) if ctx.is_serverless => return Ok(false),
            _ => {}
        }
        Ok(true)
    }
}

/// A spec file's `runOn` array is an OR of alternative requirement
/// sets; an absent array is "always eligible".
fn runon_satisfied(
    run_on: &Option<Vec<RunOnRequirementRaw>>,
    ctx: &RunOnContext,
) -> Result<bool, ValidationError> {
    match run_on {
        None => Ok(true),
        Some(reqs) if reqs.is_empty() => Ok(true),
        Some(reqs) => {
            for req in reqs {
                if req.matches(ctx)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportProfile {
    /// Cases whose `runOn` is not satisfied are a hard error.
    Strict,
    /// Cases whose `runOn` is not satisfied are retained as skipped,
    /// with a reason.
    Compat,
}

#[derive(Debug, Clone, Deserialize)]
struct TestCaseRaw {
    description: String,
    commands: Vec<ScenarioCommandRaw>,
}

#[derive(Debug, Clone, Deserialize)]
struct ScenarioCommandRaw {
    #[serde(rename = "commandName")]
    command_name: String,
    #[serde(default)]
    payload: crate::value::OrderedMap2,
}

#[derive(Debug, Clone, Deserialize)]
struct SpecFileRaw {
    #[serde(rename = "runOn")]
    run_on: Option<Vec<RunOnRequirementRaw>>,
    tests: Vec<TestCaseRaw>,
}

#[derive(Debug, Clone)]
pub struct ImportedScenario {
    pub case_id: String,
    pub source_path: PathBuf,
    pub scenario: Scenario,
}

#[derive(Debug, Clone)]
pub struct SkippedCase {
    pub case_id: String,
    pub source_path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: Vec<ImportedScenario>,
    pub skipped: Vec<SkippedCase>,
}

fn walk_spec_files(root: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if root.is_file() {
        if root.extension().and_then(|e| e.to_str()) == Some("json") {
            out.push(root.to_path_buf());
        }
        return Ok(());
    }
    let mut entries: Vec<_> = fs::read_dir(root)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.path());
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            walk_spec_files(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            out.push(path);
        }
    }
    Ok(())
}

/// Import every spec file under `root`, deriving one `ImportedScenario`
/// per test case whose `runOn` is satisfied by `ctx`.
pub fn import_spec_root(
    root: &Path,
    ctx: &RunOnContext,
    profile: ImportProfile,
) -> Result<ImportReport, HarnessError> {
    let mut files = Vec::new();
    walk_spec_files(root, &mut files)?;

    let mut report = ImportReport::default();
    let mut validation_errors = Vec::new();

    for path in files {
        let bytes = fs::read(&path)?;
        let raw: SpecFileRaw = match serde_json::from_slice(&bytes) {
            Ok(r) => r,
            Err(e) => {
                validation_errors.push(format!("{}: malformed spec file: {e}", path.display()));
                continue;
            }
        };

        let satisfied = match runon_satisfied(&raw.run_on, ctx) {
            Ok(s) => s,
            Err(e) => {
                validation_errors.push(format!("{}: {}", path.display(), e.0));
                continue;
            }
        };

        for (index, test) in raw.tests.into_iter().enumerate() {
            let case_id = format!("{}#{index}:{}", path.display(), test.description);

            if !satisfied {
                match profile {
                    ImportProfile::Strict => {
                        validation_errors.push(format!(
                            "{case_id}: runOn requirements not satisfied by {ctx:?} (strict profile)"
                        ));
                    }
                    ImportProfile::Compat => {
                        report.skipped.push(SkippedCase {
                            case_id,
                            source_path: path.clone(),
                            reason: "runOn requirements not satisfied".to_string(),
                        });
                    }
                }
                continue;
            }

            let commands: Vec<ScenarioCommand> = test
                .commands
                .into_iter()
                .map(|c| ScenarioCommand::new(c.command_name, c.payload))
                .collect();

            match Scenario::build(case_id.clone(), test.description, commands) {
                Ok(scenario) => report.imported.push(ImportedScenario {
                    case_id,
                    source_path: path.clone(),
                    scenario,
                }),
                Err(e) => validation_errors.push(format!("{case_id}: {}", e.0)),
            }
        }
    }

    if !validation_errors.is_empty() {
        return Err(HarnessError::Validation(validation_errors));
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_spec_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn ctx() -> RunOnContext {
        RunOnContext {
            server_version: ServerVersion(6, 0, 0),
            topology: Topology::Single,
            is_serverless: false,
        }
    }

    #[test]
    fn server_version_parses_partial_dotted_strings() {
        assert_eq!(ServerVersion::parse("4.0").unwrap(), ServerVersion(4, 0, 0));
        assert_eq!(ServerVersion::parse("4").unwrap(), ServerVersion(4, 0, 0));
        assert_eq!(ServerVersion::parse("4.2.1").unwrap(), ServerVersion(4, 2, 1));
    }

    #[test]
    fn absent_run_on_is_always_eligible() {
        let tmp = tempfile::tempdir().unwrap();
        write_spec_file(
            tmp.path(),
            "basic.json",
            r#"{"tests":[{"description":"ping","commands":[{"commandName":"ping","payload":{}}]}]}"#,
        );
        let report = import_spec_root(tmp.path(), &ctx(), ImportProfile::Strict).unwrap();
        assert_eq!(report.imported.len(), 1);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn compat_profile_skips_unmatched_run_on_with_reason() {
        let tmp = tempfile::tempdir().unwrap();
        write_spec_file(
            tmp.path(),
            "versioned.json",
            r#"{
                "runOn": [{"minServerVersion": "7.0"}],
                "tests": [{"description": "needs v7", "commands": [{"commandName":"ping","payload":{}}]}]
            }"#,
        );
        let report = import_spec_root(tmp.path(), &ctx(), ImportProfile::Compat).unwrap();
        assert!(report.imported.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].reason.contains("runOn"));
    }

    #[test]
    fn strict_profile_rejects_unmatched_run_on() {
        let tmp = tempfile::tempdir().unwrap();
        write_spec_file(
            tmp.path(),
            "versioned.json",
            r#"{
                "runOn": [{"minServerVersion": "7.0"}],
                "tests": [{"description": "needs v7", "commands": [{"commandName":"ping","payload":{}}]}]
            }"#,
        );
        let err = import_spec_root(tmp.path(), &ctx(), ImportProfile::Strict).unwrap_err();
        assert!(matches!(err, HarnessError::Validation(_)));
    }
}
