//! Fixture artifact pipeline: canonical ordering, dual
//! portable/fast encodings with integrity metadata, sanitization,
//! drift analysis, and the refresh workflow.

pub mod drift;
pub mod fast;
pub mod manifest;
pub mod portable;
pub mod refresh;
pub mod sanitize;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{ArtifactError, HarnessError};
use crate::fixture::manifest::{
    build_manifest, FileDigest, FixtureManifest, CURRENT_ARTIFACT_FORMAT_VERSION,
    CURRENT_SCHEMA_VERSION,
};
use crate::value::Value;

/// A fully materialized fixture artifact: the manifest plus the two
/// encoded files it describes.
pub struct FixtureBundle {
    pub manifest: FixtureManifest,
    pub portable_path: PathBuf,
    pub fast_path: PathBuf,
}

fn manifest_path(dir: &Path) -> PathBuf {
    dir.join("manifest.json")
}

/// Read every `<db>.<coll>.ndjson` file in `dir` into `namespace ->
/// documents`, blank lines ignored. This is the
/// fallback source of truth when no manifest/artifact pair is usable.
pub fn read_ndjson_dir(dir: &Path) -> Result<BTreeMap<String, Vec<Value>>, HarnessError> {
    let mut collections = BTreeMap::new();
    if !dir.exists() {
        return Ok(collections);
    }
    let mut entries: Vec<_> = fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.path());
    for entry in entries {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(namespace) = name.strip_suffix(".ndjson") else {
            continue;
        };
        let contents = fs::read_to_string(&path)?;
        let mut docs = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let json: serde_json::Value = serde_json::from_str(line)?;
            docs.push(Value::from_json(&json));
        }
        collections.insert(namespace.to_string(), docs);
    }
    Ok(collections)
}

/// Publish a fresh fixture bundle: write the portable and fast files,
/// build the manifest (diffing against `previous` for the changelog), and
/// persist the manifest as canonical JSON.
pub fn publish(
    dir: &Path,
    collections: &BTreeMap<String, Vec<Value>>,
    engine_version: &str,
    fixture_version: &str,
    previous: Option<&FixtureManifest>,
    updated_at: &str,
) -> Result<FixtureBundle, HarnessError> {
    fs::create_dir_all(dir)?;
    let portable_path = dir.join("fixture.portable.json.gz");
    let fast_path = dir.join("fixture.fast.bin");

    let portable_digest = portable::write_portable(&portable_path, collections)?;
    let fast_digest = fast::write_fast(&fast_path, collections)?;

    let manifest = build_manifest(
        collections,
        engine_version,
        fixture_version,
        Some(portable_digest),
        Some(fast_digest),
        previous,
        updated_at,
    );

    write_manifest(dir, &manifest)?;

    Ok(FixtureBundle {
        manifest,
        portable_path,
        fast_path,
    })
}

pub fn write_manifest(dir: &Path, manifest: &FixtureManifest) -> Result<(), HarnessError> {
    fs::create_dir_all(dir)?;
    let canonical = crate::canonical::canonicalize(&Value::from_json(&serde_json::to_value(
        manifest,
    )?));
    let bytes = serde_json::to_vec_pretty(&canonical.into_json())?;
    fs::write(manifest_path(dir), bytes)?;
    Ok(())
}

pub fn read_manifest(dir: &Path) -> Result<Option<FixtureManifest>, HarnessError> {
    let path = manifest_path(dir);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(&path)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Runtime facts the loader checks a manifest's fast snapshot against for
/// warm-load compatibility.
pub struct RuntimeInfo {
    pub engine_version: String,
}

/// Load a fixture bundle per the following precedence:
/// 1. No manifest, or an unsupported `schemaVersion` → fall back to NDJSON.
/// 2. An `artifactFormatVersion` present but unsupported → hard error.
/// 3. Fast file present and its `fastFormatVersion`/`engineVersion` both
///    match the runtime → verify sha256, load fast.
/// 4. Otherwise, if portable is present → verify sha256, load portable,
///    optionally regenerate the fast snapshot and rewrite only the
///    `engineVersion`/`fastFormatVersion`/`updatedAt`/`fast` manifest
///    fields.
///
/// If `required_fixture_version` is set and doesn't match the manifest's
/// `fixtureVersion`, this aborts with an explicit error before touching
/// any file.
pub fn load(
    dir: &Path,
    ndjson_fallback_dir: &Path,
    runtime: &RuntimeInfo,
    required_fixture_version: Option<&str>,
    regenerate_fast_on_portable_load: bool,
    updated_at: &str,
) -> Result<BTreeMap<String, Value>, HarnessError> {
    let manifest = read_manifest(dir)?;

    let Some(manifest) = manifest else {
        let docs = read_ndjson_dir(ndjson_fallback_dir)?;
        return Ok(flatten(docs));
    };

    if manifest.schema_version != CURRENT_SCHEMA_VERSION {
        let docs = read_ndjson_dir(ndjson_fallback_dir)?;
        return Ok(flatten(docs));
    }

    if manifest.artifact_format_version != CURRENT_ARTIFACT_FORMAT_VERSION {
        return Err(ArtifactError::UnsupportedVersion {
            kind: "artifact",
            found: manifest.artifact_format_version,
            supported: CURRENT_ARTIFACT_FORMAT_VERSION,
        }
        .into());
    }

    if let Some(required) = required_fixture_version {
        if required != manifest.fixture_version {
            return Err(ArtifactError::FixtureVersionMismatch {
                required: required.to_string(),
                found: manifest.fixture_version.clone(),
            }
            .into());
        }
    }

    let fast_compatible = manifest
        .fast
        .as_ref()
        .map(|_| {
            manifest.fast_format_version == crate::fixture::manifest::CURRENT_FAST_FORMAT_VERSION
                && manifest.engine_version == runtime.engine_version
        })
        .unwrap_or(false);

    if fast_compatible {
        let fast_digest = manifest.fast.as_ref().expect("checked above");
        let fast_path = dir.join(&fast_digest.file);
        if !portable::verify_sha256(&fast_path, &fast_digest.sha256)? {
            return Err(ArtifactError::ChecksumMismatch {
                file: fast_digest.file.clone(),
                expected: fast_digest.sha256.clone(),
                actual: "mismatch".to_string(),
            }
            .into());
        }
        let collections = fast::read_fast(&fast_path)?;
        return Ok(flatten(collections));
    }

    if let Some(portable_digest) = &manifest.portable {
        let portable_path = dir.join(&portable_digest.file);
        if !portable::verify_sha256(&portable_path, &portable_digest.sha256)? {
            return Err(ArtifactError::ChecksumMismatch {
                file: portable_digest.file.clone(),
                expected: portable_digest.sha256.clone(),
                actual: "mismatch".to_string(),
            }
            .into());
        }
        let collections = portable::read_portable(&portable_path)?;

        if regenerate_fast_on_portable_load {
            let fast_path = dir.join("fixture.fast.bin");
            let fast_digest = fast::write_fast(&fast_path, &collections)?;
            let mut updated = manifest;
            updated.engine_version = runtime.engine_version.clone();
            updated.fast_format_version = crate::fixture::manifest::CURRENT_FAST_FORMAT_VERSION;
            updated.updated_at = updated_at.to_string();
            updated.fast = Some(FileDigest {
                file: fast_digest.file,
                sha256: fast_digest.sha256,
                document_count: fast_digest.document_count,
            });
            write_manifest(dir, &updated)?;
        }

        return Ok(flatten(collections));
    }

    let docs = read_ndjson_dir(ndjson_fallback_dir)?;
    Ok(flatten(docs))
}

fn flatten(collections: BTreeMap<String, Vec<Value>>) -> BTreeMap<String, Value> {
    collections
        .into_iter()
        .map(|(ns, docs)| (ns, Value::Array(docs)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs() -> BTreeMap<String, Vec<Value>> {
        let mut m = BTreeMap::new();
        m.insert(
            "db.users".to_string(),
            vec![Value::object([("_id".to_string(), Value::Int32(1))])],
        );
        m
    }

    #[test]
    fn publish_then_load_uses_fast_path_when_engine_version_matches() {
        let tmp = tempfile::tempdir().unwrap();
        let bundle = publish(
            tmp.path(),
            &docs(),
            "1.0.0",
            "v1",
            None,
            "2026-01-01T00:00:00Z",
        )
        .unwrap();
        assert_eq!(bundle.manifest.engine_version, "1.0.0");

        let runtime = RuntimeInfo {
            engine_version: "1.0.0".to_string(),
        };
        let loaded = load(
            tmp.path(),
            tmp.path(),
            &runtime,
            None,
            false,
            "2026-01-02T00:00:00Z",
        )
        .unwrap();
        assert!(loaded.contains_key("db.users"));
    }

    #[test]
    fn engine_version_mismatch_falls_back_to_portable_and_regenerates_fast() {
        let tmp = tempfile::tempdir().unwrap();
        publish(tmp.path(), &docs(), "1.0.0", "v1", None, "2026-01-01T00:00:00Z").unwrap();

        let runtime = RuntimeInfo {
            engine_version: "2.0.0".to_string(),
        };
        let loaded = load(
            tmp.path(),
            tmp.path(),
            &runtime,
            None,
            true,
            "2026-01-02T00:00:00Z",
        )
        .unwrap();
        assert!(loaded.contains_key("db.users"));

        let manifest = read_manifest(tmp.path()).unwrap().unwrap();
        assert_eq!(manifest.engine_version, "2.0.0");
        assert_eq!(manifest.updated_at, "2026-01-02T00:00:00Z");
    }

    #[test]
    fn required_fixture_version_mismatch_aborts() {
        let tmp = tempfile::tempdir().unwrap();
        publish(tmp.path(), &docs(), "1.0.0", "v1", None, "2026-01-01T00:00:00Z").unwrap();

        let runtime = RuntimeInfo {
            engine_version: "1.0.0".to_string(),
        };
        let err = load(
            tmp.path(),
            tmp.path(),
            &runtime,
            Some("v2"),
            false,
            "2026-01-02T00:00:00Z",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Artifact(ArtifactError::FixtureVersionMismatch { .. })
        ));
    }

    #[test]
    fn absent_manifest_falls_back_to_ndjson() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("db.users.ndjson"), "{\"_id\":1}\n\n").unwrap();
        let runtime = RuntimeInfo {
            engine_version: "1.0.0".to_string(),
        };
        let loaded = load(
            tmp.path(),
            tmp.path(),
            &runtime,
            None,
            false,
            "2026-01-01T00:00:00Z",
        )
        .unwrap();
        assert!(loaded.contains_key("db.users"));
    }
}
