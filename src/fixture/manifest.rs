//! Fixture manifest: records both files' checksums, document
//! counts, per-namespace summaries, totals, a changelog vs. any previous
//! manifest, and the `dataSchemaHash`.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::value::Value;

pub const CURRENT_SCHEMA_VERSION: u32 = 1;
pub const CURRENT_ARTIFACT_FORMAT_VERSION: u32 = 1;
pub const CURRENT_PORTABLE_FORMAT_VERSION: u32 = 1;
pub const CURRENT_FAST_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDigest {
    pub file: String,
    pub sha256: String,
    pub document_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceSummary {
    pub namespace: String,
    pub document_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Totals {
    pub namespace_count: u64,
    pub document_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureManifest {
    pub schema_version: u32,
    pub artifact_format_version: u32,
    pub portable_format_version: u32,
    pub fast_format_version: u32,
    pub engine_version: String,
    pub fixture_version: String,
    pub data_schema_hash: String,
    pub portable: Option<FileDigest>,
    pub fast: Option<FileDigest>,
    pub namespaces: Vec<NamespaceSummary>,
    pub totals: Totals,
    pub changelog: Vec<String>,
    pub updated_at: String,
}

/// Derived from the sorted namespace list, each namespace's sorted
/// distinct field names, and doc counts — stable under key reordering,
/// sensitive to schema or cardinality changes.
pub fn compute_data_schema_hash(collections: &BTreeMap<String, Vec<Value>>) -> String {
    let mut hasher = Sha256::new();
    for (namespace, docs) in collections {
        hasher.update(namespace.as_bytes());
        hasher.update([0u8]);
        let mut fields = BTreeSet::new();
        for doc in docs {
            if let Some(obj) = doc.as_object() {
                for key in obj.keys() {
                    fields.insert(key.clone());
                }
            }
        }
        for field in &fields {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update((docs.len() as u64).to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

fn namespace_summaries(collections: &BTreeMap<String, Vec<Value>>) -> Vec<NamespaceSummary> {
    collections
        .iter()
        .map(|(ns, docs)| NamespaceSummary {
            namespace: ns.clone(),
            document_count: docs.len() as u64,
        })
        .collect()
}

fn build_changelog(namespaces: &[NamespaceSummary], totals: &Totals, previous: Option<&FixtureManifest>) -> Vec<String> {
    let Some(previous) = previous else {
        return vec!["initial artifact publication".to_string()];
    };

    let mut lines = Vec::new();
    let ns_delta = namespaces.len() as i64 - previous.namespaces.len() as i64;
    if ns_delta != 0 {
        lines.push(format!("collection count changed by {ns_delta:+}"));
    }
    let doc_delta = totals.document_count as i64 - previous.totals.document_count as i64;
    if doc_delta != 0 {
        lines.push(format!("total document count changed by {doc_delta:+}"));
    }

    let previous_by_ns: HashMap<&str, u64> = previous
        .namespaces
        .iter()
        .map(|n| (n.namespace.as_str(), n.document_count))
        .collect();
    let current_by_ns: HashMap<&str, u64> = namespaces
        .iter()
        .map(|n| (n.namespace.as_str(), n.document_count))
        .collect();

    let mut all_namespaces: BTreeSet<&str> = previous_by_ns.keys().copied().collect();
    all_namespaces.extend(current_by_ns.keys().copied());

    for ns in all_namespaces {
        let prev_count = previous_by_ns.get(ns).copied().unwrap_or(0) as i64;
        let cur_count = current_by_ns.get(ns).copied().unwrap_or(0) as i64;
        let delta = cur_count - prev_count;
        if delta != 0 {
            lines.push(format!("{ns}: document count changed by {delta:+}"));
        }
    }

    if lines.is_empty() {
        vec!["no collection-level delta".to_string()]
    } else {
        lines
    }
}

/// Build a manifest for a freshly written fixture bundle.
#[allow(clippy::too_many_arguments)]
pub fn build_manifest(
    collections: &BTreeMap<String, Vec<Value>>,
    engine_version: impl Into<String>,
    fixture_version: impl Into<String>,
    portable: Option<FileDigest>,
    fast: Option<FileDigest>,
    previous: Option<&FixtureManifest>,
    updated_at: impl Into<String>,
) -> FixtureManifest {
    let namespaces = namespace_summaries(collections);
    let totals = Totals {
        namespace_count: namespaces.len() as u64,
        document_count: namespaces.iter().map(|n| n.document_count).sum(),
    };
    let changelog = build_changelog(&namespaces, &totals, previous);
    FixtureManifest {
        schema_version: CURRENT_SCHEMA_VERSION,
        artifact_format_version: CURRENT_ARTIFACT_FORMAT_VERSION,
        portable_format_version: CURRENT_PORTABLE_FORMAT_VERSION,
        fast_format_version: CURRENT_FAST_FORMAT_VERSION,
        engine_version: engine_version.into(),
        fixture_version: fixture_version.into(),
        data_schema_hash: compute_data_schema_hash(collections),
        portable,
        fast,
        namespaces,
        totals,
        changelog,
        updated_at: updated_at.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn collections_with(ns: &str, docs: Vec<Value>) -> BTreeMap<String, Vec<Value>> {
        let mut map = BTreeMap::new();
        map.insert(ns.to_string(), docs);
        map
    }

    #[test]
    fn data_schema_hash_is_stable_under_key_reordering() {
        let a = Value::object([
            ("a".to_string(), Value::Int32(1)),
            ("b".to_string(), Value::Int32(2)),
        ]);
        let b = Value::object([
            ("b".to_string(), Value::Int32(2)),
            ("a".to_string(), Value::Int32(1)),
        ]);
        let h1 = compute_data_schema_hash(&collections_with("db.users", vec![a]));
        let h2 = compute_data_schema_hash(&collections_with("db.users", vec![b]));
        assert_eq!(h1, h2);
    }

    #[test]
    fn data_schema_hash_changes_with_cardinality() {
        let doc = Value::object([("a".to_string(), Value::Int32(1))]);
        let h1 = compute_data_schema_hash(&collections_with("db.users", vec![doc.clone()]));
        let h2 = compute_data_schema_hash(&collections_with("db.users", vec![doc.clone(), doc]));
        assert_ne!(h1, h2);
    }

    #[test]
    fn changelog_absent_previous_is_initial_publication() {
        let namespaces = vec![NamespaceSummary {
            namespace: "db.users".to_string(),
            document_count: 3,
        }];
        let totals = Totals {
            namespace_count: 1,
            document_count: 3,
        };
        let changelog = build_changelog(&namespaces, &totals, None);
        assert_eq!(changelog, vec!["initial artifact publication".to_string()]);
    }

    #[test]
    fn changelog_no_delta_reports_no_collection_level_delta() {
        let namespaces = vec![NamespaceSummary {
            namespace: "db.users".to_string(),
            document_count: 3,
        }];
        let totals = Totals {
            namespace_count: 1,
            document_count: 3,
        };
        let previous = FixtureManifest {
            schema_version: CURRENT_SCHEMA_VERSION,
            artifact_format_version: CURRENT_ARTIFACT_FORMAT_VERSION,
            portable_format_version: CURRENT_PORTABLE_FORMAT_VERSION,
            fast_format_version: CURRENT_FAST_FORMAT_VERSION,
            engine_version: "1.0.0".to_string(),
            fixture_version: "v1".to_string(),
            data_schema_hash: "deadbeef".to_string(),
            portable: None,
            fast: None,
            namespaces: namespaces.clone(),
            totals: Totals {
                namespace_count: 1,
                document_count: 3,
            },
            changelog: vec!["initial artifact publication".to_string()],
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        };
        let changelog = build_changelog(&namespaces, &totals, Some(&previous));
        assert_eq!(changelog, vec!["no collection-level delta".to_string()]);
    }
}
