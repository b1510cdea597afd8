//! Fixture refresh workflow: computes per-namespace diffs
//! against a baseline and writes the candidate's fixture set, gated on
//! approval when the change is breaking.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::canonical::canonicalize;
use crate::fixture::drift::{diff_namespace, document_key, NamespaceDrift};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    Full,
    Incremental,
}

/// A namespace requires approval when it has removed documents, or a
/// top-level field present in a baseline document is absent from the
/// corresponding candidate document.
fn dropped_top_level_field(baseline: &[Value], candidate: &[Value]) -> bool {
    let candidate_keys: std::collections::HashSet<String> = candidate
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|o| o.keys().cloned())
        .collect();
    baseline
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|o| o.keys().cloned())
        .any(|k| !candidate_keys.contains(&k))
}

#[derive(Debug, Clone)]
pub struct NamespaceRefreshPlan {
    pub namespace: String,
    pub drift: NamespaceDrift,
    pub requires_approval: bool,
    /// Documents this namespace will write: all of candidate in FULL
    /// mode, only added/changed documents in INCREMENTAL mode.
    pub documents_to_write: Vec<Value>,
}

fn added_or_changed(baseline: &[Value], candidate: &[Value]) -> Vec<Value> {
    let baseline_keyed: BTreeMap<String, &Value> =
        baseline.iter().map(|d| (document_key(d), d)).collect();
    candidate
        .iter()
        .filter(|c| match baseline_keyed.get(&document_key(c)) {
            None => true,
            Some(b) => canonicalize(b) != canonicalize(c),
        })
        .cloned()
        .collect()
}

/// Build a refresh plan for one namespace.
pub fn plan_namespace(
    namespace: &str,
    baseline: &[Value],
    candidate: &[Value],
    mode: RefreshMode,
) -> NamespaceRefreshPlan {
    let drift = diff_namespace(namespace, baseline, candidate);
    let requires_approval = drift.removed > 0 || dropped_top_level_field(baseline, candidate);

    let documents_to_write = match mode {
        RefreshMode::Full => {
            let mut sorted = candidate.to_vec();
            sorted.sort_by_key(|d| key_string(d));
            sorted
        }
        RefreshMode::Incremental => {
            let mut changed = added_or_changed(baseline, candidate);
            changed.sort_by_key(|d| key_string(d));
            changed
        }
    };

    NamespaceRefreshPlan {
        namespace: namespace.to_string(),
        drift,
        requires_approval,
        documents_to_write,
    }
}

fn key_string(doc: &Value) -> String {
    document_key(doc)
}

pub struct RefreshPlan {
    pub namespaces: Vec<NamespaceRefreshPlan>,
}

impl RefreshPlan {
    pub fn requires_approval(&self) -> bool {
        self.namespaces.iter().any(|n| n.requires_approval)
    }
}

/// Plan a refresh across every namespace in either set.
pub fn plan(
    baseline: &BTreeMap<String, Vec<Value>>,
    candidate: &BTreeMap<String, Vec<Value>>,
    mode: RefreshMode,
) -> RefreshPlan {
    let empty = Vec::new();
    let mut namespaces: Vec<&String> = baseline.keys().chain(candidate.keys()).collect();
    namespaces.sort();
    namespaces.dedup();

    let plans = namespaces
        .into_iter()
        .map(|ns| {
            plan_namespace(
                ns,
                baseline.get(ns).unwrap_or(&empty),
                candidate.get(ns).unwrap_or(&empty),
                mode,
            )
        })
        .collect();

    RefreshPlan { namespaces: plans }
}

/// Execute a refresh plan: write each namespace's `documents_to_write` to
/// `<namespace>.ndjson` under `output_dir`, one document per line,
/// delete-or-overwrite. Refuses to run if
/// the plan requires approval and `approved` is false.
pub fn execute(
    output_dir: &Path,
    refresh_plan: &RefreshPlan,
    approved: bool,
) -> Result<(), String> {
    if refresh_plan.requires_approval() && !approved {
        let offenders: Vec<&str> = refresh_plan
            .namespaces
            .iter()
            .filter(|n| n.requires_approval)
            .map(|n| n.namespace.as_str())
            .collect();
        return Err(format!(
            "refresh contains breaking changes in namespace(s) [{}] and --approved was not set",
            offenders.join(", ")
        ));
    }

    fs::create_dir_all(output_dir).map_err(|e| e.to_string())?;
    for ns_plan in &refresh_plan.namespaces {
        let path = output_dir.join(format!("{}.ndjson", ns_plan.namespace));
        let mut contents = String::new();
        for doc in &ns_plan.documents_to_write {
            contents.push_str(&serde_json::to_string(&canonicalize(doc).into_json()).map_err(|e| e.to_string())?);
            contents.push('\n');
        }
        fs::write(&path, contents).map_err(|e| e.to_string())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: i32, extra: Option<(&str, i32)>) -> Value {
        let mut pairs = vec![("_id".to_string(), Value::Int32(id))];
        if let Some((k, v)) = extra {
            pairs.push((k.to_string(), Value::Int32(v)));
        }
        Value::object(pairs)
    }

    #[test]
    fn removed_documents_require_approval() {
        let baseline = vec![doc(1, None), doc(2, None)];
        let candidate = vec![doc(1, None)];
        let p = plan_namespace("db.users", &baseline, &candidate, RefreshMode::Full);
        assert!(p.requires_approval);
        assert_eq!(p.drift.removed, 1);
    }

    #[test]
    fn dropped_field_requires_approval() {
        let baseline = vec![doc(1, Some(("extra", 1)))];
        let candidate = vec![doc(1, None)];
        let p = plan_namespace("db.users", &baseline, &candidate, RefreshMode::Full);
        assert!(p.requires_approval);
    }

    #[test]
    fn additive_change_does_not_require_approval() {
        let baseline = vec![doc(1, None)];
        let candidate = vec![doc(1, None), doc(2, None)];
        let p = plan_namespace("db.users", &baseline, &candidate, RefreshMode::Full);
        assert!(!p.requires_approval);
    }

    #[test]
    fn incremental_mode_only_writes_added_or_changed() {
        let baseline = vec![doc(1, None), doc(2, None)];
        let candidate = vec![doc(1, None), doc(2, Some(("extra", 9))), doc(3, None)];
        let p = plan_namespace("db.users", &baseline, &candidate, RefreshMode::Incremental);
        assert_eq!(p.documents_to_write.len(), 2);
    }

    #[test]
    fn execute_refuses_breaking_change_without_approval() {
        let tmp = tempfile::tempdir().unwrap();
        let mut baseline = BTreeMap::new();
        baseline.insert("db.users".to_string(), vec![doc(1, None), doc(2, None)]);
        let mut candidate = BTreeMap::new();
        candidate.insert("db.users".to_string(), vec![doc(1, None)]);

        let refresh_plan = plan(&baseline, &candidate, RefreshMode::Full);
        let err = execute(tmp.path(), &refresh_plan, false).unwrap_err();
        assert!(err.contains("approved"));

        execute(tmp.path(), &refresh_plan, true).unwrap();
        assert!(tmp.path().join("db.users.ndjson").exists());
    }
}
