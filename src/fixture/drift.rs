//! Drift analyzer: per-namespace change magnitude between a
//! baseline and a candidate fixture generation.

use std::collections::{BTreeMap, HashMap, HashSet};

use sha2::{Digest, Sha256};

use crate::canonical::canonicalize;
use crate::value::Value;

/// A document's drift key: its `_id` when present, else the sha256 of its
/// canonical JSON representation.
pub fn document_key(doc: &Value) -> String {
    if let Some(obj) = doc.as_object() {
        if let Some(id) = obj.get("_id") {
            return format!("id:{}", serde_json::to_string(&id.into_json()).unwrap_or_default());
        }
    }
    let canonical = canonicalize(doc);
    let bytes = serde_json::to_vec(&canonical.into_json()).unwrap_or_default();
    format!("hash:{}", hex::encode(Sha256::digest(&bytes)))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceDrift {
    pub namespace: String,
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub unchanged: usize,
}

impl NamespaceDrift {
    /// `(added + removed + changed) / max(1, baselineCount ∪ candidateCount)`.
    pub fn score(&self) -> f64 {
        let union = self.added + self.removed + self.changed + self.unchanged;
        let denom = union.max(1) as f64;
        (self.added + self.removed + self.changed) as f64 / denom
    }
}

fn keyed(docs: &[Value]) -> HashMap<String, &Value> {
    docs.iter().map(|d| (document_key(d), d)).collect()
}

fn content_equal(a: &Value, b: &Value) -> bool {
    canonicalize(a) == canonicalize(b)
}

/// Compare one namespace's baseline and candidate document sets.
pub fn diff_namespace(namespace: &str, baseline: &[Value], candidate: &[Value]) -> NamespaceDrift {
    let baseline_by_key = keyed(baseline);
    let candidate_by_key = keyed(candidate);

    let mut all_keys: HashSet<&String> = baseline_by_key.keys().collect();
    all_keys.extend(candidate_by_key.keys());

    let mut drift = NamespaceDrift {
        namespace: namespace.to_string(),
        ..Default::default()
    };

    for key in all_keys {
        match (baseline_by_key.get(key), candidate_by_key.get(key)) {
            (Some(_), None) => drift.removed += 1,
            (None, Some(_)) => drift.added += 1,
            (Some(b), Some(c)) => {
                if content_equal(b, c) {
                    drift.unchanged += 1;
                } else {
                    drift.changed += 1;
                }
            }
            (None, None) => unreachable!("key came from one of the two maps"),
        }
    }

    drift
}

/// Compare a full baseline and candidate fixture set, namespace by
/// namespace. Namespaces present in only one side are still reported
/// (the missing side contributes an empty document list).
pub fn diff_fixture_sets(
    baseline: &BTreeMap<String, Vec<Value>>,
    candidate: &BTreeMap<String, Vec<Value>>,
) -> Vec<NamespaceDrift> {
    let empty = Vec::new();
    let mut namespaces: Vec<&String> = baseline.keys().chain(candidate.keys()).collect();
    namespaces.sort();
    namespaces.dedup();

    namespaces
        .into_iter()
        .map(|ns| {
            diff_namespace(
                ns,
                baseline.get(ns).unwrap_or(&empty),
                candidate.get(ns).unwrap_or(&empty),
            )
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftSeverity {
    Ok,
    Warn,
    Fail,
}

/// Classify a namespace's drift score against the warn/fail thresholds.
/// Callers must enforce `fail_threshold >= warn_threshold` before calling
/// this.
pub fn classify(score: f64, warn_threshold: f64, fail_threshold: f64) -> DriftSeverity {
    if score >= fail_threshold {
        DriftSeverity::Fail
    } else if score >= warn_threshold {
        DriftSeverity::Warn
    } else {
        DriftSeverity::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: i32) -> Value {
        Value::object([("_id".to_string(), Value::Int32(id)), ("v".to_string(), Value::Int32(1))])
    }

    #[test]
    fn drift_gate_classifies_mixed_change_set_as_fail() {
        let baseline: Vec<Value> = (0..100).map(doc).collect();
        let mut candidate: Vec<Value> = baseline.clone();
        // change 10 existing docs
        for item in candidate.iter_mut().take(10) {
            if let Value::Object(map) = item {
                map.insert("v", Value::Int32(2));
            }
        }
        // add 20 new docs
        candidate.extend((100..120).map(doc));

        let drift = diff_namespace("db.users", &baseline, &candidate);
        assert_eq!(drift.added, 20);
        assert_eq!(drift.removed, 0);
        assert_eq!(drift.changed, 10);
        assert!((drift.score() - 0.30).abs() < 1e-9, "score was {}", drift.score());

        assert_eq!(classify(drift.score(), 0.15, 0.30), DriftSeverity::Fail);
    }

    #[test]
    fn identical_sets_have_zero_score() {
        let docs: Vec<Value> = (0..5).map(doc).collect();
        let drift = diff_namespace("db.users", &docs, &docs);
        assert_eq!(drift.score(), 0.0);
        assert_eq!(drift.unchanged, 5);
    }

    #[test]
    fn fallback_to_content_hash_when_no_id() {
        let a = Value::object([("name".to_string(), Value::String("a".to_string()))]);
        let b = Value::object([("name".to_string(), Value::String("a".to_string()))]);
        let drift = diff_namespace("db.noid", &[a], &[b]);
        assert_eq!(drift.unchanged, 1);
        assert_eq!(drift.added, 0);
        assert_eq!(drift.removed, 0);
    }
}
