//! Diff engine: walk two canonical outcome trees rooted at
//! `$`, emit one `DiffEntry` per divergence, and classify the pair's
//! overall `DiffResult` status.

use serde::{Deserialize, Serialize};

use crate::canonical::{canonicalize, semantic_eq};
use crate::scenario::ScenarioOutcome;
use crate::value::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DiffStatus {
    Match,
    Mismatch,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffEntry {
    pub path: String,
    pub left: serde_json::Value,
    pub right: serde_json::Value,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffResult {
    pub scenario_id: String,
    pub left_backend: String,
    pub right_backend: String,
    pub status: DiffStatus,
    pub entries: Vec<DiffEntry>,
    pub error_message: Option<String>,
}

/// Walk two canonical trees rooted at `$`, emitting one `DiffEntry` per
/// divergence. Shape mismatches (differing key sets or array lengths)
/// emit a single entry at the shortest discriminating path and do not
/// descend further into that subtree.
fn walk(path: &str, left: &Value, right: &Value, out: &mut Vec<DiffEntry>) {
    if semantic_eq(left, right) {
        return;
    }

    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            let mut lk: Vec<&String> = l.keys().collect();
            let mut rk: Vec<&String> = r.keys().collect();
            lk.sort();
            rk.sort();
            if lk != rk {
                let missing_on_right: Vec<&&String> =
                    lk.iter().filter(|k| !rk.contains(k)).collect();
                let missing_on_left: Vec<&&String> =
                    rk.iter().filter(|k| !lk.contains(k)).collect();
                let mut note_parts = Vec::new();
                if !missing_on_right.is_empty() {
                    note_parts.push(format!(
                        "extra key(s) on left: {}",
                        missing_on_right
                            .iter()
                            .map(|k| k.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ));
                }
                if !missing_on_left.is_empty() {
                    note_parts.push(format!(
                        "extra key(s) on right: {}",
                        missing_on_left
                            .iter()
                            .map(|k| k.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ));
                }
                out.push(DiffEntry {
                    path: path.to_string(),
                    left: left.into_json(),
                    right: right.into_json(),
                    note: note_parts.join("; "),
                });
                return;
            }
            for key in lk {
                let child_path = format!("{path}.{key}");
                let lv = l.get(key).expect("key present");
                let rv = r.get(key).expect("key present");
                walk(&child_path, lv, rv, out);
            }
        }
        (Value::Array(l), Value::Array(r)) => {
            if l.len() != r.len() {
                out.push(DiffEntry {
                    path: path.to_string(),
                    left: left.into_json(),
                    right: right.into_json(),
                    note: format!("array length differs: left={} right={}", l.len(), r.len()),
                });
                return;
            }
            for (i, (lv, rv)) in l.iter().zip(r.iter()).enumerate() {
                let child_path = format!("{path}[{i}]");
                walk(&child_path, lv, rv, out);
            }
        }
        _ => {
            out.push(DiffEntry {
                path: path.to_string(),
                left: left.into_json(),
                right: right.into_json(),
                note: format!(
                    "value differs: left is {}, right is {}",
                    type_name(left),
                    type_name(right)
                ),
            });
        }
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Int32(_) | Value::Int64(_) | Value::Double(_) | Value::Decimal(_) => "number",
        Value::String(_) => "string",
        Value::Bytes(_) => "bytes",
        Value::DateTimeMs(_) => "date",
        Value::ObjectIdHex(_) => "objectId",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Diff two scenario outcomes, producing the scenario's single
/// `DiffResult`.
pub fn diff_outcomes(
    scenario_id: &str,
    left_backend: &str,
    right_backend: &str,
    left: &ScenarioOutcome,
    right: &ScenarioOutcome,
) -> DiffResult {
    match (left, right) {
        (ScenarioOutcome::Failure { error_message: lm }, ScenarioOutcome::Failure { error_message: rm }) =>
        {
            // Both failed: compare failures semantically. If the messages
            // are semantically equal the scenario is a MATCH (spec's
            // "command failure parity" end-to-end scenario); otherwise the
            // differing failure text is itself reported as MISMATCH-style
            // content under an ERROR status, since neither side executed
            // successfully.
            if lm == rm {
                DiffResult {
                    scenario_id: scenario_id.to_string(),
                    left_backend: left_backend.to_string(),
                    right_backend: right_backend.to_string(),
                    status: DiffStatus::Match,
                    entries: Vec::new(),
                    error_message: None,
                }
            } else {
                DiffResult {
                    scenario_id: scenario_id.to_string(),
                    left_backend: left_backend.to_string(),
                    right_backend: right_backend.to_string(),
                    status: DiffStatus::Error,
                    entries: Vec::new(),
                    error_message: Some(format!("left: {lm} | right: {rm}")),
                }
            }
        }
        (ScenarioOutcome::Failure { error_message }, _) => DiffResult {
            scenario_id: scenario_id.to_string(),
            left_backend: left_backend.to_string(),
            right_backend: right_backend.to_string(),
            status: DiffStatus::Error,
            entries: Vec::new(),
            error_message: Some(error_message.clone()),
        },
        (_, ScenarioOutcome::Failure { error_message }) => DiffResult {
            scenario_id: scenario_id.to_string(),
            left_backend: left_backend.to_string(),
            right_backend: right_backend.to_string(),
            status: DiffStatus::Error,
            entries: Vec::new(),
            error_message: Some(error_message.clone()),
        },
        (
            ScenarioOutcome::Success {
                command_results: l,
            },
            ScenarioOutcome::Success {
                command_results: r,
            },
        ) => {
            let left_results: Vec<Value> = l.iter().map(canonicalize).collect();
            let right_results: Vec<Value> = r.iter().map(canonicalize).collect();
            let mut entries = Vec::new();
            if left_results.len() == 1 && right_results.len() == 1 {
                // A single command's result tree is itself the root: the
                // commandResults wrapper carries no semantic meaning when
                // there is nothing to index.
                walk("$", &left_results[0], &right_results[0], &mut entries);
            } else if left_results.len() != right_results.len() {
                entries.push(DiffEntry {
                    path: "$".to_string(),
                    left: Value::Array(left_results).into_json(),
                    right: Value::Array(right_results).into_json(),
                    note: format!(
                        "command result count differs: left={} right={}",
                        l.len(),
                        r.len()
                    ),
                });
            } else {
                for (i, (lv, rv)) in left_results.iter().zip(right_results.iter()).enumerate() {
                    let root = format!("$[{i}]");
                    walk(&root, lv, rv, &mut entries);
                }
            }
            let status = if entries.is_empty() {
                DiffStatus::Match
            } else {
                DiffStatus::Mismatch
            };
            DiffResult {
                scenario_id: scenario_id.to_string(),
                left_backend: left_backend.to_string(),
                right_backend: right_backend.to_string(),
                status,
                entries,
                error_message: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(pairs: &[(&str, Value)]) -> Value {
        Value::object(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())))
    }

    #[test]
    fn numeric_equivalence_yields_match() {
        let left = ScenarioOutcome::success(vec![obj(&[("n", Value::Int32(1))])]);
        let right = ScenarioOutcome::success(vec![obj(&[("n", Value::Double(1.0))])]);
        let result = diff_outcomes("s1", "in-process", "reference", &left, &right);
        assert_eq!(result.status, DiffStatus::Match);
        assert!(result.entries.is_empty());
    }

    #[test]
    fn shape_divergence_yields_single_entry() {
        let left = ScenarioOutcome::success(vec![obj(&[
            ("ok", Value::Int32(1)),
            ("x", obj(&[("a", Value::Int32(1))])),
        ])]);
        let right = ScenarioOutcome::success(vec![obj(&[
            ("ok", Value::Int32(1)),
            (
                "x",
                obj(&[("a", Value::Int32(1)), ("b", Value::Int32(2))]),
            ),
        ])]);
        let result = diff_outcomes("s1", "in-process", "reference", &left, &right);
        assert_eq!(result.status, DiffStatus::Mismatch);
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].path, "$.x");
        assert!(result.entries[0].note.contains('b'));
    }

    #[test]
    fn multi_command_scenarios_index_the_root_path() {
        let left = ScenarioOutcome::success(vec![
            obj(&[("ok", Value::Int32(1))]),
            obj(&[("ok", Value::Int32(1)), ("n", Value::Int32(1))]),
        ]);
        let right = ScenarioOutcome::success(vec![
            obj(&[("ok", Value::Int32(1))]),
            obj(&[("ok", Value::Int32(1)), ("n", Value::Int32(2))]),
        ]);
        let result = diff_outcomes("s1", "in-process", "reference", &left, &right);
        assert_eq!(result.status, DiffStatus::Mismatch);
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].path, "$[1].n");
    }

    #[test]
    fn identical_failures_match() {
        let left = ScenarioOutcome::failure("ns not found (code=26)");
        let right = ScenarioOutcome::failure("ns not found (code=26)");
        let result = diff_outcomes("s1", "in-process", "reference", &left, &right);
        assert_eq!(result.status, DiffStatus::Match);
    }

    #[test]
    fn one_sided_failure_is_error() {
        let left = ScenarioOutcome::failure("boom");
        let right = ScenarioOutcome::success(vec![]);
        let result = diff_outcomes("s1", "in-process", "reference", &left, &right);
        assert_eq!(result.status, DiffStatus::Error);
        assert_eq!(result.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn array_length_mismatch_note_is_stable() {
        let left = ScenarioOutcome::success(vec![obj(&[(
            "arr",
            Value::Array(vec![Value::Int32(1), Value::Int32(2)]),
        )])]);
        let right =
            ScenarioOutcome::success(vec![obj(&[("arr", Value::Array(vec![Value::Int32(1)]))])]);
        let result = diff_outcomes("s1", "in-process", "reference", &left, &right);
        assert_eq!(result.entries[0].note, "array length differs: left=2 right=1");
    }
}
