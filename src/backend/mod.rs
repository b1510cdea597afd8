//! Backend adapters. Two concrete implementations —
//! [`in_process::InProcessBackend`] and [`reference::ReferenceBackend`] —
//! sit behind one [`Backend`] trait so the harness can be generic over
//! the pair.

pub mod engine_stub;
pub mod in_process;
pub mod reference;

use async_trait::async_trait;

use crate::errors::BackendError;
use crate::scenario::{Scenario, ScenarioOutcome};
use crate::value::{OrderedMap2, Value};

/// `execute(scenario) -> outcome`, implemented by each concrete backend.
/// The harness is generic over the pair.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, scenario: &Scenario) -> ScenarioOutcome;
}

/// Build the wire command document for one `ScenarioCommand`, per the
/// payload-to-command translation rule: choose the "command
/// value" in priority order `payload[commandName]`, then
/// `payload["collection"]`, then `payload["commandValue"]`, else the
/// integer `1`. The consumed key is removed; remaining payload entries
/// are appended in insertion order. `$db` is injected from
/// `default_db` only when no exact `$db` key is already present.
pub fn build_command_document(
    command_name: &str,
    payload: &OrderedMap2,
    default_db: &str,
) -> OrderedMap2 {
    let mut remaining = payload.clone();

    let command_value = if let Some(v) = remaining.remove(command_name) {
        v
    } else if let Some(v) = remaining.remove("collection") {
        v
    } else if let Some(v) = remaining.remove("commandValue") {
        v
    } else {
        Value::Int32(1)
    };

    let mut doc = OrderedMap2::new();
    doc.insert(command_name, command_value);
    for (k, v) in remaining.iter() {
        doc.insert(k.clone(), v.clone());
    }
    if !doc.contains_key("$db") {
        doc.insert("$db", Value::String(default_db.to_string()));
    }
    doc
}

/// A response is successful iff `ok == 1.0` and it has no non-empty
/// `writeErrors` array and no `writeConcernError`.
pub fn is_response_successful(response: &Value) -> bool {
    let Some(obj) = response.as_object() else {
        return false;
    };
    let ok = obj
        .get("ok")
        .and_then(Value::as_f64)
        .map(|v| v == 1.0)
        .unwrap_or(false);
    if !ok {
        return false;
    }
    let has_write_errors = obj
        .get("writeErrors")
        .and_then(Value::as_array)
        .map(|a| !a.is_empty())
        .unwrap_or(false);
    if has_write_errors {
        return false;
    }
    !obj.contains_key("writeConcernError")
}

/// Error-message/code/codeName extraction, preferring top-level
/// `errmsg`, then the first write error, then the write concern error.
fn first_of<'a>(
    obj: &'a OrderedMap2,
    field: &str,
) -> Option<&'a Value> {
    if let Some(v) = obj.get(field) {
        return Some(v);
    }
    if let Some(write_errors) = obj.get("writeErrors").and_then(Value::as_array) {
        if let Some(first) = write_errors.first().and_then(Value::as_object) {
            if let Some(v) = first.get(field) {
                return Some(v);
            }
        }
    }
    if let Some(wce) = obj.get("writeConcernError").and_then(Value::as_object) {
        if let Some(v) = wce.get(field) {
            return Some(v);
        }
    }
    None
}

/// Format the failure string for a command that did not succeed:
/// `command '<name>' failed at index <i>: <msg> (code=<n>, codeName=<name>)`.
pub fn format_command_failure(command_name: &str, index: usize, response: &Value) -> String {
    let obj = response.as_object();
    let msg = obj
        .and_then(|o| first_of(o, "errmsg"))
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let code = obj
        .and_then(|o| first_of(o, "code"))
        .and_then(Value::as_i64)
        .unwrap_or(-1);
    let code_name = obj
        .and_then(|o| first_of(o, "codeName"))
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string();
    format!("command '{command_name}' failed at index {index}: {msg} (code={code}, codeName={code_name})")
}

/// Format the failure string for a command that could not even reach a
/// decoded response — a transport, encoding, or client-construction
/// failure, carried as a typed [`BackendError`] instead of an ad hoc
/// string so both backends build these messages the same way.
pub fn format_backend_error(command_name: &str, index: usize, err: BackendError) -> String {
    format!("command '{command_name}' failed at index {index}: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_value_priority_uses_command_name_first() {
        let mut payload = OrderedMap2::new();
        payload.insert("find", Value::String("widgets".to_string()));
        payload.insert("collection", Value::String("ignored".to_string()));
        payload.insert("filter", Value::object([]));
        let doc = build_command_document("find", &payload, "testdb");
        assert_eq!(doc.get("find"), Some(&Value::String("widgets".to_string())));
        assert!(doc.contains_key("filter"));
        assert_eq!(doc.get("$db"), Some(&Value::String("testdb".to_string())));
    }

    #[test]
    fn command_value_falls_back_to_collection_then_integer_one() {
        let mut payload = OrderedMap2::new();
        payload.insert("collection", Value::String("widgets".to_string()));
        let doc = build_command_document("count", &payload, "testdb");
        assert_eq!(doc.get("count"), Some(&Value::String("widgets".to_string())));

        let empty = OrderedMap2::new();
        let doc2 = build_command_document("ping", &empty, "testdb");
        assert_eq!(doc2.get("ping"), Some(&Value::Int32(1)));
    }

    #[test]
    fn existing_db_key_is_not_overwritten() {
        let mut payload = OrderedMap2::new();
        payload.insert("$db", Value::String("explicit".to_string()));
        let doc = build_command_document("ping", &payload, "default");
        assert_eq!(doc.get("$db"), Some(&Value::String("explicit".to_string())));
    }

    #[test]
    fn success_requires_ok_and_no_write_errors() {
        let mut ok_resp = OrderedMap2::new();
        ok_resp.insert("ok", Value::Double(1.0));
        assert!(is_response_successful(&Value::Object(ok_resp)));

        let mut failing = OrderedMap2::new();
        failing.insert("ok", Value::Double(1.0));
        failing.insert(
            "writeErrors",
            Value::Array(vec![Value::object([(
                "errmsg".to_string(),
                Value::String("dup key".to_string()),
            )])]),
        );
        assert!(!is_response_successful(&Value::Object(failing)));
    }

    #[test]
    fn failure_message_format() {
        let mut resp = OrderedMap2::new();
        resp.insert("ok", Value::Double(0.0));
        resp.insert("errmsg", Value::String("ns not found".to_string()));
        resp.insert("code", Value::Int32(26));
        resp.insert("codeName", Value::String("NamespaceNotFound".to_string()));
        let msg = format_command_failure("find", 0, &Value::Object(resp));
        assert_eq!(
            msg,
            "command 'find' failed at index 0: ns not found (code=26, codeName=NamespaceNotFound)"
        );
    }

    #[test]
    fn backend_error_failure_format() {
        let msg = format_backend_error("insert", 2, BackendError::Transport("connection reset".to_string()));
        assert_eq!(msg, "command 'insert' failed at index 2: transport error: connection reset");
    }
}
