//! The reference backend: drives a real MongoDB-compatible server
//! through the official `mongodb` driver (`ClientOptions::parse`,
//! `Client::with_options`, `database.run_command`).

use std::collections::HashMap;

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use mongodb::{options::ClientOptions, Client, ClientSession};
use tokio::sync::Mutex as AsyncMutex;

use crate::backend::{
    build_command_document, format_backend_error, format_command_failure, is_response_successful, Backend,
};
use crate::errors::BackendError;
use crate::scenario::{Scenario, ScenarioOutcome};
use crate::value::Value;

pub struct ReferenceBackend {
    name: String,
    uri: String,
    db_prefix: String,
}

impl ReferenceBackend {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            name: "reference".to_string(),
            uri: uri.into(),
            db_prefix: "difftest".to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.db_prefix = prefix.into();
        self
    }

    /// `prefix_<sanitized-scenario-id>`, max 40 chars of `[a-z0-9_]`.
    fn scenario_db_name(&self, scenario_id: &str) -> String {
        let sanitized: String = scenario_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        let full = format!("{}_{}", self.db_prefix, sanitized);
        full.chars().take(40).collect()
    }

    async fn connect(&self) -> Result<Client, BackendError> {
        let options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|e| BackendError::ClientConstruction(format!("parse client options failed: {e}")))?;
        Client::with_options(options)
            .map_err(|e| BackendError::ClientConstruction(format!("create client failed: {e}")))
    }
}

/// Strip `$db` and `lsid`, and coerce `txnNumber` to a 64-bit integer.
/// The driver manages session and db routing itself; these
/// keys are harness bookkeeping that must not reach the wire verbatim.
fn strip_driver_managed_fields(doc: &mut Document) -> (Option<Bson>, Option<Document>) {
    let db = doc.remove("$db");
    let lsid = doc.remove("lsid").and_then(|v| match v {
        Bson::Document(d) => Some(d),
        _ => None,
    });
    if let Some(txn) = doc.get("txnNumber").cloned() {
        let coerced = match txn {
            Bson::Int32(i) => Bson::Int64(i as i64),
            Bson::Double(d) => Bson::Int64(d as i64),
            other => other,
        };
        doc.insert("txnNumber", coerced);
    }
    (db, lsid)
}

fn session_key(lsid: &Option<Document>) -> Option<String> {
    lsid.as_ref()
        .and_then(|d| d.get("id"))
        .map(|id| format!("{id:?}"))
}

/// Equalize minor response-shape drift for `countDocuments`, reading `n`
/// from either the direct response or the first batch's `n` field.
fn normalize_count_documents_response(response: &Document) -> Document {
    let n = response
        .get_i64("n")
        .ok()
        .or_else(|| {
            response
                .get_document("cursor")
                .ok()
                .and_then(|c| c.get_array("firstBatch").ok())
                .and_then(|batch| batch.first())
                .and_then(|first| first.as_document())
                .and_then(|first| first.get_i64("n").ok())
        })
        .unwrap_or(0);
    let ok = response.get_f64("ok").unwrap_or(0.0);
    doc! { "n": Bson::Int64(n), "count": Bson::Int64(n), "ok": Bson::Double(ok) }
}

#[async_trait]
impl Backend for ReferenceBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, scenario: &Scenario) -> ScenarioOutcome {
        let client = match self.connect().await {
            Ok(c) => c,
            Err(e) => return ScenarioOutcome::failure(e.to_string()),
        };

        let db_name = self.scenario_db_name(scenario.id());
        if let Err(e) = client.database(&db_name).drop().await {
            return ScenarioOutcome::failure(
                BackendError::Transport(format!("failed to drop scenario database: {e}")).to_string(),
            );
        }

        let sessions: AsyncMutex<HashMap<String, ClientSession>> = AsyncMutex::new(HashMap::new());
        let mut results = Vec::with_capacity(scenario.commands().len());

        for (index, command) in scenario.commands().iter().enumerate() {
            let built = build_command_document(&command.command_name, &command.payload, &db_name);
            let mut bson_doc = Value::Object(built).into_bson_document();
            let (db_override, lsid) = strip_driver_managed_fields(&mut bson_doc);

            let target_db = if matches!(
                command.command_name.as_str(),
                "commitTransaction" | "abortTransaction"
            ) {
                "admin".to_string()
            } else {
                match db_override {
                    Some(Bson::String(s)) => s,
                    _ => db_name.clone(),
                }
            };

            let key = session_key(&lsid);
            let response = match self
                .run_with_optional_session(&client, &target_db, &bson_doc, &sessions, key)
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    return ScenarioOutcome::failure(format_backend_error(&command.command_name, index, e));
                }
            };

            let normalized = if command.command_name == "countDocuments" {
                normalize_count_documents_response(&response)
            } else {
                response
            };

            let value = Value::from_bson_document(&normalized);
            if !is_response_successful(&value) {
                return ScenarioOutcome::failure(format_command_failure(
                    &command.command_name,
                    index,
                    &value,
                ));
            }
            results.push(value);
        }

        // Sessions are released here (end of scope) on every exit path,
        // success or failure.
        ScenarioOutcome::success(results)
    }
}

impl ReferenceBackend {
    async fn run_with_optional_session(
        &self,
        client: &Client,
        target_db: &str,
        command: &Document,
        sessions: &AsyncMutex<HashMap<String, ClientSession>>,
        key: Option<String>,
    ) -> Result<Document, BackendError> {
        let db = client.database(target_db);
        match key {
            None => db
                .run_command(command.clone())
                .await
                .map_err(|e| BackendError::Transport(e.to_string())),
            Some(key) => {
                let mut guard = sessions.lock().await;
                if !guard.contains_key(&key) {
                    let session = client
                        .start_session()
                        .await
                        .map_err(|e| BackendError::Transport(format!("failed to start session: {e}")))?;
                    guard.insert(key.clone(), session);
                }
                let session = guard.get_mut(&key).expect("just inserted");
                db.run_command(command.clone())
                    .session(session)
                    .await
                    .map_err(|e| BackendError::Transport(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_db_name_is_sanitized_and_bounded() {
        let backend = ReferenceBackend::new("mongodb://localhost:27017").with_prefix("difftest");
        let name = backend.scenario_db_name("Weird Scenario-ID!! with spaces");
        assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
        assert!(name.len() <= 40);
        assert!(name.starts_with("difftest_"));
    }

    #[test]
    fn txn_number_is_coerced_to_int64() {
        let mut doc = doc! { "txnNumber": Bson::Int32(3) };
        strip_driver_managed_fields(&mut doc);
        assert_eq!(doc.get("txnNumber"), Some(&Bson::Int64(3)));
    }

    #[test]
    fn count_documents_normalization_reads_cursor_fallback() {
        let response = doc! {
            "ok": 1.0,
            "cursor": { "firstBatch": [ { "n": Bson::Int32(7) } ] },
        };
        let normalized = normalize_count_documents_response(&response);
        assert_eq!(normalized.get_i64("n").unwrap(), 7);
        assert_eq!(normalized.get_i64("count").unwrap(), 7);
    }

    #[tokio::test]
    async fn connect_surfaces_a_typed_client_construction_error() {
        let backend = ReferenceBackend::new("not-a-mongo-uri");
        let err = backend.connect().await.unwrap_err();
        assert!(matches!(err, BackendError::ClientConstruction(_)));
    }
}
