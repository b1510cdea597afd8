//! The in-process backend: constructs a fresh ingress per
//! scenario (cold state), frames each command into a request message,
//! feeds it to the ingress, and decodes the response.

use async_trait::async_trait;
use bson::Document;

use crate::backend::engine_stub::{wire, StubEngine};
use crate::backend::{
    build_command_document, format_backend_error, format_command_failure, is_response_successful, Backend,
};
use crate::errors::BackendError;
use crate::scenario::{Scenario, ScenarioOutcome};
use crate::value::Value;

const DEFAULT_DB: &str = "difftest";

pub struct InProcessBackend {
    name: String,
}

impl InProcessBackend {
    pub fn new() -> Self {
        Self {
            name: "in-process".to_string(),
        }
    }
}

impl Default for InProcessBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for InProcessBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, scenario: &Scenario) -> ScenarioOutcome {
        let mut engine = StubEngine::new();
        let mut request_id: i32 = 1;
        let mut results = Vec::with_capacity(scenario.commands().len());

        for (index, command) in scenario.commands().iter().enumerate() {
            let command_doc = build_command_document(&command.command_name, &command.payload, DEFAULT_DB);
            let bson_doc: Document = Value::Object(command_doc).into_bson_document();

            let frame = match wire::encode_request(request_id, &bson_doc) {
                Ok(f) => f,
                Err(e) => {
                    return ScenarioOutcome::failure(format_backend_error(
                        &command.command_name,
                        index,
                        BackendError::Encoding(e.to_string()),
                    ));
                }
            };
            request_id += 1;

            let decoded_request = match wire::decode_request(&frame) {
                Ok(d) => d,
                Err(e) => {
                    return ScenarioOutcome::failure(format_backend_error(
                        &command.command_name,
                        index,
                        BackendError::Transport(e.to_string()),
                    ));
                }
            };

            let response_doc = engine.handle_command(&decoded_request);

            let response_frame = match wire::encode_response(request_id, &response_doc) {
                Ok(f) => f,
                Err(e) => {
                    return ScenarioOutcome::failure(format_backend_error(
                        &command.command_name,
                        index,
                        BackendError::Encoding(e.to_string()),
                    ));
                }
            };
            let decoded_response = match wire::decode_response(&response_frame) {
                Ok(d) => d,
                Err(e) => {
                    return ScenarioOutcome::failure(format_backend_error(
                        &command.command_name,
                        index,
                        BackendError::Transport(e.to_string()),
                    ));
                }
            };

            let response_value = Value::from_bson_document(&decoded_response);
            if !is_response_successful(&response_value) {
                return ScenarioOutcome::failure(format_command_failure(
                    &command.command_name,
                    index,
                    &response_value,
                ));
            }
            results.push(response_value);
        }

        ScenarioOutcome::success(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{Scenario, ScenarioCommand};
    use crate::value::OrderedMap2;

    #[tokio::test]
    async fn ping_scenario_succeeds() {
        let backend = InProcessBackend::new();
        let scenario = Scenario::build(
            "ping",
            "trivial ping",
            vec![ScenarioCommand::new("ping", OrderedMap2::new())],
        )
        .unwrap();
        let outcome = backend.execute(&scenario).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.command_results().len(), 1);
    }

    #[tokio::test]
    async fn unknown_command_yields_failure_with_index() {
        let backend = InProcessBackend::new();
        let scenario = Scenario::build(
            "bad",
            "unknown command",
            vec![ScenarioCommand::new("frobnicate", OrderedMap2::new())],
        )
        .unwrap();
        let outcome = backend.execute(&scenario).await;
        assert!(!outcome.is_success());
        assert!(outcome.error_message().unwrap().contains("index 0"));
    }

    #[tokio::test]
    async fn halts_on_first_failing_command() {
        let backend = InProcessBackend::new();
        let mut insert_payload = OrderedMap2::new();
        insert_payload.insert(
            "documents",
            Value::Array(vec![Value::object([("name".to_string(), Value::String("a".to_string()))])]),
        );
        let scenario = Scenario::build(
            "mixed",
            "insert then bad command",
            vec![
                ScenarioCommand::new("insert", insert_payload),
                ScenarioCommand::new("frobnicate", OrderedMap2::new()),
            ],
        )
        .unwrap();
        let outcome = backend.execute(&scenario).await;
        assert!(!outcome.is_success());
        assert!(outcome.error_message().unwrap().contains("index 1"));
    }
}
