//! Scenario model. Immutable once built; constructed by
//! catalogs/importers through validating builders that return a typed
//! construction error instead of panicking.

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::value::{OrderedMap2, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioCommand {
    pub command_name: String,
    pub payload: OrderedMap2,
}

impl ScenarioCommand {
    pub fn new(command_name: impl Into<String>, payload: OrderedMap2) -> Self {
        Self {
            command_name: command_name.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scenario {
    id: String,
    description: String,
    commands: Vec<ScenarioCommand>,
}

impl Scenario {
    /// Build a `Scenario`, enforcing: non-blank unique id (uniqueness is
    /// the caller's responsibility across a catalog; here we only check
    /// non-blank), non-empty ordered command sequence, and that every
    /// payload key is a non-empty string (guaranteed by `OrderedMap2`'s
    /// `String` keys, so we only check non-blank).
    pub fn build(
        id: impl Into<String>,
        description: impl Into<String>,
        commands: Vec<ScenarioCommand>,
    ) -> Result<Scenario, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError("scenario id must not be blank".into()));
        }
        if commands.is_empty() {
            return Err(ValidationError(format!(
                "scenario '{id}' must have at least one command"
            )));
        }
        for (i, cmd) in commands.iter().enumerate() {
            if cmd.command_name.trim().is_empty() {
                return Err(ValidationError(format!(
                    "scenario '{id}' command #{i} has a blank command name"
                )));
            }
            for key in cmd.payload.keys() {
                if key.is_empty() {
                    return Err(ValidationError(format!(
                        "scenario '{id}' command #{i} has an empty payload key"
                    )));
                }
            }
        }
        Ok(Scenario {
            id,
            description: description.into(),
            commands,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn commands(&self) -> &[ScenarioCommand] {
        &self.commands
    }
}

impl Serialize for Scenario {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[derive(Serialize)]
        struct Raw<'a> {
            id: &'a str,
            description: &'a str,
            commands: &'a [ScenarioCommand],
        }
        Raw {
            id: &self.id,
            description: &self.description,
            commands: &self.commands,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Scenario {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            id: String,
            description: String,
            commands: Vec<ScenarioCommand>,
        }
        let raw = Raw::deserialize(deserializer)?;
        Scenario::build(raw.id, raw.description, raw.commands).map_err(serde::de::Error::custom)
    }
}

/// Outcome of running one scenario against one backend.
/// Invariant: `success ⇔ errorMessage is absent`, enforced at
/// construction.
#[derive(Debug, Clone)]
pub enum ScenarioOutcome {
    Success { command_results: Vec<Value> },
    Failure { error_message: String },
}

impl ScenarioOutcome {
    pub fn success(command_results: Vec<Value>) -> Self {
        ScenarioOutcome::Success { command_results }
    }

    /// `error_message` must be non-blank.
    pub fn failure(error_message: impl Into<String>) -> Self {
        let msg = error_message.into();
        debug_assert!(!msg.trim().is_empty(), "failure message must be non-blank");
        ScenarioOutcome::Failure {
            error_message: msg,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScenarioOutcome::Success { .. })
    }

    pub fn command_results(&self) -> &[Value] {
        match self {
            ScenarioOutcome::Success { command_results } => command_results,
            ScenarioOutcome::Failure { .. } => &[],
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ScenarioOutcome::Success { .. } => None,
            ScenarioOutcome::Failure { error_message } => Some(error_message),
        }
    }

    /// A JSON-ish view of the outcome as the replay-state object used by
    /// probe evaluation: `{success, commandResults, errorMessage}`.
    pub fn as_replay_state(&self) -> Value {
        let mut obj = OrderedMap2::new();
        obj.insert("success", Value::Bool(self.is_success()));
        obj.insert(
            "commandResults",
            Value::Array(self.command_results().to_vec()),
        );
        obj.insert(
            "errorMessage",
            match self.error_message() {
                Some(m) => Value::String(m.to_string()),
                None => Value::Null,
            },
        );
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_id() {
        let cmd = ScenarioCommand::new("ping", OrderedMap2::new());
        let err = Scenario::build("  ", "desc", vec![cmd]).unwrap_err();
        assert!(err.0.contains("blank"));
    }

    #[test]
    fn rejects_empty_commands() {
        let err = Scenario::build("s1", "desc", vec![]).unwrap_err();
        assert!(err.0.contains("at least one command"));
    }

    #[test]
    fn success_invariant_matches_command_count() {
        let outcome = ScenarioOutcome::success(vec![Value::Int32(1), Value::Int32(2)]);
        assert_eq!(outcome.command_results().len(), 2);
        assert!(outcome.error_message().is_none());

        let failure = ScenarioOutcome::failure("boom");
        assert!(failure.command_results().is_empty());
        assert_eq!(failure.error_message(), Some("boom"));
    }
}
