//! Differential-testing harness for a MongoDB-compatible database engine.
//! Two backends — an in-process wire-protocol ingress and a real
//! reference server — execute the same deterministic scenario and their
//! responses are canonicalized and compared at field granularity.

pub mod backend;
pub mod canonical;
pub mod corpus;
pub mod diff;
pub mod errors;
pub mod fixture;
pub mod harness;
pub mod importer;
pub mod quality_gate;
pub mod replay;
pub mod scenario;
pub mod value;

pub use crate::backend::{in_process::InProcessBackend, reference::ReferenceBackend, Backend};
pub use crate::diff::{diff_outcomes, DiffEntry, DiffResult, DiffStatus};
pub use crate::errors::{ArtifactError, BackendError, HarnessError, Result, ValidationError};
pub use crate::harness::{DifferentialHarness, DifferentialReport};
pub use crate::scenario::{Scenario, ScenarioCommand, ScenarioOutcome};
pub use crate::value::{OrderedMap2, Value};
