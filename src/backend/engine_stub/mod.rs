//! A minimal, in-memory stand-in for "the engine under test".
//!
//! The harness's job is to drive *some* ingress that answers the wire
//! contract `handle(request_frame) -> response_frame`; this module is
//! that ingress for local development and the harness's own test suite.
//! It is deliberately small: no storage engine, no WAL, no on-disk
//! persistence — just enough command handling, via a `Command` trait
//! and BSON<->JSON conversion helpers, to exercise every path the
//! differential harness needs to drive.

pub mod commands;
pub mod wire;

use std::collections::HashMap;

use bson::Document;

use self::commands::CommandRegistry;

/// Cold, in-memory MongoDB-ish command responder. A fresh `StubEngine`
/// is created per scenario by [`super::in_process::InProcessBackend`],
/// giving every scenario a cold-state ingress.
pub struct StubEngine {
    collections: HashMap<String, Vec<Document>>,
    registry: CommandRegistry,
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            collections: HashMap::new(),
            registry: CommandRegistry::new(),
        }
    }

    /// Execute one already-decoded command document against this
    /// engine's in-memory state, returning the response document.
    pub fn handle_command(&mut self, command_doc: &Document) -> Document {
        self.registry.execute(command_doc, &mut self.collections)
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}
