use thiserror::Error;

/// Top-level error taxonomy for the harness, giving CLI drivers a fixed
/// set of variants to translate into exit codes without re-deriving the
/// classification themselves.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid argument: {0}")]
    Cli(String),

    #[error("validation failed:\n{}", .0.join("\n"))]
    Validation(Vec<String>),

    #[error("artifact integrity error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bson serialization error: {0}")]
    BsonSer(#[from] bson::ser::Error),

    #[error("bson deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),
}

/// Errors constructing core data-model values (Scenario, ReplayBundle,
/// FixtureBundle builders). Never produced by running code, only by
/// malformed input.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Transport / decode failures at a backend boundary. These
/// never cross the harness boundary as `Err` — they are caught at the
/// backend adapter and folded into a `ScenarioOutcome::Failure` — but the
/// adapters still need a typed error internally to build that message.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("payload encoding error: {0}")]
    Encoding(String),

    #[error("client construction error: {0}")]
    ClientConstruction(String),
}

/// Artifact integrity errors: sha256 mismatch, unsupported
/// format version, bad magic bytes. Always fatal for the operation in
/// progress; no silent fallback unless explicitly authorized upstream.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("sha256 mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("unsupported {kind} format version {found} (supported: {supported})")]
    UnsupportedVersion {
        kind: &'static str,
        found: u32,
        supported: u32,
    },

    #[error("bad magic bytes in {file}: expected {expected:#010x}, got {actual:#010x}")]
    BadMagic {
        file: String,
        expected: u32,
        actual: u32,
    },

    #[error("fixture version mismatch: required {required}, manifest declares {found}")]
    FixtureVersionMismatch { required: String, found: String },

    #[error("manifest missing required field: {0}")]
    MissingField(&'static str),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
