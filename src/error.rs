//! Error types for the recorder's fallible edges.
//!
//! None of these cross a state-machine transition: callers log them and fall
//! back to an empty ledger or a skipped frame.

use thiserror::Error;

/// Failure reading or writing the scene blob.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The blob is not valid JSON or does not match either known layout.
    #[error("recorder data is malformed: {0}")]
    Json(#[from] serde_json::Error),
    /// A snapshot references vertices that do not exist.
    #[error("snapshot for `{object}` is inconsistent: {reason}")]
    Snapshot { object: String, reason: String },
}

/// Failure writing an exported frame.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("frame {index} could not be written: {reason}")]
    Frame { index: usize, reason: String },
    #[error("export could not be finalized: {0}")]
    Finalize(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure talking to the host scene.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("object `{0}` does not exist")]
    MissingObject(String),
    #[error("object `{0}` is not a mesh")]
    NotAMesh(String),
}
