//! Error types for the sync pipeline

use thiserror::Error;

/// Sync pipeline error
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A prerequisite enumeration could not be completed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Server returned an unexpected status
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Ruleset document is malformed or incomplete
    #[error("Ruleset error: {0}")]
    Ruleset(String),

    /// Record has no `material` characteristic
    #[error("Record {accession} has no material characteristic")]
    MissingCategory { accession: String },

    /// Record `material` is neither organism nor specimen from organism
    #[error("Record {accession} has unsupported material {material:?}")]
    UnknownMaterial { accession: String, material: String },

    /// Registry response carried no ETag header
    #[error("No ETag returned for {0}")]
    MissingEtag(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
