//! Error types for plugdiag

use thiserror::Error;

/// Main error type for plugdiag operations.
///
/// The delivery path never surfaces these to callers; they exist for the
/// construction and inventory operations that can legitimately fail.
#[derive(Error, Debug)]
pub enum DiagError {
    /// Severity token was not one of the eight tiers
    #[error("Invalid severity: {0}")]
    InvalidSeverity(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Plugin configuration was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias using DiagError
pub type DiagResult<T> = Result<T, DiagError>;
