//! Error types for the mnemo MCP transport
//!
//! Uses thiserror for structured error definitions. Protocol-level failures
//! (parse errors, unknown methods, ...) are not Rust errors; they are
//! rendered as [`crate::mcp::JsonRpcError`] envelopes by the dispatcher.

use thiserror::Error;

/// Main error type for mnemo operations
#[derive(Error, Debug)]
pub enum MnemoError {
    /// Session lookup failed
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session id already registered in the namespace
    #[error("Session already exists: {0}")]
    SessionExists(String),

    /// Session store could not be reached (actor gone, call timed out)
    #[error("Session store unavailable: {0}")]
    SessionStore(String),

    /// Malformed session identifier
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    /// Malformed caller namespace
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    /// Input failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Tool backend reported a failure
    #[error("Tool error: {0}")]
    Tool(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for mnemo operations
pub type Result<T> = std::result::Result<T, MnemoError>;

impl From<anyhow::Error> for MnemoError {
    fn from(err: anyhow::Error) -> Self {
        MnemoError::Other(err.to_string())
    }
}
