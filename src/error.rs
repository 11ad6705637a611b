//! Error types for webpilot
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in webpilot
#[derive(Debug, Error)]
pub enum PilotError {
    /// Oracle output could not be turned into a structured result
    #[error("Parse error: {0}")]
    Parse(String),

    /// Environment/browser state accessor failure
    #[error("Environment error: {0}")]
    Environment(String),

    /// Action-execution collaborator failure
    #[error("Execution error: {0}")]
    Execution(String),

    /// Interaction or login wait exceeded its bound
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Invalid budgets or limits
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Control transport received an unrecognized instruction
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Interaction bridge misuse (duplicate request id, closed channel)
    #[error("Interaction error: {0}")]
    Interaction(String),

    /// Decision oracle failure
    #[error("Oracle error: {0}")]
    Oracle(String),

    /// Session/history persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for webpilot operations
pub type Result<T> = std::result::Result<T, PilotError>;
