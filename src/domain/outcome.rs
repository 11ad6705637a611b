//! Action outcome types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of executing a single action (or a synthetic step outcome).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Content produced by the action, reported back to the oracle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_content: Option<String>,
    /// Error text if the action failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether this outcome finishes the task
    #[serde(default)]
    pub is_done: bool,
    /// Optional structured metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ActionOutcome {
    /// Informational outcome with extracted content
    pub fn info(content: impl Into<String>) -> Self {
        Self {
            extracted_content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Error-bearing outcome
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Final outcome carrying the task answer
    pub fn done(content: impl Into<String>) -> Self {
        Self {
            extracted_content: Some(content.into()),
            is_done: true,
            ..Default::default()
        }
    }

    /// Terminal marker with no content, used for stop records
    pub fn terminal() -> Self {
        Self {
            is_done: true,
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
