//! Structured oracle output
//!
//! The oracle answers every step with its view of the current state plus an
//! ordered list of actions.

use serde::{Deserialize, Serialize};

use super::action::Action;

/// Sentinel the oracle uses for "nothing to report".
const NONE_SENTINEL: &str = "None";

/// The oracle's assessment of the current state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrentState {
    /// Evaluation of the previous action ("Success - ...", "Failed - ...")
    pub prev_action_evaluation: String,
    /// Newly discovered findings worth remembering
    pub important_contents: String,
    /// What has been completed so far
    pub completed_contents: String,
    /// Free-text reasoning for the next move
    pub thought: String,
    /// Short summary of the planned actions
    pub summary: String,
}

impl CurrentState {
    /// Finding to append to run memory, if any.
    pub fn new_finding(&self) -> Option<&str> {
        meaningful(&self.important_contents)
    }

    /// Progress summary to record, if any.
    pub fn progress(&self) -> Option<&str> {
        meaningful(&self.completed_contents)
    }

    /// Marker used when logging the evaluation.
    pub fn evaluation_marker(&self) -> &'static str {
        if self.prev_action_evaluation.contains("Success") {
            "success"
        } else if self.prev_action_evaluation.contains("Failed") {
            "failed"
        } else {
            "unknown"
        }
    }
}

fn meaningful(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.contains(NONE_SENTINEL) {
        None
    } else {
        Some(trimmed)
    }
}

/// One structured oracle result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    #[serde(default)]
    pub current_state: CurrentState,
    #[serde(default)]
    pub action: Vec<Action>,
}

impl AgentOutput {
    pub fn new(current_state: CurrentState, action: Vec<Action>) -> Self {
        Self { current_state, action }
    }

    /// Cap the action list at `max` entries.
    pub fn truncate_actions(&mut self, max: usize) {
        self.action.truncate(max);
    }

    pub fn thought(&self) -> &str {
        &self.current_state.thought
    }
}
