//! Interfaces to the collaborators the run loop drives
//!
//! The browser, the action engine, the decision oracle and the cosmetic
//! history renderer all live outside the core. Each is reached through a
//! narrow trait so runs can be tested against in-memory fakes.

use async_trait::async_trait;

use crate::domain::{Action, ActionOutcome, AgentOutput, EnvironmentSnapshot, RunHistory, ScrollMetrics, TaskRun};
use crate::error::Result;

use super::oracle::Conversation;

/// Read access to the browser plus the one mutation the exploration gate needs.
#[async_trait]
pub trait Environment: Send + Sync {
    /// Capture the current state, with a screenshot when `capture_visual` is set.
    async fn snapshot(&self, capture_visual: bool) -> Result<EnvironmentSnapshot>;

    /// Live scroll metrics of the active view.
    async fn scroll_metrics(&self) -> Result<ScrollMetrics>;

    /// Scroll the active view vertically by `dy` pixels.
    async fn scroll_by(&self, dy: i64) -> Result<()>;
}

/// Executes oracle-proposed actions against the environment.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, actions: &[Action], environment: &dyn Environment) -> Result<Vec<ActionOutcome>>;
}

/// The decision-making service.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Structured channel returning a parsed result
    async fn decide(&self, conversation: &Conversation) -> Result<AgentOutput>;

    /// Unstructured channel returning raw text that should contain a JSON result
    async fn complete_raw(&self, conversation: &Conversation) -> Result<String>;
}

/// Verdict of an output validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Accepted,
    Rejected(String),
}

/// Optional check run after each step before the loop looks at done.
#[async_trait]
pub trait OutputValidator: Send + Sync {
    async fn validate(&self, run: &TaskRun) -> Result<Validation>;
}

/// Turns a finished history into an artifact (JSON, GIF, ...). Failures never affect the run.
pub trait HistoryRenderer: Send + Sync {
    fn render(&self, history: &RunHistory) -> Result<()>;
}
