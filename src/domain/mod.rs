//! Domain types for webpilot
//!
//! This module contains the core value types:
//! - EnvironmentSnapshot: read-only browser state at an instant
//! - Action: closed set of oracle-proposed actions
//! - ActionOutcome: per-action result
//! - AgentOutput: structured oracle result
//! - TaskRun / StepRecord / RunHistory: run state and history

pub mod action;
pub mod outcome;
pub mod output;
pub mod run;
pub mod snapshot;

pub use action::{Action, ScrollDirection, contains_navigation};
pub use outcome::ActionOutcome;
pub use output::{AgentOutput, CurrentState};
pub use run::{RunHistory, RunStatus, StepRecord, TaskRun};
pub use snapshot::{EnvironmentSnapshot, ScrollMetrics};
