//! Step orchestration and the outer run loop.
//!
//! This module provides:
//! - ExplorationGate and LoginDetector, the per-step gates
//! - StepOrchestrator, the per-step state machine
//! - RunLoop, the budgeted driver honouring pause/stop at safe points
//! - The collaborator traits the loop drives

pub mod collaborators;
pub mod exploration;
pub mod login;
pub mod oracle;
pub mod run_loop;
pub mod step;

#[cfg(test)]
pub(crate) mod test_support;

pub use collaborators::{ActionExecutor, Environment, HistoryRenderer, Oracle, OutputValidator, Validation};
pub use exploration::{ExplorationGate, GatePhase};
pub use login::{DEFAULT_SERVICE_NAME, LoginDetector};
pub use oracle::{Conversation, parse_raw_output, query_oracle};
pub use run_loop::{RunLoop, RunSettings};
pub use step::{Collaborators, StepOrchestrator, StepPhase, StepReport, StepSettings};
