//! Coordination between the run loop and out-of-band actors
//!
//! - ControlPlane: pause/resume/stop flags honoured at safe points
//! - InteractionBridge: ask-the-human requests with exactly-once delivery
//! - CommandMailbox: queued commands answered at the safe point

pub mod commands;
pub mod control;
pub mod interaction;

pub use commands::{AgentCommand, CommandMailbox, PendingCommand, QueuedCommand};
pub use control::{ControlPlane, ControlStatus};
pub use interaction::{
    CompletionCallback, InteractionBridge, InteractionKind, InteractionRequest, InteractionResponse, is_affirmative,
};
