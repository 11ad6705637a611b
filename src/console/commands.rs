//! Console command parsing and dispatch onto the ControlPlane.

use std::str::FromStr;
use std::sync::Arc;

use crate::coordination::ControlPlane;
use crate::error::PilotError;

pub const HELP_TEXT: &str = "\
Available commands:
  pause   - Pause the agent at the next step
  resume  - Resume a paused agent
  stop    - Stop the agent
  status  - Show whether the agent is running or paused
  help    - Show this help
Keyboard shortcuts (when enabled):
  Ctrl+Alt+S  stop
  Ctrl+Alt+P  pause/resume
  Ctrl+Alt+H  help
  Ctrl+Alt+I  status";

/// Commands accepted from the console and keyboard shortcuts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Pause,
    Resume,
    /// Pause when running, resume when paused
    Toggle,
    Stop,
    Status,
    Help,
}

impl FromStr for ConsoleCommand {
    type Err = PilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pause" => Ok(ConsoleCommand::Pause),
            "resume" => Ok(ConsoleCommand::Resume),
            "toggle" => Ok(ConsoleCommand::Toggle),
            "stop" => Ok(ConsoleCommand::Stop),
            "status" => Ok(ConsoleCommand::Status),
            "help" | "?" => Ok(ConsoleCommand::Help),
            other => Err(PilotError::UnknownCommand(other.to_string())),
        }
    }
}

/// Applies console commands to one task.
#[derive(Clone)]
pub struct Dispatcher {
    control: Arc<ControlPlane>,
    task_id: String,
}

impl Dispatcher {
    pub fn new(control: Arc<ControlPlane>, task_id: impl Into<String>) -> Self {
        Self {
            control,
            task_id: task_id.into(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Apply a command and return the line to show the user.
    pub fn dispatch(&self, command: ConsoleCommand) -> String {
        match command {
            ConsoleCommand::Pause => {
                if self.control.request_pause(&self.task_id) {
                    "Agent will pause after the current step".to_string()
                } else {
                    "Agent is already paused".to_string()
                }
            }
            ConsoleCommand::Resume => {
                if self.control.resume(&self.task_id) {
                    "Agent resumed".to_string()
                } else {
                    "Agent is not paused".to_string()
                }
            }
            ConsoleCommand::Toggle => {
                if self.control.toggle_pause(&self.task_id) {
                    "Agent will pause after the current step".to_string()
                } else {
                    "Agent resumed".to_string()
                }
            }
            ConsoleCommand::Stop => {
                self.control.request_stop(&self.task_id);
                "Agent will stop after the current step".to_string()
            }
            ConsoleCommand::Status => self.status_line(),
            ConsoleCommand::Help => HELP_TEXT.to_string(),
        }
    }

    fn status_line(&self) -> String {
        let status = self.control.status(&self.task_id);
        let state = if status.stop_requested {
            "stopping"
        } else if status.paused {
            "paused"
        } else {
            "running"
        };
        format!("Agent {} is {}", self.task_id, state)
    }
}
