//! Command mailbox for running agents
//!
//! External actors post named commands for a task and wait for the reply.
//! The run loop drains the mailbox at its safe point, so commands never
//! touch the task run concurrently with a step.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{info, warn};
use serde_json::{Value, json};
use tokio::sync::oneshot;

use crate::error::{PilotError, Result};
use crate::id::generate_command_id;

/// Commands the run loop knows how to answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCommand {
    /// Report url, title and tab count of the current page
    GetPageInfo,
    /// Append a line to the run memory
    AddMemory { text: String },
    /// Report step, status and control flags
    Status,
}

impl AgentCommand {
    /// Resolve a command name and its parameters
    pub fn parse(name: &str, params: &Value) -> Result<Self> {
        match name {
            "get_page_info" => Ok(AgentCommand::GetPageInfo),
            "status" => Ok(AgentCommand::Status),
            "add_memory" => params
                .get("memory_text")
                .or_else(|| params.get("text"))
                .and_then(Value::as_str)
                .map(|text| AgentCommand::AddMemory { text: text.to_string() })
                .ok_or_else(|| PilotError::Parse("add_memory requires a memory_text parameter".to_string())),
            other => Err(PilotError::UnknownCommand(other.to_string())),
        }
    }
}

/// A command waiting in the mailbox
#[derive(Debug)]
pub struct QueuedCommand {
    pub id: String,
    pub name: String,
    pub params: Value,
    reply: oneshot::Sender<Value>,
}

impl QueuedCommand {
    /// Send the result back to the poster. A poster that gave up is ignored.
    pub fn reply(self, result: Value) {
        if self.reply.send(result).is_err() {
            warn!("Poster of command {} ({}) went away before the reply", self.id, self.name);
        }
    }
}

/// Handle returned to the poster
#[derive(Debug)]
pub struct PendingCommand {
    pub id: String,
    rx: oneshot::Receiver<Value>,
}

impl PendingCommand {
    /// Wait for the reply; a timeout answers `{"error": "Command timed out"}`.
    pub async fn wait(self, timeout: Duration) -> Value {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(value)) => value,
            Ok(Err(_)) => json!({"error": "Command dropped"}),
            Err(_) => json!({"error": "Command timed out"}),
        }
    }
}

/// Per-task command queues
#[derive(Debug, Default)]
pub struct CommandMailbox {
    queues: Mutex<HashMap<String, Vec<QueuedCommand>>>,
}

impl CommandMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<QueuedCommand>>> {
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a command for a task.
    ///
    /// Commands whose poster stopped waiting are pruned first, so queues for
    /// tasks that never drain do not outlive their posters.
    pub fn post(&self, task_id: &str, name: impl Into<String>, params: Value) -> PendingCommand {
        let name = name.into();
        let id = generate_command_id();
        let (reply, rx) = oneshot::channel();
        info!("Added command '{}' to task {}'s queue", name, task_id);
        let mut queues = self.lock();
        queues.retain(|_, queue| {
            queue.retain(|command| !command.reply.is_closed());
            !queue.is_empty()
        });
        queues.entry(task_id.to_string()).or_default().push(QueuedCommand {
            id: id.clone(),
            name,
            params,
            reply,
        });
        PendingCommand { id, rx }
    }

    /// Take every queued command for a task, oldest first
    pub fn drain(&self, task_id: &str) -> Vec<QueuedCommand> {
        self.lock().remove(task_id).unwrap_or_default()
    }

    /// Answer and drop everything still queued for a finished task
    pub fn close(&self, task_id: &str, reason: &str) {
        for command in self.drain(task_id) {
            warn!("Command '{}' for task {} was not processed: {}", command.name, task_id, reason);
            command.reply(json!({"error": reason}));
        }
    }

    /// Number of tasks with queued commands
    pub fn task_count(&self) -> usize {
        self.lock().len()
    }

    pub fn queued(&self, task_id: &str) -> usize {
        self.lock().get(task_id).map_or(0, Vec::len)
    }
}
