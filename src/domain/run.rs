//! Task run and step history records
//!
//! A TaskRun is one execution of a task. It is owned by the run loop and only
//! mutated through the update operations below. When the loop exits the run is
//! frozen into a RunHistory.

use serde::{Deserialize, Serialize};

use super::outcome::ActionOutcome;
use super::output::{AgentOutput, CurrentState};
use super::snapshot::EnvironmentSnapshot;
use crate::id::{generate_task_id, now_ms};

/// Status of a task run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Steps are being executed
    Running,
    /// An action reported the task finished
    Done,
    /// An operator requested a stop
    Stopped,
    /// Step budget used up without finishing
    Exhausted,
    /// Consecutive-failure limit reached
    Failed,
}

impl RunStatus {
    /// Returns true if the run has ended
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RunStatus::Running => "running",
            RunStatus::Done => "done",
            RunStatus::Stopped => "stopped",
            RunStatus::Exhausted => "exhausted",
            RunStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// One entry per executed step. Never mutated after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-based step number
    pub number: u32,
    /// Oracle output; absent for forced scrolls that failed early and stop markers
    pub output: Option<AgentOutput>,
    /// Environment state at step start
    pub snapshot: Option<EnvironmentSnapshot>,
    /// Outcomes of the step's actions
    pub outcomes: Vec<ActionOutcome>,
    /// When the record was appended (Unix ms)
    pub recorded_at: u64,
}

impl StepRecord {
    pub fn is_done(&self) -> bool {
        self.outcomes.last().is_some_and(|o| o.is_done)
    }

    pub fn has_error(&self) -> bool {
        self.outcomes.iter().any(ActionOutcome::is_error)
    }
}

/// One execution of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
    //=== Identity ===
    /// Unique identifier (timestamp + random suffix: "1738300800123-a1b2")
    pub id: String,

    /// The task description given to the oracle
    pub task: String,

    /// Extra operator-supplied hints for the oracle
    pub add_infos: String,

    //=== Budget ===
    /// Maximum number of steps
    pub max_steps: u32,

    //=== Runtime State ===
    /// Consecutive failed steps
    pub consecutive_failures: u32,

    /// Current status
    pub status: RunStatus,

    /// Accumulated findings, one per line
    pub memory: String,

    /// Latest completed-so-far summary
    pub task_progress: String,

    /// Outcomes of the most recent step, fed to the next oracle turn
    pub last_outcomes: Vec<ActionOutcome>,

    /// Last environment state persisted at a safe point
    pub last_known_good: Option<EnvironmentSnapshot>,

    /// Append-only step history
    records: Vec<StepRecord>,

    //=== Timestamps ===
    pub created_at: u64,
    pub updated_at: u64,
}

impl TaskRun {
    /// Create a new run for a task
    pub fn new(task: impl Into<String>, max_steps: u32) -> Self {
        let now = now_ms();
        Self {
            id: generate_task_id(),
            task: task.into(),
            add_infos: String::new(),
            max_steps,
            consecutive_failures: 0,
            status: RunStatus::Running,
            memory: String::new(),
            task_progress: String::new(),
            last_outcomes: Vec::new(),
            last_known_good: None,
            records: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_add_infos(mut self, add_infos: impl Into<String>) -> Self {
        self.add_infos = add_infos.into();
        self
    }

    /// Step number the next record will carry
    pub fn next_step_number(&self) -> u32 {
        self.records.len() as u32 + 1
    }

    /// Number of records appended so far
    pub fn steps_taken(&self) -> u32 {
        self.records.len() as u32
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn last_record(&self) -> Option<&StepRecord> {
        self.records.last()
    }

    /// Append a step record; the number is assigned here so history never has gaps.
    pub fn push_record(
        &mut self,
        output: Option<AgentOutput>,
        snapshot: Option<EnvironmentSnapshot>,
        outcomes: Vec<ActionOutcome>,
    ) -> u32 {
        let number = self.next_step_number();
        let now = now_ms();
        self.records.push(StepRecord {
            number,
            output,
            snapshot,
            outcomes,
            recorded_at: now,
        });
        self.updated_at = now;
        number
    }

    /// Fold the oracle's reported state into memory and progress
    pub fn absorb_state(&mut self, state: &CurrentState) {
        if let Some(finding) = state.new_finding() {
            self.add_memory(finding);
        }
        if let Some(progress) = state.progress() {
            self.task_progress = progress.to_string();
        }
    }

    /// Append a memory line unless already present. Returns true if added.
    pub fn add_memory(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() || self.memory.contains(text) {
            return false;
        }
        self.memory.push_str(text);
        self.memory.push('\n');
        self.updated_at = now_ms();
        true
    }

    /// True once the latest record finished the task
    pub fn is_done(&self) -> bool {
        self.records.last().is_some_and(StepRecord::is_done)
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    /// Set the terminal status
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.updated_at = now_ms();
    }

    /// Freeze into immutable history
    pub fn into_history(self) -> RunHistory {
        RunHistory {
            task_id: self.id,
            task: self.task,
            status: self.status,
            memory: self.memory,
            task_progress: self.task_progress,
            records: self.records,
            created_at: self.created_at,
            finished_at: self.updated_at,
        }
    }
}

/// Immutable history of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHistory {
    pub task_id: String,
    pub task: String,
    pub status: RunStatus,
    pub memory: String,
    pub task_progress: String,
    pub records: Vec<StepRecord>,
    pub created_at: u64,
    pub finished_at: u64,
}

impl RunHistory {
    pub fn is_done(&self) -> bool {
        self.status == RunStatus::Done
    }

    /// Final answer from the last done outcome, if any
    pub fn final_result(&self) -> Option<&str> {
        self.records
            .last()
            .and_then(|r| r.outcomes.last())
            .and_then(|o| o.extracted_content.as_deref())
    }

    pub fn errors(&self) -> Vec<&str> {
        self.records
            .iter()
            .flat_map(|r| r.outcomes.iter())
            .filter_map(|o| o.error.as_deref())
            .collect()
    }
}
