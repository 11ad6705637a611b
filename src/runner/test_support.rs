//! In-memory collaborators for runner tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::domain::{Action, ActionOutcome, AgentOutput, CurrentState, EnvironmentSnapshot, ScrollMetrics};
use crate::error::{PilotError, Result};

use super::collaborators::{ActionExecutor, Environment, Oracle};
use super::oracle::Conversation;

pub struct FakeBrowser {
    url: Mutex<String>,
    metrics: Mutex<ScrollMetrics>,
    fail_snapshots: AtomicBool,
    frozen_scrolling: AtomicBool,
    scrolls: Mutex<Vec<i64>>,
}

impl FakeBrowser {
    /// A tall page that never reports near-bottom
    pub fn new(url: &str) -> Self {
        Self {
            url: Mutex::new(url.to_string()),
            metrics: Mutex::new(ScrollMetrics::new(100_000, 800, 0)),
            fail_snapshots: AtomicBool::new(false),
            frozen_scrolling: AtomicBool::new(false),
            scrolls: Mutex::new(Vec::new()),
        }
    }

    pub fn navigate(&self, url: &str) {
        *self.url.lock().unwrap() = url.to_string();
    }

    pub fn fail_snapshots(&self, fail: bool) {
        self.fail_snapshots.store(fail, Ordering::SeqCst);
    }

    /// Metrics reads never answer
    pub fn freeze_scrolling(&self, frozen: bool) {
        self.frozen_scrolling.store(frozen, Ordering::SeqCst);
    }

    pub fn scrolls(&self) -> Vec<i64> {
        self.scrolls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Environment for FakeBrowser {
    async fn snapshot(&self, _capture_visual: bool) -> Result<EnvironmentSnapshot> {
        if self.fail_snapshots.load(Ordering::SeqCst) {
            return Err(PilotError::Environment("browser disconnected".into()));
        }
        let url = self.url.lock().unwrap().clone();
        let metrics = *self.metrics.lock().unwrap();
        Ok(EnvironmentSnapshot::new(url, "Page").with_scroll(metrics))
    }

    async fn scroll_metrics(&self) -> Result<ScrollMetrics> {
        if self.frozen_scrolling.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(*self.metrics.lock().unwrap())
    }

    async fn scroll_by(&self, dy: i64) -> Result<()> {
        self.scrolls.lock().unwrap().push(dy);
        let mut metrics = self.metrics.lock().unwrap();
        metrics.offset += dy;
        Ok(())
    }
}

/// Records every action list and answers with one outcome per action.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<Vec<Action>>>,
}

impl RecordingExecutor {
    pub fn calls(&self) -> Vec<Vec<Action>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(&self, actions: &[Action], _environment: &dyn Environment) -> Result<Vec<ActionOutcome>> {
        self.calls.lock().unwrap().push(actions.to_vec());
        Ok(actions
            .iter()
            .map(|action| match action {
                Action::Done { text } => ActionOutcome::done(text.clone()),
                other => ActionOutcome::info(format!("executed {}", other.name())),
            })
            .collect())
    }
}

/// Plays back queued outputs, then repeats the fallback.
pub struct ScriptedOracle {
    queue: Mutex<VecDeque<AgentOutput>>,
    fallback: Option<AgentOutput>,
}

impl ScriptedOracle {
    pub fn repeating(output: AgentOutput) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Some(output),
        }
    }

    pub fn sequence(outputs: Vec<AgentOutput>, then: AgentOutput) -> Self {
        Self {
            queue: Mutex::new(outputs.into()),
            fallback: Some(then),
        }
    }

    pub fn broken() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: None,
        }
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn decide(&self, _conversation: &Conversation) -> Result<AgentOutput> {
        if let Some(output) = self.queue.lock().unwrap().pop_front() {
            return Ok(output);
        }
        self.fallback
            .clone()
            .ok_or_else(|| PilotError::Oracle("oracle unavailable".into()))
    }

    async fn complete_raw(&self, _conversation: &Conversation) -> Result<String> {
        Ok("unavailable".into())
    }
}

pub fn open_tab_output() -> AgentOutput {
    AgentOutput::new(
        CurrentState {
            thought: "Open the first posting".into(),
            ..Default::default()
        },
        vec![Action::OpenTab {
            url: "https://site/jobs/1".into(),
        }],
    )
}
