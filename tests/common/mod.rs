//! Shared in-memory collaborators for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use webpilot::actions::{ActionHandler, ActionRegistry};
use webpilot::config::Config;
use webpilot::coordination::ControlPlane;
use webpilot::domain::{Action, ActionOutcome, AgentOutput, CurrentState, EnvironmentSnapshot, ScrollMetrics};
use webpilot::error::{PilotError, Result};
use webpilot::runner::{ActionExecutor, Conversation, Environment, Oracle};

/// A single-tab browser over a page of fixed height
pub struct PageBrowser {
    url: Mutex<String>,
    metrics: Mutex<ScrollMetrics>,
    scrolls: Mutex<Vec<i64>>,
    opened: Mutex<Vec<String>>,
}

impl PageBrowser {
    pub fn new(url: &str, page_height: i64) -> Arc<Self> {
        Arc::new(Self {
            url: Mutex::new(url.to_string()),
            metrics: Mutex::new(ScrollMetrics::new(page_height, 800, 0)),
            scrolls: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
        })
    }

    pub fn navigate(&self, url: &str) {
        *self.url.lock().unwrap() = url.to_string();
        self.metrics.lock().unwrap().offset = 0;
    }

    pub fn scrolls(&self) -> Vec<i64> {
        self.scrolls.lock().unwrap().clone()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl Environment for PageBrowser {
    async fn snapshot(&self, _capture_visual: bool) -> Result<EnvironmentSnapshot> {
        let url = self.url.lock().unwrap().clone();
        let metrics = *self.metrics.lock().unwrap();
        Ok(EnvironmentSnapshot::new(url, "Test page").with_scroll(metrics))
    }

    async fn scroll_metrics(&self) -> Result<ScrollMetrics> {
        Ok(*self.metrics.lock().unwrap())
    }

    async fn scroll_by(&self, dy: i64) -> Result<()> {
        self.scrolls.lock().unwrap().push(dy);
        self.metrics.lock().unwrap().offset += dy;
        Ok(())
    }
}

/// Records `open_tab` targets on the browser
struct OpenTabHandler {
    browser: Arc<PageBrowser>,
}

#[async_trait]
impl ActionHandler for OpenTabHandler {
    async fn handle(&self, action: &Action, _environment: &dyn Environment) -> Result<ActionOutcome> {
        match action {
            Action::OpenTab { url } => {
                self.browser.opened.lock().unwrap().push(url.clone());
                Ok(ActionOutcome::info(format!("Opened new tab with {}", url)))
            }
            other => Err(PilotError::Execution(format!("unexpected action {}", other.name()))),
        }
    }
}

/// Built-in handlers plus an `open_tab` recorder
pub fn registry_for(browser: &Arc<PageBrowser>) -> ActionRegistry {
    let mut registry = ActionRegistry::with_builtins();
    registry.register(
        "open_tab",
        Arc::new(OpenTabHandler {
            browser: Arc::clone(browser),
        }),
    );
    registry
}

/// Plays back queued outputs, then repeats the last one
pub struct ScriptOracle {
    queue: Mutex<VecDeque<AgentOutput>>,
    fallback: AgentOutput,
    calls: AtomicUsize,
}

impl ScriptOracle {
    pub fn repeating(output: AgentOutput) -> Arc<Self> {
        Self::sequence(Vec::new(), output)
    }

    pub fn sequence(outputs: Vec<AgentOutput>, then: AgentOutput) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(outputs.into()),
            fallback: then,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Oracle for ScriptOracle {
    async fn decide(&self, _conversation: &Conversation) -> Result<AgentOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone()))
    }

    async fn complete_raw(&self, _conversation: &Conversation) -> Result<String> {
        Err(PilotError::Oracle("raw channel unused".into()))
    }
}

/// Delegates to an inner executor and requests stop after `n` executions
pub struct StopAfter {
    inner: ActionRegistry,
    control: Arc<ControlPlane>,
    task_id: String,
    remaining: AtomicUsize,
}

impl StopAfter {
    pub fn new(inner: ActionRegistry, control: Arc<ControlPlane>, task_id: &str, n: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            control,
            task_id: task_id.to_string(),
            remaining: AtomicUsize::new(n),
        })
    }
}

#[async_trait]
impl ActionExecutor for StopAfter {
    async fn execute(&self, actions: &[Action], environment: &dyn Environment) -> Result<Vec<ActionOutcome>> {
        let outcomes = self.inner.execute(actions, environment).await?;
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.control.request_stop(&self.task_id);
        }
        Ok(outcomes)
    }
}

pub fn output(thought: &str, actions: Vec<Action>) -> AgentOutput {
    AgentOutput::new(
        CurrentState {
            thought: thought.to_string(),
            ..Default::default()
        },
        actions,
    )
}

pub fn open_tab(url: &str) -> AgentOutput {
    output("Open the first result", vec![Action::OpenTab { url: url.to_string() }])
}

pub fn scroll_down() -> AgentOutput {
    output(
        "Keep reading",
        vec![Action::Scroll {
            direction: Default::default(),
            amount: 300,
        }],
    )
}

pub fn done(text: &str) -> AgentOutput {
    output("Finished", vec![Action::Done { text: text.to_string() }])
}

/// Defaults with sessions written under `dir`
pub fn config_in(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.storage.sessions_dir = dir.to_path_buf();
    config.agent.use_vision = false;
    config
}
