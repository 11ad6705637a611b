//! Per-step state machine
//!
//! Each step walks the phases in order, never backwards:
//! ObserveState -> ApplyExplorationGate -> QueryOracle -> UpdateRunMemory ->
//! DetectLoginNeed -> ExecuteOrForceScroll -> RecordHistory.
//!
//! Errors from any phase are caught here and recorded as a single
//! error-bearing outcome; they never escape to the run loop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use serde_json::json;

use crate::config::Config;
use crate::coordination::{InteractionBridge, InteractionKind, InteractionRequest};
use crate::domain::{ActionOutcome, AgentOutput, EnvironmentSnapshot, TaskRun};
use crate::error::Result;

use super::collaborators::{ActionExecutor, Environment, Oracle};
use super::exploration::ExplorationGate;
use super::login::LoginDetector;
use super::oracle::{Conversation, log_response, query_oracle};

/// Phases of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StepPhase {
    ObserveState,
    ApplyExplorationGate,
    QueryOracle,
    UpdateRunMemory,
    DetectLoginNeed,
    ExecuteOrForceScroll,
    RecordHistory,
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepPhase::ObserveState => "observe_state",
            StepPhase::ApplyExplorationGate => "apply_exploration_gate",
            StepPhase::QueryOracle => "query_oracle",
            StepPhase::UpdateRunMemory => "update_run_memory",
            StepPhase::DetectLoginNeed => "detect_login_need",
            StepPhase::ExecuteOrForceScroll => "execute_or_force_scroll",
            StepPhase::RecordHistory => "record_history",
        };
        f.write_str(name)
    }
}

/// The external collaborators a step talks to
#[derive(Clone)]
pub struct Collaborators {
    pub environment: Arc<dyn Environment>,
    pub executor: Arc<dyn ActionExecutor>,
    pub oracle: Arc<dyn Oracle>,
}

/// Step-level knobs taken from the config
#[derive(Debug, Clone)]
pub struct StepSettings {
    pub max_actions_per_step: usize,
    pub use_vision: bool,
    pub enable_user_interaction: bool,
    pub login_timeout: Duration,
    pub system_prompt: String,
}

impl StepSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_actions_per_step: config.agent.max_actions_per_step,
            use_vision: config.agent.use_vision,
            enable_user_interaction: config.agent.enable_user_interaction,
            login_timeout: config.interaction.login_timeout(),
            system_prompt: String::new(),
        }
    }
}

/// What a step leaves behind, filled in as phases complete
#[derive(Debug)]
struct StepDraft {
    phase: StepPhase,
    snapshot: Option<EnvironmentSnapshot>,
    output: Option<AgentOutput>,
}

impl StepDraft {
    fn new() -> Self {
        Self {
            phase: StepPhase::ObserveState,
            snapshot: None,
            output: None,
        }
    }

    fn enter(&mut self, phase: StepPhase) {
        debug_assert!(phase >= self.phase);
        self.phase = phase;
    }
}

/// Result of one step, as seen by the run loop
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub number: u32,
    pub failed: bool,
    /// Phase the step was in when it finished or failed
    pub phase: StepPhase,
}

pub struct StepOrchestrator {
    collaborators: Collaborators,
    bridge: Arc<InteractionBridge>,
    gate: ExplorationGate,
    settings: StepSettings,
}

impl StepOrchestrator {
    pub fn new(collaborators: Collaborators, bridge: Arc<InteractionBridge>, config: &Config) -> Self {
        Self {
            collaborators,
            bridge,
            gate: ExplorationGate::new(&config.exploration),
            settings: StepSettings::from_config(config),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.settings.system_prompt = system_prompt.into();
        self
    }

    pub fn environment(&self) -> &Arc<dyn Environment> {
        &self.collaborators.environment
    }

    pub fn gate(&self) -> &ExplorationGate {
        &self.gate
    }

    pub fn settings(&self) -> &StepSettings {
        &self.settings
    }

    /// Run one step and append exactly one record to the run.
    pub async fn run_step(&mut self, run: &mut TaskRun) -> StepReport {
        let number = run.next_step_number();
        let mut draft = StepDraft::new();

        let result = self.advance(run, number, &mut draft).await;
        let failed_phase = draft.phase;
        draft.enter(StepPhase::RecordHistory);

        let (outcomes, failed) = match result {
            Ok(outcomes) => {
                run.record_success();
                (outcomes, false)
            }
            Err(e) => {
                error!("Step {} failed during {}: {}", number, failed_phase, e);
                run.record_failure();
                (vec![ActionOutcome::error(e.to_string())], true)
            }
        };

        run.last_outcomes = outcomes.clone();
        let recorded = run.push_record(draft.output, draft.snapshot, outcomes);
        debug_assert_eq!(recorded, number);

        StepReport {
            number,
            failed,
            phase: if failed { failed_phase } else { StepPhase::RecordHistory },
        }
    }

    async fn advance(&mut self, run: &mut TaskRun, number: u32, draft: &mut StepDraft) -> Result<Vec<ActionOutcome>> {
        let environment = Arc::clone(&self.collaborators.environment);

        // ObserveState
        let snapshot = environment.snapshot(self.settings.use_vision).await?;
        self.gate.observe(&snapshot.url);
        draft.snapshot = Some(snapshot.clone());

        draft.enter(StepPhase::ApplyExplorationGate);
        let hints = self.gate.hints(&snapshot.url, number);
        if self.gate.is_exploring() {
            info!("Encouraging full page exploration before navigation");
        }
        let conversation = Conversation::build(&self.settings.system_prompt, run, &snapshot, hints);

        draft.enter(StepPhase::QueryOracle);
        let output = query_oracle(
            self.collaborators.oracle.as_ref(),
            &conversation,
            self.settings.max_actions_per_step,
        )
        .await?;
        log_response(&output);
        draft.output = Some(output.clone());

        draft.enter(StepPhase::UpdateRunMemory);
        run.absorb_state(&output.current_state);

        draft.enter(StepPhase::DetectLoginNeed);
        if self.settings.enable_user_interaction
            && LoginDetector::needs_login(&snapshot, &output)
            && let Some(outcome) = self.request_login(&snapshot).await
        {
            return Ok(vec![outcome]);
        }

        draft.enter(StepPhase::ExecuteOrForceScroll);
        if self.gate.should_defer(&output.action) {
            let outcome = self.gate.force_scroll(environment.as_ref()).await;
            return Ok(vec![outcome]);
        }
        self.gate.note_voluntary_scrolls(&output.action);
        self.collaborators
            .executor
            .execute(&output.action, environment.as_ref())
            .await
    }

    /// Ask the human to log in. Returns the outcome to record when they confirm.
    async fn request_login(&mut self, snapshot: &EnvironmentSnapshot) -> Option<ActionOutcome> {
        let service = LoginDetector::service_name(Some(&snapshot.url));
        info!("Agent needs your help: Please login to {}", service);

        let request = InteractionRequest::new(InteractionKind::Login, format!("Please login to {}", service))
            .with_description(format!(
                "The agent reached a login page at {}. Log in in the browser window, then confirm.",
                snapshot.url
            ))
            .with_metadata(json!({"url": snapshot.url, "service": service}));

        let response = match self.bridge.submit(request, self.settings.login_timeout).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Could not request login help: {}", e);
                return None;
            }
        };

        if !response.is_confirmed() {
            warn!("Login to {} was not confirmed - continuing without it", service);
            return None;
        }

        info!("User completed login for {}", service);
        match self.collaborators.environment.snapshot(self.settings.use_vision).await {
            Ok(fresh) => {
                self.gate.observe(&fresh.url);
            }
            Err(e) => warn!("Could not refresh state after login: {}", e),
        }
        Some(ActionOutcome::info(format!("User completed login to {}", service)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::test_support::{FakeBrowser, RecordingExecutor, ScriptedOracle, open_tab_output};

    fn orchestrator(browser: Arc<FakeBrowser>, oracle: ScriptedOracle) -> (StepOrchestrator, Arc<RecordingExecutor>) {
        let executor = Arc::new(RecordingExecutor::default());
        let collaborators = Collaborators {
            environment: browser,
            executor: executor.clone(),
            oracle: Arc::new(oracle),
        };
        let orchestrator = StepOrchestrator::new(collaborators, Arc::new(InteractionBridge::new()), &Config::default());
        (orchestrator, executor)
    }

    #[tokio::test]
    async fn test_snapshot_failure_records_error_step() {
        let browser = Arc::new(FakeBrowser::new("https://site/jobs"));
        browser.fail_snapshots(true);
        let (mut orchestrator, executor) = orchestrator(browser, ScriptedOracle::repeating(open_tab_output()));
        let mut run = TaskRun::new("task", 10);

        let report = orchestrator.run_step(&mut run).await;
        assert!(report.failed);
        assert_eq!(report.phase, StepPhase::ObserveState);
        assert_eq!(run.consecutive_failures, 1);
        assert_eq!(run.records().len(), 1);
        assert!(run.records()[0].snapshot.is_none());
        assert!(run.records()[0].has_error());
        assert!(executor.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_frozen_forced_scroll_finishes_the_step() {
        let browser = Arc::new(FakeBrowser::new("https://site/jobs"));
        browser.freeze_scrolling(true);
        let (mut orchestrator, executor) = orchestrator(browser, ScriptedOracle::repeating(open_tab_output()));
        let mut run = TaskRun::new("task", 10);

        let finished = tokio::time::timeout(Duration::from_secs(3600), orchestrator.run_step(&mut run)).await;
        assert!(finished.is_ok());
        let error = run.records()[0].outcomes[0].error.clone().unwrap();
        assert!(error.contains("Timed out"), "{}", error);
        assert_eq!(orchestrator.gate().scroll_attempts(), 1);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_oracle_failure_is_caught_at_step_boundary() {
        let browser = Arc::new(FakeBrowser::new("https://site/jobs"));
        let (mut orchestrator, _) = orchestrator(browser, ScriptedOracle::broken());
        let mut run = TaskRun::new("task", 10);

        let report = orchestrator.run_step(&mut run).await;
        assert!(report.failed);
        assert_eq!(report.phase, StepPhase::QueryOracle);
        let error = run.records()[0].outcomes[0].error.clone().unwrap();
        assert!(error.starts_with("Parse error"));
        assert!(run.records()[0].snapshot.is_some());
    }

    #[tokio::test]
    async fn test_success_resets_failure_counter() {
        let browser = Arc::new(FakeBrowser::new("https://site/jobs"));
        let (mut orchestrator, _) = orchestrator(browser, ScriptedOracle::repeating(open_tab_output()));
        let mut run = TaskRun::new("task", 10);
        run.record_failure();
        run.record_failure();

        let report = orchestrator.run_step(&mut run).await;
        assert!(!report.failed);
        assert_eq!(run.consecutive_failures, 0);
        assert_eq!(run.last_outcomes.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_updated_from_oracle_state() {
        let browser = Arc::new(FakeBrowser::new("https://site/jobs"));
        let mut output = open_tab_output();
        output.current_state.important_contents = "Three remote roles listed".into();
        let (mut orchestrator, _) = orchestrator(browser, ScriptedOracle::repeating(output));
        let mut run = TaskRun::new("task", 10);
        orchestrator.run_step(&mut run).await;
        orchestrator.run_step(&mut run).await;
        assert_eq!(run.memory, "Three remote roles listed\n");
    }

    #[test]
    fn test_phase_order() {
        assert!(StepPhase::ObserveState < StepPhase::ApplyExplorationGate);
        assert!(StepPhase::DetectLoginNeed < StepPhase::ExecuteOrForceScroll);
        assert_eq!(StepPhase::QueryOracle.to_string(), "query_oracle");
    }
}
