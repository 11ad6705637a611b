//! Outer run loop
//!
//! Drives one TaskRun step by step. The top of each iteration is the only
//! safe point: stop and pause are honoured there, queued commands are
//! answered there, and the last known good state is captured there.

use std::sync::Arc;

use log::{error, info, warn};
use serde_json::{Value, json};

use crate::config::Config;
use crate::coordination::{AgentCommand, CommandMailbox, ControlPlane};
use crate::domain::{ActionOutcome, EnvironmentSnapshot, RunHistory, RunStatus, TaskRun};
use crate::error::PilotError;
use crate::storage::SessionStore;

use super::collaborators::{HistoryRenderer, OutputValidator, Validation};
use super::step::StepOrchestrator;

/// Loop-level knobs taken from the config
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub max_failures: u32,
    pub validate_output: bool,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_failures: config.agent.max_failures,
            validate_output: config.agent.validate_output,
        }
    }
}

pub struct RunLoop {
    orchestrator: StepOrchestrator,
    control: Arc<ControlPlane>,
    mailbox: Option<Arc<CommandMailbox>>,
    validator: Option<Arc<dyn OutputValidator>>,
    renderer: Option<Arc<dyn HistoryRenderer>>,
    sessions: Option<SessionStore>,
    settings: RunSettings,
}

impl RunLoop {
    pub fn new(orchestrator: StepOrchestrator, control: Arc<ControlPlane>, config: &Config) -> Self {
        Self {
            orchestrator,
            control,
            mailbox: None,
            validator: None,
            renderer: None,
            sessions: None,
            settings: RunSettings::from_config(config),
        }
    }

    pub fn with_mailbox(mut self, mailbox: Arc<CommandMailbox>) -> Self {
        self.mailbox = Some(mailbox);
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn OutputValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn HistoryRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_session_store(mut self, sessions: SessionStore) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Execute the run to a terminal state and return its history.
    pub async fn run(&mut self, mut run: TaskRun) -> RunHistory {
        let task_id = run.id.clone();
        let max_steps = run.max_steps;
        info!("Starting task: {}", run.task);
        tracing::info!(task_id = %task_id, max_steps, "Run started");

        let mut status = RunStatus::Exhausted;
        for iteration in 0..max_steps {
            if self.stop_requested(&mut run) {
                status = RunStatus::Stopped;
                break;
            }

            if self.control.is_paused(&task_id) {
                self.save_session(&run);
            }
            self.control.await_if_paused(&task_id).await;
            if self.stop_requested(&mut run) {
                status = RunStatus::Stopped;
                break;
            }

            self.process_commands(&mut run).await;
            self.persist_last_known_good(&mut run).await;

            if run.consecutive_failures >= self.settings.max_failures {
                error!(
                    "Stopping task {} after {} consecutive failures",
                    task_id, run.consecutive_failures
                );
                status = RunStatus::Failed;
                break;
            }

            let report = self.orchestrator.run_step(&mut run).await;
            tracing::info!(
                task_id = %task_id,
                step = report.number,
                phase = %report.phase,
                failed = report.failed,
                "Step finished"
            );

            let final_step = iteration + 1 == max_steps;
            if self.settings.validate_output && !final_step && !self.output_accepted(&mut run).await {
                continue;
            }

            if run.is_done() {
                info!("Task completed successfully");
                status = RunStatus::Done;
                break;
            }
        }

        if status == RunStatus::Exhausted {
            info!("Failed to complete task in maximum steps");
        }
        self.finalize(run, status)
    }

    /// Safe-point stop check; appends the terminal record when set.
    fn stop_requested(&self, run: &mut TaskRun) -> bool {
        if !self.control.is_stop_requested(&run.id) {
            return false;
        }
        info!("Stop requested by user");
        let snapshot = run.last_known_good.clone().unwrap_or_else(EnvironmentSnapshot::empty);
        let number = run.push_record(None, Some(snapshot), vec![ActionOutcome::terminal()]);
        tracing::info!(task_id = %run.id, step = number, "Run stopped");
        true
    }

    async fn persist_last_known_good(&self, run: &mut TaskRun) {
        let use_vision = self.orchestrator.settings().use_vision;
        match self.orchestrator.environment().snapshot(use_vision).await {
            Ok(snapshot) => run.last_known_good = Some(snapshot),
            Err(e) => warn!("Could not capture state before step {}: {}", run.next_step_number(), e),
        }
    }

    async fn output_accepted(&self, run: &mut TaskRun) -> bool {
        let Some(validator) = &self.validator else {
            return true;
        };
        match validator.validate(run).await {
            Ok(Validation::Accepted) => true,
            Ok(Validation::Rejected(reason)) => {
                info!("Output rejected by validator: {}", reason);
                run.last_outcomes = vec![ActionOutcome::info(format!("The output is not yet correct. {}.", reason))];
                false
            }
            Err(e) => {
                warn!("Output validation failed: {}", e);
                true
            }
        }
    }

    /// Answer every queued command. Only place the run is touched on behalf of others.
    async fn process_commands(&self, run: &mut TaskRun) {
        let Some(mailbox) = &self.mailbox else {
            return;
        };
        for command in mailbox.drain(&run.id) {
            info!("Processing command '{}' for task {}", command.name, run.id);
            let reply = match AgentCommand::parse(&command.name, &command.params) {
                Ok(AgentCommand::GetPageInfo) => self.page_info().await,
                Ok(AgentCommand::AddMemory { text }) => {
                    run.add_memory(&text);
                    json!({"status": "Memory added"})
                }
                Ok(AgentCommand::Status) => self.status_of(run),
                Err(PilotError::UnknownCommand(name)) => {
                    warn!("No handler for command '{}'", name);
                    json!({"error": format!("Unknown command '{}'", name)})
                }
                Err(e) => {
                    error!("Error executing command '{}': {}", command.name, e);
                    json!({"error": e.to_string()})
                }
            };
            command.reply(reply);
        }
    }

    async fn page_info(&self) -> Value {
        match self.orchestrator.environment().snapshot(false).await {
            Ok(snapshot) => json!({
                "url": snapshot.url,
                "title": snapshot.title,
                "tabs_count": snapshot.tab_count,
            }),
            Err(e) => json!({"error": e.to_string()}),
        }
    }

    fn status_of(&self, run: &TaskRun) -> Value {
        let control = self.control.status(&run.id);
        json!({
            "task_id": run.id,
            "step": run.steps_taken(),
            "max_steps": run.max_steps,
            "status": run.status,
            "paused": control.paused,
            "stop_requested": control.stop_requested,
            "consecutive_failures": run.consecutive_failures,
            "exploration_attempts": self.orchestrator.gate().scroll_attempts(),
            "memory": run.memory,
            "task_progress": run.task_progress,
        })
    }

    fn save_session(&self, run: &TaskRun) {
        if let Some(sessions) = &self.sessions
            && let Err(e) = sessions.save(&run.id, run)
        {
            error!("Error saving session for task {}: {}", run.id, e);
        }
    }

    fn finalize(&self, mut run: TaskRun, status: RunStatus) -> RunHistory {
        run.finish(status);
        info!(
            "Task {} finished with status {} after {} steps",
            run.id,
            status,
            run.steps_taken()
        );
        tracing::info!(task_id = %run.id, status = %status, steps = run.steps_taken(), "Run finished");

        self.save_session(&run);
        self.control.release(&run.id);
        if let Some(mailbox) = &self.mailbox {
            mailbox.close(&run.id, &format!("Task {} has finished", run.id));
        }

        let history = run.into_history();
        if let Some(renderer) = &self.renderer
            && let Err(e) = renderer.render(&history)
        {
            warn!("Failed to render history for task {}: {}", history.task_id, e);
        }
        history
    }
}
