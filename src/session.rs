//! Session facade
//!
//! Wires the shared coordination primitives and the operator surfaces around
//! one RunLoop. Surfaces are torn down once the run reaches a terminal state.

use std::sync::Arc;

use log::{info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::console::{Console, Dispatcher, KeyboardListener, spawn_stdin_reader};
use crate::coordination::{CommandMailbox, ControlPlane, InteractionBridge};
use crate::domain::{RunHistory, TaskRun};
use crate::ipc::{ControlServer, ControlServerConfig, MessageRouter};
use crate::runner::{Collaborators, HistoryRenderer, OutputValidator, RunLoop, StepOrchestrator};
use crate::storage::SessionStore;

/// Which operator surfaces to start around a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Surfaces {
    pub control_server: bool,
    pub console: bool,
    pub keyboard: bool,
}

impl Surfaces {
    pub fn from_config(config: &Config) -> Self {
        Self {
            control_server: true,
            console: config.control.console,
            keyboard: config.control.keyboard_shortcuts,
        }
    }

    /// No listeners at all, for embedding and tests
    pub fn none() -> Self {
        Self {
            control_server: false,
            console: false,
            keyboard: false,
        }
    }
}

/// Handles to the surfaces started for one run
struct RunningSurfaces {
    server: Option<(mpsc::Sender<()>, JoinHandle<()>)>,
    console: Option<(mpsc::Sender<()>, JoinHandle<()>)>,
    keyboard: Option<KeyboardListener>,
}

pub struct PilotSession {
    config: Config,
    control: Arc<ControlPlane>,
    bridge: Arc<InteractionBridge>,
    mailbox: Arc<CommandMailbox>,
    validator: Option<Arc<dyn OutputValidator>>,
    renderer: Option<Arc<dyn HistoryRenderer>>,
    system_prompt: Option<String>,
    surfaces: Surfaces,
}

impl PilotSession {
    pub fn new(config: Config) -> Self {
        let surfaces = Surfaces::from_config(&config);
        Self {
            config,
            control: Arc::new(ControlPlane::new()),
            bridge: Arc::new(InteractionBridge::new()),
            mailbox: Arc::new(CommandMailbox::new()),
            validator: None,
            renderer: None,
            system_prompt: None,
            surfaces,
        }
    }

    pub fn with_surfaces(mut self, surfaces: Surfaces) -> Self {
        self.surfaces = surfaces;
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

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn control(&self) -> &Arc<ControlPlane> {
        &self.control
    }

    pub fn bridge(&self) -> &Arc<InteractionBridge> {
        &self.bridge
    }

    pub fn mailbox(&self) -> &Arc<CommandMailbox> {
        &self.mailbox
    }

    /// A fresh run using the configured step budget
    pub fn new_run(&self, task: impl Into<String>) -> TaskRun {
        TaskRun::new(task, self.config.agent.max_steps)
    }

    /// Drive one run to completion with the operator surfaces attached.
    pub async fn run(&self, run: TaskRun, collaborators: Collaborators) -> RunHistory {
        let task_id = run.id.clone();
        let surfaces = self.start_surfaces(&task_id).await;

        let mut orchestrator = StepOrchestrator::new(collaborators, Arc::clone(&self.bridge), &self.config);
        if let Some(prompt) = &self.system_prompt {
            orchestrator = orchestrator.with_system_prompt(prompt.clone());
        }

        let mut run_loop =
            RunLoop::new(orchestrator, Arc::clone(&self.control), &self.config).with_mailbox(Arc::clone(&self.mailbox));
        if let Some(validator) = &self.validator {
            run_loop = run_loop.with_validator(Arc::clone(validator));
        }
        if let Some(renderer) = &self.renderer {
            run_loop = run_loop.with_renderer(Arc::clone(renderer));
        }
        if self.config.storage.persist_sessions {
            run_loop = run_loop.with_session_store(SessionStore::new(self.config.storage.sessions_dir.clone()));
        }

        let history = run_loop.run(run).await;
        self.stop_surfaces(surfaces).await;
        info!("Session for {} finished: {}", task_id, history.status);
        history
    }

    async fn start_surfaces(&self, task_id: &str) -> RunningSurfaces {
        let mut running = RunningSurfaces {
            server: None,
            console: None,
            keyboard: None,
        };
        let dispatcher = Dispatcher::new(Arc::clone(&self.control), task_id);

        if self.surfaces.control_server {
            let router = MessageRouter::new(
                Arc::clone(&self.control),
                Arc::clone(&self.bridge),
                Arc::clone(&self.mailbox),
            );
            let server = Arc::new(ControlServer::new(ControlServerConfig::from(&self.config.control), router));
            match server.bind().await {
                Ok(listener) => {
                    let (tx, rx) = mpsc::channel(1);
                    let handle = tokio::spawn(async move {
                        if let Err(e) = server.serve(listener, rx).await {
                            warn!("Control server stopped: {}", e);
                        }
                    });
                    running.server = Some((tx, handle));
                }
                Err(e) => warn!("Control server unavailable, continuing without it: {}", e),
            }
        }

        if self.surfaces.keyboard {
            match KeyboardListener::spawn(dispatcher.clone()) {
                Ok(listener) => running.keyboard = Some(listener),
                Err(e) => warn!("Keyboard shortcuts unavailable: {}", e),
            }
        }

        // Raw mode owns the terminal while shortcuts are active
        if self.surfaces.console && running.keyboard.is_none() {
            let console = Console::new(dispatcher, Arc::clone(&self.bridge));
            let lines = spawn_stdin_reader();
            let (tx, rx) = mpsc::channel(1);
            let handle = tokio::spawn(console.run(lines, rx));
            running.console = Some((tx, handle));
        }

        running
    }

    async fn stop_surfaces(&self, surfaces: RunningSurfaces) {
        for (shutdown, handle) in [surfaces.server, surfaces.console].into_iter().flatten() {
            let _ = shutdown.send(()).await;
            if let Err(e) = handle.await {
                warn!("Surface task ended abnormally: {}", e);
            }
        }
        if let Some(keyboard) = surfaces.keyboard
            && let Err(e) = tokio::task::spawn_blocking(move || keyboard.shutdown()).await
        {
            warn!("Keyboard listener shutdown failed: {}", e);
        }
    }
}
