//! Action registry
//!
//! Maps an action's discriminator to the handler that performs it. New
//! action kinds register here without touching the orchestrator.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};

use crate::domain::{Action, ActionOutcome, ScrollDirection};
use crate::error::Result;
use crate::runner::{ActionExecutor, Environment};

/// Performs one kind of action
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, action: &Action, environment: &dyn Environment) -> Result<ActionOutcome>;
}

/// Discriminator -> handler table implementing the action-execution collaborator
#[derive(Default, Clone)]
pub struct ActionRegistry {
    handlers: HashMap<&'static str, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the handlers that only need the environment trait
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("scroll", Arc::new(ScrollHandler));
        registry.register("done", Arc::new(DoneHandler));
        registry
    }

    /// Register (or replace) the handler for a discriminator
    pub fn register(&mut self, name: &'static str, handler: Arc<dyn ActionHandler>) {
        if self.handlers.insert(name, handler).is_some() {
            debug!("Replaced handler for action '{}'", name);
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered discriminators, sorted
    pub fn registered(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    async fn execute_one(&self, action: &Action, environment: &dyn Environment) -> ActionOutcome {
        let Some(handler) = self.handlers.get(action.name()) else {
            warn!("No handler registered for action '{}'", action.name());
            return ActionOutcome::error(format!("Unknown action: {}", action.name()));
        };
        match handler.handle(action, environment).await {
            Ok(outcome) => outcome,
            Err(e) => ActionOutcome::error(format!("{} failed: {}", action.name(), e)),
        }
    }
}

#[async_trait]
impl ActionExecutor for ActionRegistry {
    /// Run actions in order, halting after one that finishes the task or fails.
    async fn execute(&self, actions: &[Action], environment: &dyn Environment) -> Result<Vec<ActionOutcome>> {
        let mut outcomes = Vec::with_capacity(actions.len());
        for action in actions {
            let outcome = self.execute_one(action, environment).await;
            let halt = outcome.is_done || outcome.is_error();
            outcomes.push(outcome);
            if halt {
                break;
            }
        }
        Ok(outcomes)
    }
}

/// Scrolls the active view through the environment
pub struct ScrollHandler;

#[async_trait]
impl ActionHandler for ScrollHandler {
    async fn handle(&self, action: &Action, environment: &dyn Environment) -> Result<ActionOutcome> {
        let Action::Scroll { direction, amount } = action else {
            return Ok(ActionOutcome::error(format!("scroll handler cannot run {}", action.name())));
        };
        let (dy, label) = match direction {
            ScrollDirection::Down => (*amount, "down"),
            ScrollDirection::Up => (-*amount, "up"),
        };
        environment.scroll_by(dy).await?;
        Ok(ActionOutcome::info(format!("Scrolled {} by {} pixels", label, amount)))
    }
}

/// Finishes the task with the oracle's answer
pub struct DoneHandler;

#[async_trait]
impl ActionHandler for DoneHandler {
    async fn handle(&self, action: &Action, _environment: &dyn Environment) -> Result<ActionOutcome> {
        match action {
            Action::Done { text } => Ok(ActionOutcome::done(text.clone())),
            other => Ok(ActionOutcome::error(format!("done handler cannot run {}", other.name()))),
        }
    }
}
