//! Page exploration gate
//!
//! Defers navigation until the current page has been scrolled through, so
//! the oracle does not leave a results page after seeing only the first
//! screen. Per run, keyed implicitly by the single active page.

use std::future::Future;
use std::time::Duration;

use log::{error, info};

use crate::config::ExplorationConfig;
use crate::domain::{Action, ActionOutcome, contains_navigation};
use crate::error::{PilotError, Result};

use super::collaborators::Environment;

/// Gate state for the current page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    /// More forced scrolling may be required before navigation
    Exploring,
    /// Navigation may proceed
    Saturated,
}

#[derive(Debug, Clone)]
pub struct ExplorationGate {
    enabled: bool,
    max_attempts: u32,
    tolerance: i64,
    overlap: i64,
    search_hint_steps: u32,
    scroll_timeout: Duration,
    scroll_attempts: u32,
    fully_explored: bool,
    last_location: Option<String>,
}

impl ExplorationGate {
    pub fn new(config: &ExplorationConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_scroll_attempts,
            tolerance: config.bottom_tolerance_px,
            overlap: config.scroll_overlap_px,
            search_hint_steps: config.search_hint_steps,
            scroll_timeout: config.scroll_timeout(),
            scroll_attempts: 0,
            fully_explored: false,
            last_location: None,
        }
    }

    pub fn phase(&self) -> GatePhase {
        if self.fully_explored || self.scroll_attempts >= self.max_attempts {
            GatePhase::Saturated
        } else {
            GatePhase::Exploring
        }
    }

    pub fn is_exploring(&self) -> bool {
        self.enabled && self.phase() == GatePhase::Exploring
    }

    pub fn scroll_attempts(&self) -> u32 {
        self.scroll_attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Record the observed location. Returns true if it changed and the gate was reset.
    pub fn observe(&mut self, location: &str) -> bool {
        let changed = self.last_location.as_deref().is_some_and(|last| last != location);
        self.last_location = Some(location.to_string());
        if changed {
            info!("Location changed to {} - resetting page exploration", location);
            self.scroll_attempts = 0;
            self.fully_explored = false;
        }
        changed
    }

    /// True when the proposed actions must be replaced by a forced scroll.
    pub fn should_defer(&self, actions: &[Action]) -> bool {
        self.is_exploring() && contains_navigation(actions)
    }

    /// Count oracle-chosen scrolls toward the exploration budget.
    pub fn note_voluntary_scrolls(&mut self, actions: &[Action]) {
        if !self.enabled || contains_navigation(actions) {
            return;
        }
        for _ in actions.iter().filter(|a| a.is_scroll()) {
            self.bump_attempts();
        }
        if self.phase() == GatePhase::Saturated && !self.fully_explored {
            info!("Page considered fully explored after multiple scrolls");
            self.fully_explored = true;
        }
    }

    fn bump_attempts(&mut self) {
        self.scroll_attempts = (self.scroll_attempts + 1).min(self.max_attempts);
    }

    /// Scroll one viewport (minus overlap) instead of navigating.
    ///
    /// Reads live metrics; if already near the bottom the page is marked explored
    /// without moving. Both browser calls share the scroll timeout. The attempt
    /// counter increments on every call, including failed ones, so the gate
    /// always saturates eventually.
    pub async fn force_scroll(&mut self, environment: &dyn Environment) -> ActionOutcome {
        info!(
            "Navigation attempted before full page exploration (attempt {}/{})",
            self.scroll_attempts + 1,
            self.max_attempts
        );

        let limit = self.scroll_timeout;
        let outcome = match bounded(limit, "reading scroll metrics", environment.scroll_metrics()).await {
            Ok(metrics) if metrics.near_bottom(self.tolerance) => {
                info!("Reached bottom of page, marking as fully explored");
                self.fully_explored = true;
                ActionOutcome::info("Finished exploring the page - reached the bottom")
            }
            Ok(metrics) => {
                let amount = metrics.page_step(self.overlap);
                match bounded(limit, "scrolling", environment.scroll_by(amount)).await {
                    Ok(()) => ActionOutcome::info(format!(
                        "Scrolled down by {} pixels to explore more of the page",
                        amount
                    )),
                    Err(e) => {
                        error!("Error during forced scroll: {}", e);
                        ActionOutcome::error(format!("Failed to scroll: {}", e))
                    }
                }
            }
            Err(e) => {
                error!("Error reading scroll metrics: {}", e);
                ActionOutcome::error(format!("Failed to scroll: {}", e))
            }
        };

        self.bump_attempts();
        if self.scroll_attempts >= self.max_attempts && !self.fully_explored {
            info!("Page considered fully explored after max scroll attempts");
            self.fully_explored = true;
        }
        outcome
    }

    /// Hints added to the next oracle turn
    pub fn hints(&self, location: &str, step: u32) -> Vec<String> {
        let mut hints = Vec::new();
        if self.is_exploring() {
            hints.push(
                "IMPORTANT: You should scroll down to explore the ENTIRE page before making decisions or navigating away. This ensures you don't miss crucial information."
                    .to_string(),
            );
        }
        if step <= self.search_hint_steps && location.to_lowercase().contains("search") {
            hints.push(
                "Remember: Search results often continue below the visible area. Consider scrolling down to see all results."
                    .to_string(),
            );
        }
        hints
    }
}

/// Bound a browser call by the forced-scroll timeout
async fn bounded<T>(limit: Duration, what: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(PilotError::Timeout(format!("{} after {:?}", what, limit))),
    }
}
