//! Pause/resume/stop signaling per task
//!
//! ControlPlane is shared by the run loop and every out-of-band actor
//! (console, keyboard thread, extension server). All methods except
//! `await_if_paused` are synchronous so plain threads can call them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info};
use tokio::sync::Notify;

/// Per-task signal state
#[derive(Debug)]
struct ControlSignal {
    paused: bool,
    /// Monotonic for the lifetime of the run
    stop_requested: bool,
    wake: Arc<Notify>,
}

impl ControlSignal {
    fn new() -> Self {
        Self {
            paused: false,
            stop_requested: false,
            wake: Arc::new(Notify::new()),
        }
    }
}

/// Read-only view of a task's control state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlStatus {
    pub paused: bool,
    pub stop_requested: bool,
}

/// Process-wide pause/resume/stop signaling keyed by task id.
#[derive(Debug, Default)]
pub struct ControlPlane {
    signals: Mutex<HashMap<String, ControlSignal>>,
}

impl ControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ControlSignal>> {
        // A poisoned map still holds consistent booleans
        self.signals.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark stop requested. Idempotent; also releases a paused waiter so it can observe the stop.
    pub fn request_stop(&self, task_id: &str) {
        let mut signals = self.lock();
        let signal = signals.entry(task_id.to_string()).or_insert_with(ControlSignal::new);
        if !signal.stop_requested {
            info!("Stop requested for task {}", task_id);
        }
        signal.stop_requested = true;
        signal.wake.notify_waiters();
    }

    /// Request a pause at the next safe point. Returns false if already paused.
    pub fn request_pause(&self, task_id: &str) -> bool {
        let mut signals = self.lock();
        let signal = signals.entry(task_id.to_string()).or_insert_with(ControlSignal::new);
        if signal.paused {
            return false;
        }
        info!("Requested pause for task {}", task_id);
        signal.paused = true;
        true
    }

    /// Clear a pause and wake the waiter. Returns false if not paused.
    pub fn resume(&self, task_id: &str) -> bool {
        let mut signals = self.lock();
        match signals.get_mut(task_id) {
            Some(signal) if signal.paused => {
                info!("Resuming task {}", task_id);
                signal.paused = false;
                signal.wake.notify_waiters();
                true
            }
            _ => false,
        }
    }

    /// Flip between paused and running. Returns the new paused state.
    pub fn toggle_pause(&self, task_id: &str) -> bool {
        if self.is_paused(task_id) {
            self.resume(task_id);
            false
        } else {
            self.request_pause(task_id);
            true
        }
    }

    /// Suspend until resumed (or stopped) if the task is paused. Call only at safe points.
    pub async fn await_if_paused(&self, task_id: &str) {
        let mut announced = false;
        loop {
            let wake = {
                let signals = self.lock();
                match signals.get(task_id) {
                    Some(signal) if signal.paused && !signal.stop_requested => Arc::clone(&signal.wake),
                    _ => break,
                }
            };

            if !announced {
                info!("Task {} paused - waiting for resume signal", task_id);
                announced = true;
            }

            let notified = wake.notified();
            tokio::pin!(notified);
            // Register interest before re-checking so a resume in between is not lost
            notified.as_mut().enable();

            let still_paused = {
                let signals = self.lock();
                signals
                    .get(task_id)
                    .is_some_and(|s| s.paused && !s.stop_requested)
            };
            if !still_paused {
                break;
            }
            notified.await;
        }

        if announced {
            info!("Task {} continuing execution", task_id);
        }
    }

    pub fn is_paused(&self, task_id: &str) -> bool {
        self.lock().get(task_id).is_some_and(|s| s.paused)
    }

    pub fn is_stop_requested(&self, task_id: &str) -> bool {
        self.lock().get(task_id).is_some_and(|s| s.stop_requested)
    }

    /// Snapshot of both flags; untracked tasks report neither.
    pub fn status(&self, task_id: &str) -> ControlStatus {
        self.lock()
            .get(task_id)
            .map(|s| ControlStatus {
                paused: s.paused,
                stop_requested: s.stop_requested,
            })
            .unwrap_or(ControlStatus {
                paused: false,
                stop_requested: false,
            })
    }

    /// Task ids currently tracked
    pub fn tracked(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drop all state for a finished task
    pub fn release(&self, task_id: &str) {
        if self.lock().remove(task_id).is_some() {
            debug!("Released control state for task {}", task_id);
        }
    }
}
