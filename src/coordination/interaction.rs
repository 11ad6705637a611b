//! Human interaction bridge
//!
//! Correlates "ask the human" requests with responses that may arrive from any
//! number of independent actors (console, extension socket, UI). The first
//! delivery for a request id wins; later ones are dropped with a warning.
//! Every request is bounded by a timeout, so a silent human never blocks the
//! run forever.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};

use crate::error::{PilotError, Result};
use crate::id::generate_request_id;

/// Resolved request ids remembered for reuse detection
const RECENT_IDS: usize = 256;

/// Kind of help being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    TextInput,
    Confirmation,
    Login,
    Selection,
    Custom,
}

impl InteractionKind {
    /// Kinds answered with a yes/no
    pub fn is_confirmation(&self) -> bool {
        matches!(self, InteractionKind::Confirmation | InteractionKind::Login)
    }
}

/// A question for the human operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRequest {
    pub request_id: String,
    pub kind: InteractionKind,
    pub prompt: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl InteractionRequest {
    pub fn new(kind: InteractionKind, prompt: impl Into<String>) -> Self {
        Self {
            request_id: generate_request_id(),
            kind,
            prompt: prompt.into(),
            description: String::new(),
            options: Vec::new(),
            metadata: Value::Null,
            required: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// The human's answer (or a cancellation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionResponse {
    pub request_id: String,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub cancelled: bool,
}

impl InteractionResponse {
    pub fn cancelled(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            response: None,
            cancelled: true,
        }
    }

    /// True for a non-cancelled affirmative answer.
    ///
    /// Accepts `{"confirmed": true}`, `true`, and yes-like strings.
    pub fn is_confirmed(&self) -> bool {
        if self.cancelled {
            return false;
        }
        match &self.response {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => is_affirmative(s),
            Some(Value::Object(map)) => map.get("confirmed").and_then(Value::as_bool).unwrap_or(false),
            _ => false,
        }
    }
}

/// Console-style yes answers
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "yes" | "y" | "true" | "t" | "1")
}

/// Invoked with the payload before the waiter wakes; errors are logged only.
pub type CompletionCallback = Box<dyn FnOnce(Option<&Value>) -> Result<()> + Send>;

struct PendingEntry {
    request: InteractionRequest,
    reply: oneshot::Sender<InteractionResponse>,
    callback: Option<CompletionCallback>,
}

/// Correlates interaction requests with responses across concurrent actors.
pub struct InteractionBridge {
    pending: Mutex<HashMap<String, PendingEntry>>,
    recent: Mutex<VecDeque<String>>,
    announce: broadcast::Sender<InteractionRequest>,
    dropped: AtomicU64,
}

impl Default for InteractionBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionBridge {
    pub fn new() -> Self {
        let (announce, _) = broadcast::channel(64);
        Self {
            pending: Mutex::new(HashMap::new()),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_IDS)),
            announce,
            dropped: AtomicU64::new(0),
        }
    }

    fn pending_lock(&self) -> MutexGuard<'_, HashMap<String, PendingEntry>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn recent_lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.recent.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remove a pending entry, remembering its id. Lock order: pending, then recent.
    fn take_pending(&self, request_id: &str) -> Option<PendingEntry> {
        let mut pending = self.pending_lock();
        let entry = pending.remove(request_id)?;
        let mut recent = self.recent_lock();
        if recent.len() == RECENT_IDS {
            recent.pop_front();
        }
        recent.push_back(request_id.to_string());
        Some(entry)
    }

    /// Subscribe to newly registered requests (for responders that render them).
    pub fn subscribe(&self) -> broadcast::Receiver<InteractionRequest> {
        self.announce.subscribe()
    }

    /// Register a request and wait for its response or the timeout.
    pub async fn submit(&self, request: InteractionRequest, timeout: Duration) -> Result<InteractionResponse> {
        self.submit_with_callback(request, None, timeout).await
    }

    /// Like `submit`, running `callback` with the payload when a non-cancelled response arrives.
    pub async fn submit_with_callback(
        &self,
        request: InteractionRequest,
        callback: Option<CompletionCallback>,
        timeout: Duration,
    ) -> Result<InteractionResponse> {
        let request_id = request.request_id.clone();
        let (reply, mut rx) = oneshot::channel();
        {
            let mut pending = self.pending_lock();
            if pending.contains_key(&request_id) || self.recent_lock().contains(&request_id) {
                return Err(PilotError::Interaction(format!("Request id reused: {}", request_id)));
            }
            pending.insert(
                request_id.clone(),
                PendingEntry {
                    request: request.clone(),
                    reply,
                    callback,
                },
            );
        }

        info!("Requesting user interaction: {}", request.prompt);
        // No subscribers is fine; responders may also poll pending_requests()
        let _ = self.announce.send(request);

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                self.take_pending(&request_id);
                Ok(InteractionResponse::cancelled(request_id))
            }
            Err(_) => {
                let still_pending = self.take_pending(&request_id).is_some();
                if still_pending {
                    warn!("User interaction {} timed out after {:?}", request_id, timeout);
                    return Ok(InteractionResponse::cancelled(request_id));
                }
                // A fulfill won the race with the timer; honour the delivered answer
                Ok(rx
                    .try_recv()
                    .unwrap_or_else(|_| InteractionResponse::cancelled(request_id)))
            }
        }
    }

    /// Deliver a response. Returns true if it was the first delivery for a pending request.
    pub fn fulfill(&self, request_id: &str, payload: Option<Value>, cancelled: bool) -> bool {
        let Some(entry) = self.take_pending(request_id) else {
            self.dropped.fetch_add(1, Ordering::SeqCst);
            warn!("Dropping response for unknown or already resolved request {}", request_id);
            return false;
        };

        if let Some(callback) = entry.callback.filter(|_| !cancelled)
            && let Err(e) = callback(payload.as_ref())
        {
            error!("Error in interaction callback for {}: {}", request_id, e);
        }

        let response = InteractionResponse {
            request_id: request_id.to_string(),
            response: payload,
            cancelled,
        };
        if entry.reply.send(response).is_err() {
            warn!("Requester for {} went away before the response arrived", request_id);
        }
        true
    }

    /// Cancel a pending request
    pub fn cancel(&self, request_id: &str) -> bool {
        self.fulfill(request_id, None, true)
    }

    /// Currently outstanding requests, oldest id order not guaranteed
    pub fn pending_requests(&self) -> Vec<InteractionRequest> {
        self.pending_lock().values().map(|e| e.request.clone()).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending_lock().len()
    }

    pub fn is_pending(&self, request_id: &str) -> bool {
        self.pending_lock().contains_key(request_id)
    }

    /// Number of deliveries dropped because the request was unknown or resolved
    pub fn dropped_deliveries(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }
}
