//! Extension channel message types.
//!
//! Newline-delimited JSON objects discriminated by a `type` field. Inbound
//! messages come from the browser extension (or the CLI); outbound messages
//! are replies plus broadcast interaction requests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coordination::InteractionRequest;

/// Message types the server understands
pub const INBOUND_TYPES: [&str; 5] = [
    "agent_control",
    "ping",
    "interaction_response",
    "pending_requests",
    "agent_command",
];

/// Message received from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Pause, resume or query a running agent
    AgentControl {
        #[serde(default)]
        command: Option<String>,
        #[serde(default)]
        agent_id: Option<String>,
    },
    /// Liveness check, echoed back as pong
    Ping {
        #[serde(default)]
        timestamp: Option<Value>,
    },
    /// Answer to an interaction request
    InteractionResponse {
        request_id: String,
        #[serde(default)]
        response: Option<Value>,
        #[serde(default)]
        cancelled: bool,
    },
    /// List outstanding interaction requests
    PendingRequests {},
    /// Queue a mailbox command for an agent and wait for its result
    AgentCommand {
        agent_id: String,
        command: String,
        #[serde(default)]
        params: Value,
    },
}

impl InboundMessage {
    pub fn control(agent_id: impl Into<String>, command: impl Into<String>) -> Self {
        InboundMessage::AgentControl {
            command: Some(command.into()),
            agent_id: Some(agent_id.into()),
        }
    }

    pub fn ping(timestamp: Value) -> Self {
        InboundMessage::Ping {
            timestamp: Some(timestamp),
        }
    }
}

/// Message sent to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    ControlResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
        /// "paused" or "running" for status queries
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Pong {
        #[serde(default)]
        timestamp: Option<Value>,
    },
    InteractionAck {
        request_id: String,
        delivered: bool,
    },
    PendingRequests {
        requests: Vec<InteractionRequest>,
    },
    /// Broadcast for every newly registered request
    #[serde(rename = "interaction_request")]
    InteractionAnnounced {
        request: InteractionRequest,
    },
    CommandResult {
        agent_id: String,
        command: String,
        result: Value,
    },
}

impl OutboundMessage {
    /// Result of a pause/resume
    pub fn control_result(command: &str, agent_id: &str, success: bool) -> Self {
        OutboundMessage::ControlResponse {
            command: Some(command.to_string()),
            agent_id: Some(agent_id.to_string()),
            success: Some(success),
            status: None,
            error: None,
        }
    }

    pub fn control_status(agent_id: &str, paused: bool) -> Self {
        OutboundMessage::ControlResponse {
            command: Some("status".to_string()),
            agent_id: Some(agent_id.to_string()),
            success: None,
            status: Some(if paused { "paused" } else { "running" }.to_string()),
            error: None,
        }
    }

    pub fn control_error(command: Option<String>, agent_id: Option<String>, error: impl Into<String>) -> Self {
        OutboundMessage::ControlResponse {
            command,
            agent_id,
            success: Some(false),
            status: None,
            error: Some(error.into()),
        }
    }

    /// Broadcasts are not replies to any request
    pub fn is_broadcast(&self) -> bool {
        matches!(self, OutboundMessage::InteractionAnnounced { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_agent_control() {
        let msg: InboundMessage =
            serde_json::from_value(json!({"type": "agent_control", "command": "pause", "agent_id": "a1"})).unwrap();
        assert_eq!(msg, InboundMessage::control("a1", "pause"));
    }

    #[test]
    fn test_agent_control_without_agent_id_parses() {
        let msg: InboundMessage = serde_json::from_value(json!({"type": "agent_control", "command": "pause"})).unwrap();
        assert!(matches!(msg, InboundMessage::AgentControl { agent_id: None, .. }));
    }

    #[test]
    fn test_pending_requests_without_fields() {
        let msg: InboundMessage = serde_json::from_value(json!({"type": "pending_requests"})).unwrap();
        assert_eq!(msg, InboundMessage::PendingRequests {});
    }

    #[test]
    fn test_control_status_shape() {
        let value = serde_json::to_value(OutboundMessage::control_status("a1", true)).unwrap();
        assert_eq!(
            value,
            json!({"type": "control_response", "command": "status", "agent_id": "a1", "status": "paused"})
        );
    }

    #[test]
    fn test_unknown_command_shape() {
        let value = serde_json::to_value(OutboundMessage::control_error(
            Some("explode".into()),
            None,
            "Unknown command",
        ))
        .unwrap();
        assert_eq!(
            value,
            json!({"type": "control_response", "command": "explode", "success": false, "error": "Unknown command"})
        );
    }

    #[test]
    fn test_pong_echoes_timestamp() {
        let value = serde_json::to_value(OutboundMessage::Pong {
            timestamp: Some(json!(1738300800)),
        })
        .unwrap();
        assert_eq!(value, json!({"type": "pong", "timestamp": 1738300800}));
    }

    #[test]
    fn test_announce_type_name() {
        let request = InteractionRequest::new(crate::coordination::InteractionKind::Login, "Please login to Github");
        let value = serde_json::to_value(OutboundMessage::InteractionAnnounced { request }).unwrap();
        assert_eq!(value["type"], "interaction_request");
        assert_eq!(value["request"]["kind"], "login");
    }
}
