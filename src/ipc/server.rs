//! Extension control server
//!
//! Provides:
//! - TCP listener speaking newline-delimited JSON
//! - Message routing into the ControlPlane, InteractionBridge and CommandMailbox
//! - Broadcast of newly registered interaction requests to every client
//!
//! Errors stay inside the connection that caused them; the run loop never
//! sees a malformed message.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, broadcast, mpsc};

use crate::config::ControlConfig;
use crate::coordination::{CommandMailbox, ControlPlane, InteractionBridge, InteractionRequest};
use crate::error::{PilotError, Result};
use crate::ipc::messages::{INBOUND_TYPES, InboundMessage, OutboundMessage};

/// How long an `agent_command` waits for the run loop's safe point
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Deferred replies buffered per connection
const CLIENT_QUEUE_DEPTH: usize = 32;

/// Configuration for the control server
#[derive(Debug, Clone)]
pub struct ControlServerConfig {
    /// Address to listen on
    pub listen_addr: String,
    /// Maximum number of concurrent clients
    pub max_clients: usize,
}

impl Default for ControlServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7789".to_string(),
            max_clients: 16,
        }
    }
}

impl From<&ControlConfig> for ControlServerConfig {
    fn from(config: &ControlConfig) -> Self {
        Self {
            listen_addr: config.listen_addr.clone(),
            max_clients: config.max_clients,
        }
    }
}

/// Routes inbound messages to the coordination primitives.
#[derive(Clone)]
pub struct MessageRouter {
    control: Arc<ControlPlane>,
    bridge: Arc<InteractionBridge>,
    mailbox: Arc<CommandMailbox>,
}

impl MessageRouter {
    pub fn new(control: Arc<ControlPlane>, bridge: Arc<InteractionBridge>, mailbox: Arc<CommandMailbox>) -> Self {
        Self {
            control,
            bridge,
            mailbox,
        }
    }

    /// Handle one raw line. Returns the reply to send, if any.
    ///
    /// Waits for command replies inline; connections use `route_deferred`.
    pub async fn route(&self, line: &str) -> Option<OutboundMessage> {
        let message = parse_inbound(line)?;
        self.handle(message).await
    }

    /// Handle one raw line for a connection.
    ///
    /// Commands wait for the run loop's safe point in their own task and
    /// answer later through `replies`, so the connection keeps serving pings,
    /// interaction responses and announcements meanwhile.
    pub async fn route_deferred(&self, line: &str, replies: &mpsc::Sender<OutboundMessage>) -> Option<OutboundMessage> {
        match parse_inbound(line)? {
            InboundMessage::AgentCommand {
                agent_id,
                command,
                params,
            } => {
                let pending = self.mailbox.post(&agent_id, command.clone(), params);
                let replies = replies.clone();
                tokio::spawn(async move {
                    let result = pending.wait(COMMAND_TIMEOUT).await;
                    let reply = OutboundMessage::CommandResult {
                        agent_id,
                        command,
                        result,
                    };
                    if replies.send(reply).await.is_err() {
                        debug!("Client left before its command was answered");
                    }
                });
                None
            }
            message => self.handle(message).await,
        }
    }

    pub async fn handle(&self, message: InboundMessage) -> Option<OutboundMessage> {
        match message {
            InboundMessage::Ping { timestamp } => Some(OutboundMessage::Pong { timestamp }),
            InboundMessage::AgentControl { command, agent_id } => Some(self.agent_control(command, agent_id)),
            InboundMessage::InteractionResponse {
                request_id,
                response,
                cancelled,
            } => {
                let delivered = self.bridge.fulfill(&request_id, response, cancelled);
                Some(OutboundMessage::InteractionAck { request_id, delivered })
            }
            InboundMessage::PendingRequests {} => Some(OutboundMessage::PendingRequests {
                requests: self.bridge.pending_requests(),
            }),
            InboundMessage::AgentCommand {
                agent_id,
                command,
                params,
            } => {
                let pending = self.mailbox.post(&agent_id, command.clone(), params);
                let result = pending.wait(COMMAND_TIMEOUT).await;
                Some(OutboundMessage::CommandResult {
                    agent_id,
                    command,
                    result,
                })
            }
        }
    }

    fn agent_control(&self, command: Option<String>, agent_id: Option<String>) -> OutboundMessage {
        let Some(agent_id) = agent_id else {
            warn!("Agent control message missing agent_id");
            return OutboundMessage::control_error(command, None, "Missing agent_id");
        };

        match command.as_deref() {
            Some("pause") => OutboundMessage::control_result("pause", &agent_id, self.control.request_pause(&agent_id)),
            Some("resume") => OutboundMessage::control_result("resume", &agent_id, self.control.resume(&agent_id)),
            Some("status") => OutboundMessage::control_status(&agent_id, self.control.is_paused(&agent_id)),
            other => {
                let err = PilotError::UnknownCommand(other.unwrap_or("<none>").to_string());
                warn!("Unknown agent control command: {}", err);
                OutboundMessage::control_error(command, Some(agent_id), "Unknown command")
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<InteractionRequest> {
        self.bridge.subscribe()
    }
}

fn parse_inbound(line: &str) -> Option<InboundMessage> {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(_) => {
            warn!("Invalid JSON received: {}", truncate(line, 100));
            return None;
        }
    };

    let Some(message_type) = value.get("type").and_then(Value::as_str).map(str::to_string) else {
        warn!("Invalid message format: {}", truncate(line, 100));
        return None;
    };
    if !INBOUND_TYPES.contains(&message_type.as_str()) {
        debug!("No handler for message type: {}", message_type);
        return None;
    }

    match serde_json::from_value::<InboundMessage>(value) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!("Malformed {} message: {}", message_type, e);
            None
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Connected client state
#[derive(Debug)]
struct ClientState {
    peer: SocketAddr,
}

/// TCP server for the browser extension and the CLI
pub struct ControlServer {
    config: ControlServerConfig,
    router: MessageRouter,
    clients: Arc<RwLock<HashMap<u64, ClientState>>>,
    next_client_id: AtomicU64,
}

impl ControlServer {
    pub fn new(config: ControlServerConfig, router: MessageRouter) -> Self {
        Self {
            config,
            router,
            clients: Arc::new(RwLock::new(HashMap::new())),
            next_client_id: AtomicU64::new(1),
        }
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.listen_addr.as_str()).await?;
        info!("Control server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Get count of connected clients
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Accept clients until shutdown is signalled
    pub async fn serve(&self, listener: TcpListener, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            if self.client_count().await >= self.config.max_clients {
                                warn!("Rejecting client {} - at capacity", peer);
                                continue;
                            }

                            let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
                            self.clients.write().await.insert(client_id, ClientState { peer });
                            info!("Client {} connected from {}", client_id, peer);

                            let router = self.router.clone();
                            let clients = Arc::clone(&self.clients);
                            let announcements = self.router.subscribe();
                            tokio::spawn(async move {
                                if let Err(e) = handle_client(stream, client_id, router, announcements).await {
                                    debug!("Client {} closed with error: {}", client_id, e);
                                }
                                if let Some(state) = clients.write().await.remove(&client_id) {
                                    info!("Client {} ({}) disconnected", client_id, state.peer);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Control server shutting down");
                    break;
                }
            }
        }
        Ok(())
    }
}

async fn write_message(writer: &mut tokio::net::tcp::OwnedWriteHalf, message: &OutboundMessage) -> Result<()> {
    let mut json = serde_json::to_string(message)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    Ok(())
}

/// Handle a single client connection
async fn handle_client(
    stream: TcpStream,
    client_id: u64,
    router: MessageRouter,
    mut announcements: broadcast::Receiver<InteractionRequest>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    // next_line is cancel safe inside select!
    let mut lines = BufReader::new(reader).lines();
    let (reply_tx, mut reply_rx) = mpsc::channel::<OutboundMessage>(CLIENT_QUEUE_DEPTH);

    loop {
        tokio::select! {
            read_result = lines.next_line() => {
                match read_result {
                    Ok(None) => break,
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty()
                            && let Some(reply) = router.route_deferred(trimmed, &reply_tx).await
                        {
                            write_message(&mut writer, &reply).await?;
                        }
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Some(reply) = reply_rx.recv() => {
                write_message(&mut writer, &reply).await?;
            }
            announce_result = announcements.recv() => {
                match announce_result {
                    Ok(request) => {
                        write_message(&mut writer, &OutboundMessage::InteractionAnnounced { request }).await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Client {} missed {} interaction announcements", client_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::InteractionKind;
    use serde_json::json;

    fn router() -> MessageRouter {
        MessageRouter::new(
            Arc::new(ControlPlane::new()),
            Arc::new(InteractionBridge::new()),
            Arc::new(CommandMailbox::new()),
        )
    }

    #[tokio::test]
    async fn test_ping() {
        let reply = router().route(r#"{"type": "ping", "timestamp": 42}"#).await;
        assert_eq!(reply, Some(OutboundMessage::Pong { timestamp: Some(json!(42)) }));
    }

    #[tokio::test]
    async fn test_pause_resume_status() {
        let router = router();
        let reply = router
            .route(r#"{"type": "agent_control", "command": "pause", "agent_id": "a1"}"#)
            .await;
        assert_eq!(reply, Some(OutboundMessage::control_result("pause", "a1", true)));
        assert!(router.control.is_paused("a1"));

        let reply = router
            .route(r#"{"type": "agent_control", "command": "status", "agent_id": "a1"}"#)
            .await;
        assert_eq!(reply, Some(OutboundMessage::control_status("a1", true)));

        let reply = router
            .route(r#"{"type": "agent_control", "command": "resume", "agent_id": "a1"}"#)
            .await;
        assert_eq!(reply, Some(OutboundMessage::control_result("resume", "a1", true)));
        let reply = router
            .route(r#"{"type": "agent_control", "command": "resume", "agent_id": "a1"}"#)
            .await;
        assert_eq!(reply, Some(OutboundMessage::control_result("resume", "a1", false)));
    }

    #[tokio::test]
    async fn test_stop_is_not_a_remote_command() {
        let router = router();
        let reply = router
            .route(r#"{"type": "agent_control", "command": "stop", "agent_id": "a1"}"#)
            .await
            .unwrap();
        let value = serde_json::to_value(reply).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Unknown command");
        assert!(!router.control.is_stop_requested("a1"));
    }

    #[tokio::test]
    async fn test_missing_agent_id_fails() {
        let reply = router().route(r#"{"type": "agent_control", "command": "pause"}"#).await.unwrap();
        let value = serde_json::to_value(reply).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Missing agent_id");
    }

    #[tokio::test]
    async fn test_unknown_type_and_garbage_are_ignored() {
        let router = router();
        assert!(router.route(r#"{"type": "teleport"}"#).await.is_none());
        assert!(router.route("not json").await.is_none());
        assert!(router.route(r#"["no", "type"]"#).await.is_none());
        assert!(router.route(r#"{"type": "interaction_response"}"#).await.is_none());
    }

    #[tokio::test]
    async fn test_interaction_response_fulfills_bridge() {
        let router = router();
        let bridge = Arc::clone(&router.bridge);
        let request = InteractionRequest::new(InteractionKind::Confirmation, "Apply?");
        let id = request.request_id.clone();
        let mut announced = bridge.subscribe();
        let waiter = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.submit(request, Duration::from_secs(5)).await })
        };
        announced.recv().await.unwrap();

        let pending = router.route(r#"{"type": "pending_requests"}"#).await.unwrap();
        assert!(matches!(pending, OutboundMessage::PendingRequests { ref requests } if requests.len() == 1));

        let line = json!({"type": "interaction_response", "request_id": id, "response": true}).to_string();
        let ack = router.route(&line).await.unwrap();
        assert_eq!(
            ack,
            OutboundMessage::InteractionAck {
                request_id: id.clone(),
                delivered: true
            }
        );
        assert!(waiter.await.unwrap().unwrap().is_confirmed());

        let again = router.route(&line).await.unwrap();
        assert_eq!(
            again,
            OutboundMessage::InteractionAck {
                request_id: id,
                delivered: false
            }
        );
    }

    #[tokio::test]
    async fn test_server_round_trip_over_tcp() {
        let config = ControlServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            max_clients: 2,
        };
        let server = Arc::new(ControlServer::new(config, router()));
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let serving = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(listener, shutdown_rx).await })
        };

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(b"{\"type\": \"ping\", \"timestamp\": 7}\n").await.unwrap();
        let mut lines = BufReader::new(reader).lines();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply, json!({"type": "pong", "timestamp": 7}));

        shutdown_tx.send(()).await.unwrap();
        serving.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_waiting_command_does_not_block_the_connection() {
        let router = router();
        let mailbox = Arc::clone(&router.mailbox);
        let server = Arc::new(ControlServer::new(
            ControlServerConfig {
                listen_addr: "127.0.0.1:0".to_string(),
                max_clients: 2,
            },
            router,
        ));
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (_shutdown_tx, shutdown_rx) = mpsc::channel(1);
        tokio::spawn(async move { server.serve(listener, shutdown_rx).await });

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer
            .write_all(b"{\"type\":\"agent_command\",\"agent_id\":\"paused-task\",\"command\":\"status\"}\n")
            .await
            .unwrap();
        writer.write_all(b"{\"type\":\"ping\",\"timestamp\":1}\n").await.unwrap();

        let mut lines = BufReader::new(reader).lines();
        let first = tokio::time::timeout(Duration::from_secs(3), lines.next_line())
            .await
            .expect("pong while the command waits")
            .unwrap()
            .unwrap();
        let first: Value = serde_json::from_str(&first).unwrap();
        assert_eq!(first, json!({"type": "pong", "timestamp": 1}));

        // The command is answered on the same connection once drained
        assert_eq!(mailbox.queued("paused-task"), 1);
        for command in mailbox.drain("paused-task") {
            command.reply(json!({"status": "paused"}));
        }
        let second: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(second["type"], "command_result");
        assert_eq!(second["result"], json!({"status": "paused"}));
    }
}
