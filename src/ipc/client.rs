//! Control client used by the CLI.
//!
//! One short-lived TCP connection per request: write one message, read lines
//! until the reply arrives, skipping interaction broadcasts.

use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::{PilotError, Result};
use crate::ipc::messages::{InboundMessage, OutboundMessage};

/// Configuration for the control client.
#[derive(Debug, Clone)]
pub struct ControlClientConfig {
    /// Server address
    pub addr: String,
    /// Request timeout
    pub request_timeout: Duration,
}

impl Default for ControlClientConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:7789".to_string(),
            request_timeout: Duration::from_secs(35),
        }
    }
}

pub struct ControlClient {
    config: ControlClientConfig,
}

impl ControlClient {
    pub fn new(config: ControlClientConfig) -> Self {
        Self { config }
    }

    /// Create client for an address with the default timeout.
    pub fn with_addr(addr: impl Into<String>) -> Self {
        Self::new(ControlClientConfig {
            addr: addr.into(),
            ..Default::default()
        })
    }

    pub fn addr(&self) -> &str {
        &self.config.addr
    }

    /// Send a message and wait for its reply.
    pub async fn request(&self, message: &InboundMessage) -> Result<OutboundMessage> {
        let timeout = self.config.request_timeout;
        tokio::time::timeout(timeout, self.exchange(message))
            .await
            .map_err(|_| PilotError::Timeout(format!("no reply from {} within {:?}", self.config.addr, timeout)))?
    }

    async fn exchange(&self, message: &InboundMessage) -> Result<OutboundMessage> {
        let stream = TcpStream::connect(self.config.addr.as_str()).await?;
        let (reader, mut writer) = stream.into_split();

        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let reply: OutboundMessage = serde_json::from_str(&line)
                .map_err(|e| PilotError::Parse(format!("unexpected reply from server: {}", e)))?;
            if !reply.is_broadcast() {
                return Ok(reply);
            }
        }
        Err(PilotError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "server closed the connection without replying",
        )))
    }

    pub async fn ping(&self) -> Result<OutboundMessage> {
        self.request(&InboundMessage::ping(json!(crate::id::now_ms()))).await
    }

    pub async fn control(&self, agent_id: &str, command: &str) -> Result<OutboundMessage> {
        self.request(&InboundMessage::control(agent_id, command)).await
    }

    pub async fn respond(&self, request_id: &str, response: Option<Value>, cancelled: bool) -> Result<OutboundMessage> {
        self.request(&InboundMessage::InteractionResponse {
            request_id: request_id.to_string(),
            response,
            cancelled,
        })
        .await
    }

    pub async fn pending(&self) -> Result<OutboundMessage> {
        self.request(&InboundMessage::PendingRequests {}).await
    }

    pub async fn command(&self, agent_id: &str, command: &str, params: Value) -> Result<OutboundMessage> {
        self.request(&InboundMessage::AgentCommand {
            agent_id: agent_id.to_string(),
            command: command.to_string(),
            params,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::{CommandMailbox, ControlPlane, InteractionBridge};
    use crate::ipc::server::{ControlServer, ControlServerConfig, MessageRouter};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    async fn start_server(control: Arc<ControlPlane>) -> (String, mpsc::Sender<()>) {
        let router = MessageRouter::new(
            control,
            Arc::new(InteractionBridge::new()),
            Arc::new(CommandMailbox::new()),
        );
        let server = Arc::new(ControlServer::new(
            ControlServerConfig {
                listen_addr: "127.0.0.1:0".to_string(),
                max_clients: 4,
            },
            router,
        ));
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move { server.serve(listener, rx).await });
        (addr, tx)
    }

    #[tokio::test]
    async fn test_ping_and_control() {
        let control = Arc::new(ControlPlane::new());
        let (addr, _shutdown) = start_server(Arc::clone(&control)).await;
        let client = ControlClient::with_addr(addr);

        assert!(matches!(client.ping().await.unwrap(), OutboundMessage::Pong { .. }));
        let reply = client.control("agent-1", "pause").await.unwrap();
        assert_eq!(reply, OutboundMessage::control_result("pause", "agent-1", true));
        assert!(control.is_paused("agent-1"));
    }

    #[tokio::test]
    async fn test_respond_to_unknown_request() {
        let (addr, _shutdown) = start_server(Arc::new(ControlPlane::new())).await;
        let client = ControlClient::with_addr(addr);
        let reply = client.respond("req_missing", Some(json!(true)), false).await.unwrap();
        assert_eq!(
            reply,
            OutboundMessage::InteractionAck {
                request_id: "req_missing".into(),
                delivered: false
            }
        );
    }

    #[tokio::test]
    async fn test_connect_failure_is_error() {
        let client = ControlClient::new(ControlClientConfig {
            addr: "127.0.0.1:1".to_string(),
            request_timeout: Duration::from_secs(2),
        });
        assert!(client.ping().await.is_err());
    }
}
