//! IPC Layer - TCP control channel for the browser extension and CLI
//!
//! This module provides:
//! - Message types for control, ping and interaction traffic
//! - Control server routing messages into the coordination primitives
//! - Client for the CLI

pub mod client;
pub mod messages;
pub mod server;

pub use client::{ControlClient, ControlClientConfig};
pub use messages::{InboundMessage, OutboundMessage};
pub use server::{ControlServer, ControlServerConfig, MessageRouter};
