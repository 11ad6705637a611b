//! Webpilot - step orchestration for browser task agents
//!
//! Webpilot drives an observe/decide/act loop against a browser environment.
//! A human can pause or stop the agent between steps, and questions such as
//! "please log in" go to whoever answers first: the local console or the
//! browser extension.

pub mod actions;
pub mod config;
pub mod console;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod id;
pub mod ipc;
pub mod runner;
pub mod session;
pub mod storage;

pub use error::{PilotError, Result};
pub use session::{PilotSession, Surfaces};
