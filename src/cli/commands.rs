//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - control: pause/resume/status a running agent
//! - ping, pending, respond, command: talk to the control server
//! - sessions: inspect saved session files
//! - config: print the effective configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Webpilot - step orchestration and human-interaction bridge for browser agents
#[derive(Parser, Debug)]
#[command(name = "webpilot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Control server address (defaults to control.listen_addr from config)
    #[arg(short, long, global = true)]
    pub addr: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Remote control verbs. Stop is local-only and not offered here.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlVerb {
    Pause,
    Resume,
    Status,
}

impl ControlVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlVerb::Pause => "pause",
            ControlVerb::Resume => "resume",
            ControlVerb::Status => "status",
        }
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pause, resume or query a running agent
    Control {
        /// What to do
        #[arg(value_enum)]
        verb: ControlVerb,

        /// Agent (task) id
        #[arg(long)]
        agent: String,
    },

    /// Check that the control server is reachable
    Ping,

    /// List interaction requests waiting for an answer
    Pending,

    /// Answer an interaction request
    Respond {
        /// Request id from `pending`
        request_id: String,

        /// JSON payload; bare words are sent as strings
        #[arg(short, long)]
        payload: Option<String>,

        /// Cancel the request instead of answering it
        #[arg(long)]
        cancel: bool,
    },

    /// Send a mailbox command (get_page_info, add_memory, status) to an agent
    Command {
        /// Command name
        name: String,

        /// Agent (task) id
        #[arg(long)]
        agent: String,

        /// JSON params object
        #[arg(short, long)]
        params: Option<String>,
    },

    /// Saved session files
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Print the effective configuration
    Config,
}

/// Session subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommands {
    /// List saved sessions grouped by agent
    List,

    /// Print one saved session file
    Show {
        /// Path to the session file
        file: PathBuf,
    },
}
