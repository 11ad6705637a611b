//! CLI module for webpilot - command-line interface and subcommands.
//!
//! Provides remote control of a running agent over the control server and
//! local inspection of saved sessions and configuration.

pub mod commands;

pub use commands::Cli;
