use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};

mod cli;

use cli::Cli;
use cli::commands::{Commands, SessionCommands};
use webpilot::config::Config;
use webpilot::ipc::{ControlClient, OutboundMessage};
use webpilot::storage::SessionStore;

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("webpilot")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("webpilot.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.unwrap_or("info")))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// JSON when it parses, otherwise the raw text as a string
fn parse_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_reply(reply: &OutboundMessage) -> Result<()> {
    match reply {
        OutboundMessage::ControlResponse {
            error: Some(error), ..
        } => return Err(eyre!("{}", error)),
        OutboundMessage::ControlResponse {
            agent_id,
            status: Some(status),
            ..
        } => println!(
            "{} {} is {}",
            "Status:".green(),
            agent_id.as_deref().unwrap_or("?"),
            status
        ),
        OutboundMessage::ControlResponse {
            command,
            agent_id,
            success,
            ..
        } => {
            let agent = agent_id.as_deref().unwrap_or("?");
            let verb = command.as_deref().unwrap_or("?");
            if success.unwrap_or(false) {
                println!("{} {} {}", "OK:".green(), verb, agent);
            } else {
                println!("{} {} had no effect on {}", "Unchanged:".yellow(), verb, agent);
            }
        }
        OutboundMessage::Pong { timestamp } => {
            println!("{} {}", "pong".green(), timestamp.as_ref().map(Value::to_string).unwrap_or_default())
        }
        OutboundMessage::InteractionAck { request_id, delivered } => {
            if *delivered {
                println!("{} {}", "Delivered:".green(), request_id);
            } else {
                return Err(eyre!("Request {} is not pending", request_id));
            }
        }
        OutboundMessage::PendingRequests { requests } => {
            if requests.is_empty() {
                println!("{}", "No pending requests".dimmed());
            }
            for request in requests {
                println!(
                    "{}  {:?}  {}",
                    request.request_id.cyan(),
                    request.kind,
                    request.prompt
                );
            }
        }
        OutboundMessage::CommandResult { result, .. } => {
            println!("{}", serde_json::to_string_pretty(result)?);
            if let Some(error) = result.get("error").and_then(Value::as_str) {
                return Err(eyre!("{}", error));
            }
        }
        OutboundMessage::InteractionAnnounced { request } => {
            println!("{} {}", "Announced:".cyan(), request.prompt);
        }
    }
    Ok(())
}

fn handle_sessions_command(command: &SessionCommands, config: &Config) -> Result<()> {
    match command {
        SessionCommands::List => {
            let store = SessionStore::new(config.storage.sessions_dir.clone());
            let sessions = store.list().context("Failed to list sessions")?;
            if sessions.is_empty() {
                println!("{} {}", "No sessions in".dimmed(), store.dir().display());
            }
            for (task_id, files) in &sessions {
                println!("{} ({} saved)", task_id.cyan(), files.len());
                for file in files {
                    println!("  {}  {}", file.timestamp, file.path.display());
                }
            }
        }
        SessionCommands::Show { file } => {
            let store = SessionStore::new(config.storage.sessions_dir.clone());
            let session = store
                .load(Path::new(file))
                .ok_or_else(|| eyre!("Could not load session from {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
    }
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let addr = cli.addr.clone().unwrap_or_else(|| config.control.listen_addr.clone());
    let client = ControlClient::with_addr(addr.clone());

    match &cli.command {
        Commands::Control { verb, agent } => {
            let reply = client
                .control(agent, verb.as_str())
                .await
                .context(format!("Failed to reach control server at {}", addr))?;
            print_reply(&reply)
        }
        Commands::Ping => {
            let reply = client
                .ping()
                .await
                .context(format!("Failed to reach control server at {}", addr))?;
            print_reply(&reply)
        }
        Commands::Pending => {
            let reply = client.pending().await.context("Failed to list pending requests")?;
            print_reply(&reply)
        }
        Commands::Respond {
            request_id,
            payload,
            cancel,
        } => {
            let payload = payload.as_deref().map(parse_payload);
            let reply = client
                .respond(request_id, payload, *cancel)
                .await
                .context("Failed to send response")?;
            print_reply(&reply)
        }
        Commands::Command { name, agent, params } => {
            let params = match params {
                Some(raw) => serde_json::from_str(raw).context("--params must be a JSON object")?,
                None => json!({}),
            };
            let reply = client
                .command(agent, name, params)
                .await
                .context(format!("Failed to run command {}", name))?;
            print_reply(&reply)
        }
        Commands::Sessions { command } => handle_sessions_command(command, config),
        Commands::Config => {
            let rendered = serde_yaml::to_string(config).context("Failed to render config")?;
            print!("{}", rendered);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging once the configured level is known
    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
