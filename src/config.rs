use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PilotError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub agent: AgentConfig,
    pub exploration: ExplorationConfig,
    pub interaction: InteractionConfig,
    pub control: ControlConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_steps: u32,
    pub max_failures: u32,
    pub max_actions_per_step: usize,
    pub use_vision: bool,
    pub validate_output: bool,
    pub enable_user_interaction: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            max_failures: 5,
            max_actions_per_step: 10,
            use_vision: true,
            validate_output: false,
            enable_user_interaction: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationConfig {
    pub enabled: bool,
    pub max_scroll_attempts: u32,
    pub bottom_tolerance_px: i64,
    pub scroll_overlap_px: i64,
    pub search_hint_steps: u32,
    pub scroll_timeout_secs: u64,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_scroll_attempts: 5,
            bottom_tolerance_px: 200,
            scroll_overlap_px: 100,
            search_hint_steps: 3,
            scroll_timeout_secs: 10,
        }
    }
}

impl ExplorationConfig {
    pub fn scroll_timeout(&self) -> Duration {
        Duration::from_secs(self.scroll_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub login_timeout_secs: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            login_timeout_secs: 300,
        }
    }
}

impl InteractionConfig {
    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub listen_addr: String,
    pub max_clients: usize,
    pub keyboard_shortcuts: bool,
    pub console: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7789".to_string(),
            max_clients: 16,
            keyboard_shortcuts: false,
            console: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub sessions_dir: PathBuf,
    pub persist_sessions: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sessions_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("webpilot")
                .join("sessions"),
            persist_sessions: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            agent: AgentConfig::default(),
            exploration: ExplorationConfig::default(),
            interaction: InteractionConfig::default(),
            control: ControlConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate().context("Invalid config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Reject budgets and limits the run loop cannot work with
    pub fn validate(&self) -> crate::error::Result<()> {
        let checks = [
            (self.agent.max_steps == 0, "agent.max_steps must be at least 1"),
            (self.agent.max_failures == 0, "agent.max_failures must be at least 1"),
            (
                self.agent.max_actions_per_step == 0,
                "agent.max_actions_per_step must be at least 1",
            ),
            (
                self.exploration.scroll_overlap_px < 0,
                "exploration.scroll_overlap_px must not be negative",
            ),
            (
                self.exploration.bottom_tolerance_px < 0,
                "exploration.bottom_tolerance_px must not be negative",
            ),
            (
                self.exploration.scroll_timeout_secs == 0,
                "exploration.scroll_timeout_secs must be at least 1",
            ),
            (
                self.interaction.login_timeout_secs == 0,
                "interaction.login_timeout_secs must be at least 1",
            ),
            (self.control.max_clients == 0, "control.max_clients must be at least 1"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(PilotError::Configuration(message.to_string())),
            None => Ok(()),
        }
    }
}
