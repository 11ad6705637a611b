//! Session snapshot files
//!
//! One JSON file per save, named `{task_id}_{YYYYmmdd_HHMMSS}.json`, carrying
//! the saved state plus an injected `_metadata` block.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{error, info};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::{PilotError, Result};

const METADATA_KEY: &str = "_metadata";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A saved session file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionFile {
    pub task_id: String,
    pub timestamp: String,
    pub path: PathBuf,
}

impl SessionFile {
    /// Split "{task_id}_{YYYYmmdd}_{HHMMSS}.json" back into its parts
    fn from_path(path: &Path) -> Option<Self> {
        let stem = path.file_name()?.to_str()?.strip_suffix(".json")?;
        let mut parts = stem.rsplitn(3, '_');
        let time = parts.next()?;
        let date = parts.next()?;
        let task_id = parts.next()?;
        if task_id.is_empty() || date.len() != 8 || time.len() != 6 {
            return None;
        }
        Some(Self {
            task_id: task_id.to_string(),
            timestamp: format!("{}_{}", date, time),
            path: path.to_path_buf(),
        })
    }
}

/// Directory of session snapshot files
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `state` for a task. Non-object payloads are wrapped under "state".
    pub fn save<T: Serialize>(&self, task_id: &str, state: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let now = Local::now();
        let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
        let mut data = match serde_json::to_value(state)? {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("state".to_string(), other);
                map
            }
        };
        data.insert(
            METADATA_KEY.to_string(),
            json!({
                "agent_id": task_id,
                "timestamp": timestamp,
                "saved_at": now.to_rfc3339(),
            }),
        );

        let path = self.dir.join(format!("{}_{}.json", task_id, timestamp));
        let content = serde_json::to_string_pretty(&Value::Object(data))?;
        fs::write(&path, content).map_err(|e| PilotError::Storage(format!("{}: {}", path.display(), e)))?;

        info!("Saved task {} state to {}", task_id, path.display());
        Ok(path)
    }

    /// Load a session file. Failures are logged and yield None.
    pub fn load(&self, path: &Path) -> Option<Value> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                error!("Error loading session state from {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(value) => {
                info!("Loaded session state from {}", path.display());
                Some(value)
            }
            Err(e) => {
                error!("Error loading session state from {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Saved sessions grouped by task id, oldest first within a task
    pub fn list(&self) -> Result<BTreeMap<String, Vec<SessionFile>>> {
        let mut sessions: BTreeMap<String, Vec<SessionFile>> = BTreeMap::new();
        if !self.dir.exists() {
            return Ok(sessions);
        }
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if let Some(file) = SessionFile::from_path(&path) {
                sessions.entry(file.task_id.clone()).or_default().push(file);
            }
        }
        for files in sessions.values_mut() {
            files.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        }
        Ok(sessions)
    }
}
