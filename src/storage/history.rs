//! JSON history renderer

use std::fs;
use std::path::PathBuf;

use log::info;

use crate::domain::RunHistory;
use crate::error::Result;
use crate::runner::HistoryRenderer;

/// Writes each finished run to `{dir}/{task_id}_history.json`.
#[derive(Debug, Clone)]
pub struct JsonHistoryRenderer {
    dir: PathBuf,
}

impl JsonHistoryRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{}_history.json", task_id))
    }
}

impl HistoryRenderer for JsonHistoryRenderer {
    fn render(&self, history: &RunHistory) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&history.task_id);
        fs::write(&path, serde_json::to_string_pretty(history)?)?;
        info!("Wrote run history to {}", path.display());
        Ok(())
    }
}
