//! Persistence for session snapshots and finished run histories.

pub mod history;
pub mod sessions;

pub use history::JsonHistoryRenderer;
pub use sessions::{SessionFile, SessionStore};
