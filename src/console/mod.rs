//! Local operator surface: line console and keyboard shortcuts.

pub mod commands;
pub mod keyboard;
pub mod reader;

pub use commands::{ConsoleCommand, Dispatcher, HELP_TEXT};
pub use keyboard::{KeyboardListener, shortcut_for};
pub use reader::{Console, render_login_box, render_prompt, spawn_stdin_reader};
