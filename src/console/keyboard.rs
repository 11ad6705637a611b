//! Global keyboard shortcuts
//!
//! A crossterm raw-mode listener on its own thread maps Ctrl+Alt chords onto
//! console commands. Raw mode owns the terminal while it runs, so the line
//! console is not started alongside it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use log::{debug, info, warn};

use crate::error::{PilotError, Result};

use super::commands::{ConsoleCommand, Dispatcher};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Map a key press to its shortcut command.
pub fn shortcut_for(key: &KeyEvent) -> Option<ConsoleCommand> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if !key.modifiers.contains(KeyModifiers::CONTROL | KeyModifiers::ALT) {
        return None;
    }
    match key.code {
        KeyCode::Char(c) => match c.to_ascii_lowercase() {
            's' => Some(ConsoleCommand::Stop),
            'p' => Some(ConsoleCommand::Toggle),
            'h' => Some(ConsoleCommand::Help),
            'i' => Some(ConsoleCommand::Status),
            _ => None,
        },
        _ => None,
    }
}

/// Running shortcut listener; dropping it without `shutdown` leaves raw mode to the thread.
pub struct KeyboardListener {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl KeyboardListener {
    /// Enter raw mode and start listening.
    pub fn spawn(dispatcher: Dispatcher) -> Result<Self> {
        terminal::enable_raw_mode()?;
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("webpilot-keyboard".to_string())
            .spawn(move || listen(dispatcher, flag))
            .map_err(|e| {
                let _ = terminal::disable_raw_mode();
                PilotError::Io(e)
            })?;

        info!("Keyboard shortcuts enabled (Ctrl+Alt+S/P/H/I)");
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop listening and restore the terminal.
    pub fn shutdown(mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("Keyboard listener thread panicked");
        }
    }
}

fn listen(dispatcher: Dispatcher, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        match event::poll(POLL_INTERVAL) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) => {
                    if let Some(command) = shortcut_for(&key) {
                        let message = dispatcher.dispatch(command);
                        // Raw mode needs explicit carriage returns
                        print!("{}\r\n", message.replace('\n', "\r\n"));
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Keyboard read failed: {}", e);
                    break;
                }
            },
            Ok(false) => {}
            Err(e) => {
                warn!("Keyboard poll failed: {}", e);
                break;
            }
        }
    }
    if let Err(e) = terminal::disable_raw_mode() {
        warn!("Failed to restore terminal mode: {}", e);
    }
    debug!("Keyboard listener exiting");
}
