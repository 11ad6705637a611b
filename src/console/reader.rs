//! Interactive console
//!
//! A blocking stdin thread feeds lines into a channel. The console task
//! dispatches control words and otherwise answers the interaction request
//! currently on screen.

use std::collections::VecDeque;
use std::io::BufRead;
use std::thread;
use std::time::Duration;

use colored::*;
use log::{debug, warn};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

use crate::coordination::{InteractionBridge, InteractionKind, InteractionRequest, is_affirmative};

use super::commands::{ConsoleCommand, Dispatcher};

/// How often the console notices requests answered elsewhere
const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Spawn the stdin reader thread. The channel closes on EOF.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    let spawned = thread::Builder::new()
        .name("webpilot-stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Console read failed: {}", e);
                        break;
                    }
                }
            }
            debug!("Console reader exiting");
        });
    if let Err(e) = spawned {
        warn!("Failed to start console reader: {}", e);
    }
    rx
}

/// Boxed login prompt
pub fn render_login_box(request: &InteractionRequest) -> String {
    let service = request
        .metadata
        .get("service")
        .and_then(Value::as_str)
        .unwrap_or("the website");
    let url = request.metadata.get("url").and_then(Value::as_str).unwrap_or("");

    let rule = "=".repeat(60);
    let mut out = String::new();
    out.push_str(&format!("{}\n", rule.yellow()));
    out.push_str(&format!("{}\n", format!("  LOGIN REQUIRED: {}", service).yellow().bold()));
    out.push_str(&format!("{}\n", rule.yellow()));
    if !url.is_empty() {
        out.push_str(&format!("  Page: {}\n", url.cyan()));
    }
    out.push_str(&format!("  Please login to {} in the browser window.\n", service));
    out.push_str(&format!("  Type {} when you have finished.\n", "yes".green().bold()));
    out.push_str(&format!("{}", rule.yellow()));
    out
}

/// Text shown for a newly announced request
pub fn render_prompt(request: &InteractionRequest) -> String {
    if request.kind == InteractionKind::Login {
        return render_login_box(request);
    }

    let mut out = format!("{} {}", "Agent needs your help:".yellow().bold(), request.prompt);
    if !request.description.is_empty() {
        out.push_str(&format!("\n  {}", request.description));
    }
    for (i, option) in request.options.iter().enumerate() {
        out.push_str(&format!("\n  [{}] {}", i + 1, option));
    }
    if request.kind.is_confirmation() {
        out.push_str(&format!("\n  Answer {}/{}", "yes".green(), "no".red()));
    }
    out
}

/// Payload sent back for a typed answer
pub fn answer_payload(request: &InteractionRequest, line: &str) -> Value {
    let answer = line.trim();
    match request.kind {
        InteractionKind::Confirmation | InteractionKind::Login => json!({"confirmed": is_affirmative(answer)}),
        InteractionKind::Selection => answer
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| request.options.get(i))
            .map(|option| json!(option))
            .unwrap_or_else(|| json!(answer)),
        InteractionKind::TextInput | InteractionKind::Custom => json!(answer),
    }
}

/// Console state: requests waiting for a typed answer, oldest first.
pub struct Console {
    dispatcher: Dispatcher,
    bridge: Arc<InteractionBridge>,
    waiting: VecDeque<InteractionRequest>,
}

impl Console {
    pub fn new(dispatcher: Dispatcher, bridge: Arc<InteractionBridge>) -> Self {
        Self {
            dispatcher,
            bridge,
            waiting: VecDeque::new(),
        }
    }

    /// Request currently on screen
    pub fn active_request(&self) -> Option<&InteractionRequest> {
        self.waiting.front()
    }

    /// Queue an announced request. Returns the prompt when it becomes active.
    pub fn announce(&mut self, request: InteractionRequest) -> Option<String> {
        let prompt = render_prompt(&request);
        self.waiting.push_back(request);
        (self.waiting.len() == 1).then_some(prompt)
    }

    /// Drop requests answered by another actor.
    ///
    /// Returns a notice, plus the next prompt if one is now active.
    pub fn refresh(&mut self) -> Option<String> {
        let mut dropped = false;
        while let Some(front) = self.waiting.front() {
            if self.bridge.is_pending(&front.request_id) {
                break;
            }
            self.waiting.pop_front();
            dropped = true;
        }
        if !dropped {
            return None;
        }
        Some(self.with_next_prompt("Request was already answered".to_string()))
    }

    fn with_next_prompt(&self, mut out: String) -> String {
        if let Some(next) = self.waiting.front() {
            out.push('\n');
            out.push_str(&render_prompt(next));
        }
        out
    }

    /// Handle one typed line and return what to print.
    ///
    /// Control words always dispatch, even while a request is on screen.
    /// Anything else answers the active request.
    pub fn handle_line(&mut self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let notice = self.refresh();
        if let Ok(command) = line.parse::<ConsoleCommand>() {
            let out = self.dispatcher.dispatch(command);
            return Some(match notice {
                Some(notice) => format!("{}\n{}", out, notice),
                None => out,
            });
        }
        // The line was typed for a request that is gone
        if notice.is_some() {
            return notice;
        }

        let Some(request) = self.waiting.pop_front() else {
            return Some(format!("Unknown command '{}'. Type 'help' for available commands.", line));
        };
        let payload = answer_payload(&request, line);
        let out = if self.bridge.fulfill(&request.request_id, Some(payload), false) {
            "Response sent".to_string()
        } else {
            "Request was already answered".to_string()
        };
        Some(self.with_next_prompt(out))
    }

    /// Serve lines and announcements until shutdown or both sources close.
    pub async fn run(mut self, mut lines: mpsc::Receiver<String>, mut shutdown: mpsc::Receiver<()>) {
        let mut announcements = self.bridge.subscribe();
        let mut lines_open = true;
        let mut announcements_open = true;
        let mut refresh = tokio::time::interval(REFRESH_INTERVAL);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        println!("{}", "Console ready. Type 'help' for commands.".dimmed());
        while lines_open || announcements_open {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = refresh.tick() => {
                    if let Some(out) = self.refresh() {
                        println!("{}", out);
                    }
                }
                line = lines.recv(), if lines_open => match line {
                    Some(line) => {
                        if let Some(out) = self.handle_line(&line) {
                            println!("{}", out);
                        }
                    }
                    None => lines_open = false,
                },
                announced = announcements.recv(), if announcements_open => match announced {
                    Ok(request) => {
                        if let Some(prompt) = self.announce(request) {
                            println!("{}", prompt);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Console missed {} interaction announcements", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => announcements_open = false,
                },
            }
        }
        debug!("Console task exiting for {}", self.dispatcher.task_id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::ControlPlane;

    fn console() -> (Arc<ControlPlane>, Arc<InteractionBridge>, Console) {
        let control = Arc::new(ControlPlane::new());
        let bridge = Arc::new(InteractionBridge::new());
        let console = Console::new(Dispatcher::new(Arc::clone(&control), "task-1"), Arc::clone(&bridge));
        (control, bridge, console)
    }

    fn login_request() -> InteractionRequest {
        InteractionRequest::new(InteractionKind::Login, "Please login to Github")
            .with_metadata(json!({"url": "https://github.com/login", "service": "Github"}))
    }

    #[test]
    fn test_answer_payloads() {
        let login = login_request();
        assert_eq!(answer_payload(&login, "Y"), json!({"confirmed": true}));
        assert_eq!(answer_payload(&login, "nope"), json!({"confirmed": false}));

        let select = InteractionRequest::new(InteractionKind::Selection, "Pick")
            .with_options(vec!["red".into(), "blue".into()]);
        assert_eq!(answer_payload(&select, "2"), json!("blue"));
        assert_eq!(answer_payload(&select, "9"), json!("9"));
        assert_eq!(answer_payload(&select, "green"), json!("green"));

        let text = InteractionRequest::new(InteractionKind::TextInput, "Code?");
        assert_eq!(answer_payload(&text, "  123456 "), json!("123456"));
    }

    #[test]
    fn test_login_box_mentions_service() {
        let rendered = render_login_box(&login_request());
        assert!(rendered.contains("Github"));
        assert!(rendered.contains("https://github.com/login"));
    }

    #[test]
    fn test_commands_without_pending_request() {
        let (control, _, mut console) = console();
        assert_eq!(
            console.handle_line("pause").as_deref(),
            Some("Agent will pause after the current step")
        );
        assert!(control.is_paused("task-1"));
        assert!(console.handle_line("   ").is_none());
        let out = console.handle_line("jump").unwrap();
        assert!(out.contains("Unknown command 'jump'"));
    }

    #[tokio::test]
    async fn test_yes_answers_active_login() {
        let (_, bridge, mut console) = console();
        let request = login_request();
        let waiter = {
            let bridge = Arc::clone(&bridge);
            let request = request.clone();
            tokio::spawn(async move { bridge.submit(request, Duration::from_secs(60)).await })
        };
        while !bridge.is_pending(&request.request_id) {
            tokio::task::yield_now().await;
        }

        assert!(console.announce(request).is_some());
        assert_eq!(console.handle_line("yes").as_deref(), Some("Response sent"));
        let response = waiter.await.unwrap().unwrap();
        assert!(response.is_confirmed());
        assert!(console.active_request().is_none());
    }

    async fn submitted(bridge: &Arc<InteractionBridge>, request: &InteractionRequest) {
        let bridge_for_task = Arc::clone(bridge);
        let request_for_task = request.clone();
        tokio::spawn(async move { bridge_for_task.submit(request_for_task, Duration::from_secs(60)).await });
        while !bridge.is_pending(&request.request_id) {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_stop_during_login_wait_is_a_command() {
        let (control, bridge, mut console) = console();
        let request = login_request();
        submitted(&bridge, &request).await;
        console.announce(request.clone());

        assert_eq!(
            console.handle_line("stop").as_deref(),
            Some("Agent will stop after the current step")
        );
        assert!(control.is_stop_requested("task-1"));
        // The login is still waiting for its answer
        assert!(bridge.is_pending(&request.request_id));
        assert_eq!(
            console.active_request().map(|r| r.request_id.as_str()),
            Some(request.request_id.as_str())
        );
    }

    #[tokio::test]
    async fn test_next_prompt_shown_when_front_answered_elsewhere() {
        let (_, bridge, mut console) = console();
        let login = login_request();
        let confirm = InteractionRequest::new(InteractionKind::Confirmation, "Submit the form?");
        submitted(&bridge, &login).await;
        submitted(&bridge, &confirm).await;
        console.announce(login.clone());
        console.announce(confirm.clone());
        assert!(console.refresh().is_none());

        assert!(bridge.fulfill(&login.request_id, Some(json!({"confirmed": true})), false));
        let out = console.refresh().unwrap();
        assert!(out.starts_with("Request was already answered"));
        assert!(out.contains("Submit the form?"));
        assert_eq!(
            console.active_request().map(|r| r.request_id.as_str()),
            Some(confirm.request_id.as_str())
        );

        // A line typed for the gone login is not sent to the new prompt
        bridge.cancel(&confirm.request_id);
        let out = console.handle_line("yes").unwrap();
        assert!(out.starts_with("Request was already answered"));
        assert!(console.active_request().is_none());
    }

    #[test]
    fn test_stale_request_is_skipped() {
        let (control, _, mut console) = console();
        // Never registered with the bridge, so it counts as answered elsewhere
        console.announce(login_request());
        let out = console.handle_line("stop").unwrap();
        assert_eq!(
            out,
            "Agent will stop after the current step\nRequest was already answered"
        );
        assert!(control.is_stop_requested("task-1"));
        assert!(console.active_request().is_none());
    }

    #[test]
    fn test_second_announcement_waits_its_turn() {
        let (_, _, mut console) = console();
        assert!(console.announce(login_request()).is_some());
        assert!(
            console
                .announce(InteractionRequest::new(InteractionKind::Confirmation, "Submit?"))
                .is_none()
        );
    }
}
