//! Oracle conversation and querying
//!
//! The conversation is rebuilt every step from the run state. Querying tries
//! the structured channel first and falls back once to parsing raw text.

use log::{info, warn};
use serde::Serialize;

use crate::domain::{ActionOutcome, AgentOutput, EnvironmentSnapshot, TaskRun};
use crate::error::{PilotError, Result};

use super::collaborators::Oracle;

/// Everything the oracle sees for one step
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub system_prompt: String,
    pub task: String,
    pub add_infos: String,
    pub step: u32,
    pub max_steps: u32,
    pub memory: String,
    pub task_progress: String,
    pub last_outcomes: Vec<ActionOutcome>,
    pub snapshot: EnvironmentSnapshot,
    pub hints: Vec<String>,
}

impl Conversation {
    pub fn build(system_prompt: &str, run: &TaskRun, snapshot: &EnvironmentSnapshot, hints: Vec<String>) -> Self {
        Self {
            system_prompt: system_prompt.to_string(),
            task: run.task.clone(),
            add_infos: run.add_infos.clone(),
            step: run.next_step_number(),
            max_steps: run.max_steps,
            memory: run.memory.clone(),
            task_progress: run.task_progress.clone(),
            last_outcomes: run.last_outcomes.clone(),
            snapshot: snapshot.clone(),
            hints,
        }
    }

    /// Plain-text rendering of the state message, for oracles without a structured channel
    pub fn state_message(&self) -> String {
        let mut text = format!(
            "Task: {}\nStep: {}/{}\nCurrent url: {}\nTitle: {}\nOpen tabs: {}\n",
            self.task,
            self.step,
            self.max_steps,
            self.snapshot.url,
            self.snapshot.title,
            self.snapshot.tab_count
        );
        if !self.add_infos.is_empty() {
            text.push_str(&format!("Hints: {}\n", self.add_infos));
        }
        if !self.memory.is_empty() {
            text.push_str(&format!("Memory:\n{}", self.memory));
        }
        if !self.task_progress.is_empty() {
            text.push_str(&format!("Task progress: {}\n", self.task_progress));
        }
        for (i, outcome) in self.last_outcomes.iter().enumerate() {
            if let Some(content) = &outcome.extracted_content {
                text.push_str(&format!("Action result {}: {}\n", i + 1, content));
            }
            if let Some(error) = &outcome.error {
                text.push_str(&format!("Action error {}: {}\n", i + 1, error));
            }
        }
        for hint in &self.hints {
            text.push_str(hint);
            text.push('\n');
        }
        text
    }
}

/// Ask the oracle for the next actions, capped at `max_actions`.
pub async fn query_oracle(oracle: &dyn Oracle, conversation: &Conversation, max_actions: usize) -> Result<AgentOutput> {
    let mut output = match oracle.decide(conversation).await {
        Ok(output) => output,
        Err(e) => {
            warn!("Structured oracle call failed ({}), falling back to raw output", e);
            let raw = oracle
                .complete_raw(conversation)
                .await
                .map_err(|e| PilotError::Parse(format!("fallback oracle call failed: {}", e)))?;
            parse_raw_output(&raw)?
        }
    };
    output.truncate_actions(max_actions);
    Ok(output)
}

/// Parse a JSON result out of raw oracle text, tolerating code fences.
pub fn parse_raw_output(raw: &str) -> Result<AgentOutput> {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    let text = text.trim();

    serde_json::from_str(text).or_else(|first| {
        // Prose around the payload: try the outermost object
        match (text.find('{'), text.rfind('}')) {
            (Some(start), Some(end)) if start < end => serde_json::from_str(&text[start..=end])
                .map_err(|e| PilotError::Parse(format!("could not parse oracle output: {}", e))),
            _ => Err(PilotError::Parse(format!("could not parse oracle output: {}", first))),
        }
    })
}

/// Log every field of an oracle result
pub fn log_response(output: &AgentOutput) {
    let state = &output.current_state;
    info!("Eval [{}]: {}", state.evaluation_marker(), state.prev_action_evaluation);
    info!("New Memory: {}", state.important_contents);
    info!("Task Progress: {}", state.completed_contents);
    info!("Thought: {}", state.thought);
    info!("Summary: {}", state.summary);
    let total = output.action.len();
    for (i, action) in output.action.iter().enumerate() {
        let rendered = serde_json::to_string(action).unwrap_or_else(|_| action.name().to_string());
        info!("Action {}/{}: {}", i + 1, total, rendered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Action;
    use async_trait::async_trait;

    const RESULT: &str = r#"{"current_state": {"thought": "open it"}, "action": [{"open_tab": {"url": "https://a"}}, {"go_back": {}}, {"done": {"text": "x"}}]}"#;

    struct RawOnly(String);

    #[async_trait]
    impl Oracle for RawOnly {
        async fn decide(&self, _conversation: &Conversation) -> Result<AgentOutput> {
            Err(PilotError::Oracle("structured output unsupported".into()))
        }

        async fn complete_raw(&self, _conversation: &Conversation) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    fn conversation() -> Conversation {
        let run = TaskRun::new("Find jobs", 10);
        Conversation::build(
            "system",
            &run,
            &EnvironmentSnapshot::new("https://site", "Site"),
            vec![],
        )
    }

    #[test]
    fn test_parse_fenced_output() {
        let raw = format!("```json\n{}\n```", RESULT);
        let output = parse_raw_output(&raw).unwrap();
        assert_eq!(output.action.len(), 3);
        assert_eq!(output.thought(), "open it");
    }

    #[test]
    fn test_parse_output_with_prose() {
        let raw = format!("Here is my answer:\n{}\nGood luck", RESULT);
        assert!(parse_raw_output(&raw).is_ok());
    }

    #[test]
    fn test_parse_garbage_is_parse_error() {
        assert!(matches!(parse_raw_output("no json here"), Err(PilotError::Parse(_))));
    }

    #[tokio::test]
    async fn test_query_falls_back_and_truncates() {
        let oracle = RawOnly(format!("```{}```", RESULT));
        let output = query_oracle(&oracle, &conversation(), 2).await.unwrap();
        assert_eq!(output.action.len(), 2);
        assert!(matches!(output.action[0], Action::OpenTab { .. }));
    }

    #[tokio::test]
    async fn test_query_fails_when_both_channels_fail() {
        let oracle = RawOnly("I cannot help with that".into());
        let result = query_oracle(&oracle, &conversation(), 10).await;
        assert!(matches!(result, Err(PilotError::Parse(_))));
    }

    #[test]
    fn test_state_message_includes_outcomes_and_hints() {
        let mut run = TaskRun::new("Find jobs", 10);
        run.last_outcomes = vec![ActionOutcome::error("element not found")];
        let conversation = Conversation::build(
            "system",
            &run,
            &EnvironmentSnapshot::new("https://site/search", "Search"),
            vec!["Scroll first".into()],
        );
        let text = conversation.state_message();
        assert!(text.contains("Action error 1: element not found"));
        assert!(text.contains("Scroll first"));
        assert!(text.contains("Step: 1/10"));
    }
}
