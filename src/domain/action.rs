//! Action types proposed by the oracle
//!
//! Actions use the externally tagged JSON shape the oracle speaks:
//! `{"go_to_url": {"url": "https://example.com"}}`. The variant key is the
//! discriminator that the action registry dispatches on.

use serde::{Deserialize, Serialize};

/// Scroll direction for scroll actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    #[default]
    Down,
    Up,
}

fn default_scroll_amount() -> i64 {
    500
}

/// A single browser action proposed by the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Change the location of the current view
    GoToUrl { url: String },
    /// Open a new view at a location
    OpenTab { url: String },
    /// Click an indexed element (may follow a link)
    ClickElement { index: u32 },
    /// Type text into an indexed element
    InputText { index: u32, text: String },
    /// Switch to another open view
    SwitchTab { page_id: u32 },
    /// Navigate back in history
    GoBack {},
    /// Scroll the active view
    Scroll {
        #[serde(default)]
        direction: ScrollDirection,
        #[serde(default = "default_scroll_amount")]
        amount: i64,
    },
    /// Send raw key presses
    SendKeys { keys: String },
    /// Extract page content for a goal
    ExtractContent { goal: String },
    /// Finish the task with a final answer
    Done { text: String },
}

impl Action {
    /// Discriminator used for registry dispatch and logging.
    pub fn name(&self) -> &'static str {
        match self {
            Action::GoToUrl { .. } => "go_to_url",
            Action::OpenTab { .. } => "open_tab",
            Action::ClickElement { .. } => "click_element",
            Action::InputText { .. } => "input_text",
            Action::SwitchTab { .. } => "switch_tab",
            Action::GoBack {} => "go_back",
            Action::Scroll { .. } => "scroll",
            Action::SendKeys { .. } => "send_keys",
            Action::ExtractContent { .. } => "extract_content",
            Action::Done { .. } => "done",
        }
    }

    /// Actions that may leave the current page.
    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            Action::GoToUrl { .. } | Action::OpenTab { .. } | Action::ClickElement { .. }
        )
    }

    pub fn is_scroll(&self) -> bool {
        matches!(self, Action::Scroll { .. })
    }

    /// Synthetic downward scroll substituted for deferred navigation.
    pub fn forced_scroll(amount: i64) -> Self {
        Action::Scroll {
            direction: ScrollDirection::Down,
            amount,
        }
    }
}

/// True if any action in the list is navigation-class.
pub fn contains_navigation(actions: &[Action]) -> bool {
    actions.iter().any(Action::is_navigation)
}
