//! Environment snapshot types
//!
//! An EnvironmentSnapshot is the read-only view of the browser at an instant.
//! It is produced by the environment collaborator and never mutated afterwards.

use serde::{Deserialize, Serialize};

/// Scroll metrics of the active view, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollMetrics {
    /// Total height of the scrollable content
    pub content_extent: i64,
    /// Height of the visible viewport
    pub visible_extent: i64,
    /// Current vertical offset from the top
    pub offset: i64,
}

impl ScrollMetrics {
    pub fn new(content_extent: i64, visible_extent: i64, offset: i64) -> Self {
        Self {
            content_extent,
            visible_extent,
            offset,
        }
    }

    /// True when the bottom edge of the viewport is within `tolerance` of the content end.
    pub fn near_bottom(&self, tolerance: i64) -> bool {
        self.offset + self.visible_extent + tolerance >= self.content_extent
    }

    /// One viewport minus the overlap margin, never negative.
    pub fn page_step(&self, overlap: i64) -> i64 {
        (self.visible_extent - overlap).max(0)
    }
}

/// Snapshot of the environment state at the start of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    /// Location identifier (URL)
    pub url: String,
    /// Display title of the active view
    pub title: String,
    /// Number of open views (tabs)
    pub tab_count: usize,
    /// Base64 encoded visual capture, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    /// Scroll metrics, when the accessor can provide them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll: Option<ScrollMetrics>,
}

impl EnvironmentSnapshot {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            tab_count: 1,
            screenshot: None,
            scroll: None,
        }
    }

    /// Placeholder used when no state was ever observed.
    pub fn empty() -> Self {
        Self {
            url: String::new(),
            title: String::new(),
            tab_count: 0,
            screenshot: None,
            scroll: None,
        }
    }

    pub fn with_tabs(mut self, tab_count: usize) -> Self {
        self.tab_count = tab_count;
        self
    }

    pub fn with_screenshot(mut self, screenshot: impl Into<String>) -> Self {
        self.screenshot = Some(screenshot.into());
        self
    }

    pub fn with_scroll(mut self, scroll: ScrollMetrics) -> Self {
        self.scroll = Some(scroll);
        self
    }

    /// Copy without the visual capture, for persisted "last known good" state.
    pub fn without_screenshot(&self) -> Self {
        Self {
            screenshot: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_near_bottom_within_tolerance() {
        let metrics = ScrollMetrics::new(3000, 800, 2050);
        assert!(metrics.near_bottom(200));
        assert!(!metrics.near_bottom(100));
    }

    #[test]
    fn test_near_bottom_at_top_of_long_page() {
        let metrics = ScrollMetrics::new(10_000, 800, 0);
        assert!(!metrics.near_bottom(200));
    }

    #[test]
    fn test_short_page_is_near_bottom() {
        let metrics = ScrollMetrics::new(600, 800, 0);
        assert!(metrics.near_bottom(0));
    }

    #[test]
    fn test_page_step() {
        assert_eq!(ScrollMetrics::new(5000, 900, 0).page_step(100), 800);
        assert_eq!(ScrollMetrics::new(5000, 50, 0).page_step(100), 0);
    }

    #[test]
    fn test_without_screenshot() {
        let snapshot = EnvironmentSnapshot::new("https://example.com", "Example")
            .with_screenshot("aGVsbG8=")
            .with_tabs(3);
        let stripped = snapshot.without_screenshot();
        assert!(stripped.screenshot.is_none());
        assert_eq!(stripped.tab_count, 3);
        assert_eq!(stripped.url, "https://example.com");
    }

    #[test]
    fn test_snapshot_serialization_skips_absent_fields() {
        let snapshot = EnvironmentSnapshot::new("https://example.com", "Example");
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("screenshot"));
        assert!(!json.contains("scroll"));
    }
}
