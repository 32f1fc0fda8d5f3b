//! Slide declarations.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Wait for `selector` to appear before recording, for at most `timeout`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyCondition {
    pub selector: String,
    pub timeout: Duration,
}

impl ReadyCondition {
    pub fn new(selector: impl Into<String>, timeout: Duration) -> Self {
        Self {
            selector: selector.into(),
            timeout,
        }
    }
}

/// How a slide's visual is produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RenderMode {
    /// One still capture, held for the narration length.
    Static,
    /// A recording at least as long as the narration.
    Motion { ready: Option<ReadyCondition> },
}

impl RenderMode {
    pub fn is_motion(&self) -> bool {
        matches!(self, RenderMode::Motion { .. })
    }
}

/// One slide of a deck: what to render and what to say over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideSpec {
    /// Template file name in the templates directory.
    pub template_id: String,
    /// Data bound into the template.
    pub context: serde_json::Value,
    /// Fully substituted narration text.
    pub narration: String,
    pub mode: RenderMode,
}

impl SlideSpec {
    /// A slide captured once and held.
    pub fn still(
        template_id: impl Into<String>,
        context: serde_json::Value,
        narration: impl Into<String>,
    ) -> Self {
        Self {
            template_id: template_id.into(),
            context,
            narration: narration.into(),
            mode: RenderMode::Static,
        }
    }

    /// A slide recorded while it animates.
    pub fn motion(
        template_id: impl Into<String>,
        context: serde_json::Value,
        narration: impl Into<String>,
    ) -> Self {
        Self {
            mode: RenderMode::Motion { ready: None },
            ..Self::still(template_id, context, narration)
        }
    }

    /// Require `selector` before recording starts. Has no effect on still slides.
    pub fn ready_when(mut self, selector: impl Into<String>, timeout: Duration) -> Self {
        if let RenderMode::Motion { ready } = &mut self.mode {
            *ready = Some(ReadyCondition::new(selector, timeout));
        }
        self
    }
}
