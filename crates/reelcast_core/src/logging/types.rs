//! Job log vocabulary: levels, pipeline stages, and the slide scope every
//! line and every captured tool line is tagged with.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive for `EnvFilter`.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Tag written in front of the message, if any.
    fn tag(&self) -> Option<&'static str> {
        match self {
            LogLevel::Warn => Some("WARN"),
            LogLevel::Error => Some("ERROR"),
            _ => None,
        }
    }
}

/// Pipeline stage a log line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Job directory, assets and adapters, before the first slide.
    #[default]
    Setup,
    Markup,
    Synthesis,
    Probe,
    Render,
    Compose,
    Concat,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Markup => "markup",
            Stage::Synthesis => "synthesis",
            Stage::Probe => "probe",
            Stage::Render => "render",
            Stage::Compose => "compose",
            Stage::Concat => "concat",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slide being worked on, as shown in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideRef {
    /// Zero-based, matching artifact names (`segment_<index>.mp4`).
    pub index: usize,
    pub total: usize,
    pub template_id: String,
}

/// Where the job currently is: an optional slide plus a stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scope {
    pub slide: Option<SlideRef>,
    pub stage: Stage,
}

impl Scope {
    pub fn slide_index(&self) -> Option<usize> {
        self.slide.as_ref().map(|s| s.index)
    }

    /// `slide 2/5 render` inside a slide, the bare stage outside one.
    pub fn label(&self) -> String {
        match &self.slide {
            Some(slide) => format!("slide {}/{} {}", slide.index + 1, slide.total, self.stage),
            None => self.stage.to_string(),
        }
    }
}

/// One line of external tool output, remembered with the scope it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolLine {
    pub slide: Option<usize>,
    pub stage: Stage,
    pub stderr: bool,
    pub text: String,
}

impl ToolLine {
    pub fn belongs_to(&self, scope: &Scope) -> bool {
        self.slide == scope.slide_index() && self.stage == scope.stage
    }
}

/// Per-job logger settings, built from the `[logging]` config section.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Keep tool output out of the log unless a tool fails.
    pub compact: bool,
    /// Only log progress when it crosses a multiple of this.
    pub progress_step: u32,
    /// Tool lines remembered for the failure tail.
    pub error_tail: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            compact: true,
            progress_step: 20,
            error_tail: 20,
        }
    }
}

/// Receives every formatted job log line (e.g. `reelcast generate -v`).
pub type LogCallback = Box<dyn Fn(&str) + Send + Sync>;

/// `[12:00:01] [slide 2/5 render] WARN: message`
pub(crate) fn format_line(timestamp: &str, scope: &Scope, level: LogLevel, message: &str) -> String {
    match level.tag() {
        Some(tag) => format!("[{}] [{}] {}: {}", timestamp, scope.label(), tag, message),
        None => format!("[{}] [{}] {}", timestamp, scope.label(), message),
    }
}
