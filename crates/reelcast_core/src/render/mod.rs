//! Slide rendering.
//!
//! Two modes:
//! - still capture after a settle delay ([`SlideRenderer::render_to_image`])
//! - a recording at least as long as the narration, optionally waiting for a
//!   readiness selector first ([`SlideRenderer::render_to_clip`])

mod chromium;
mod markup;

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::io::ToolError;
use crate::models::{ReadyCondition, VisualArtifact};

pub use chromium::{build_frame_manifest, CapturedFrame, ChromiumRenderer};
pub use markup::TemplateStore;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("template '{template_id}' failed: {message}")]
    Template { template_id: String, message: String },

    #[error("failed to launch browser: {message}")]
    Launch { message: String },

    #[error("failed to load {url}: {message}")]
    Navigation { url: String, message: String },

    /// The readiness selector never appeared.
    #[error("selector '{selector}' not ready after {timeout_ms}ms")]
    ReadyTimeout { selector: String, timeout_ms: u64 },

    #[error("screen capture failed: {message}")]
    Capture { message: String },

    /// The renderer finished but left no output file.
    #[error("render produced no output at {path}")]
    MissingOutput { path: PathBuf },

    #[error("encoding recording failed: {0}")]
    Encode(#[from] ToolError),

    #[error("I/O error while {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("rendering timed out after {secs}s")]
    TimedOut { secs: u64 },
}

impl RenderError {
    pub fn template(template_id: &str, err: impl std::fmt::Display) -> Self {
        Self::Template {
            template_id: template_id.to_string(),
            message: err.to_string(),
        }
    }

    pub fn launch(message: impl Into<String>) -> Self {
        Self::Launch {
            message: message.into(),
        }
    }

    pub fn navigation(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Navigation {
            url: url.into(),
            message: err.to_string(),
        }
    }

    pub fn capture(err: impl std::fmt::Display) -> Self {
        Self::Capture {
            message: err.to_string(),
        }
    }

    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Turns slide markup into a still or a recording.
///
/// Implementations are used serially within one job and may keep an engine
/// alive between calls; [`SlideRenderer::shutdown`] releases it.
#[async_trait]
pub trait SlideRenderer: Send + Sync {
    /// Capture one still of `markup` into `output`.
    async fn render_to_image(&self, markup: &Path, output: &Path) -> RenderResult<VisualArtifact>;

    /// Record `markup` for at least `requested_secs` into `output`.
    async fn render_to_clip(
        &self,
        markup: &Path,
        output: &Path,
        requested_secs: f64,
        ready: Option<&ReadyCondition>,
    ) -> RenderResult<VisualArtifact>;

    /// Release engine resources. Safe to call more than once.
    async fn shutdown(&self) {}
}
