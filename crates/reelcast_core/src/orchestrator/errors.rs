//! Error types for the orchestrator pipeline.
//!
//! Errors carry context that chains through layers:
//! Job → Slide → Adapter → Detail

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compose::{ComposeError, ConcatError};
use crate::media::ProbeError;
use crate::models::TimelineError;
use crate::narration::NarrationError;
use crate::render::RenderError;

/// Coarse classification of why a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Synthesis,
    Probe,
    Render,
    Compose,
    Concat,
    Io,
    Payload,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Synthesis => "synthesis",
            FailureKind::Probe => "probe",
            FailureKind::Render => "render",
            FailureKind::Compose => "compose",
            FailureKind::Concat => "concat",
            FailureKind::Io => "io",
            FailureKind::Payload => "payload",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Failure while turning one slide into a segment.
#[derive(Error, Debug)]
pub enum SlideError {
    #[error("synthesis failed: {0}")]
    Synthesis(#[from] NarrationError),

    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    #[error("compose failed: {0}")]
    Compose(#[from] ComposeError),

    #[error("timeline rejected segment: {0}")]
    Timeline(#[from] TimelineError),
}

impl SlideError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SlideError::Synthesis(_) => FailureKind::Synthesis,
            SlideError::Probe(_) => FailureKind::Probe,
            SlideError::Render(_) => FailureKind::Render,
            SlideError::Compose(_) | SlideError::Timeline(_) => FailureKind::Compose,
        }
    }
}

/// Top-level pipeline error with job context.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A slide failed; earlier artifacts are left on disk.
    #[error("Job '{job_id}' failed at slide {slide_index} ({template_id}): {source}")]
    SlideFailed {
        job_id: String,
        slide_index: usize,
        template_id: String,
        #[source]
        source: SlideError,
    },

    /// Joining the segments failed.
    #[error("Job '{job_id}' failed to concatenate: {source}")]
    Concat {
        job_id: String,
        #[source]
        source: ConcatError,
    },

    /// Failed to set up the job (directories, logger, assets, adapters).
    #[error("Job '{job_id}' setup failed: {message}")]
    Setup { job_id: String, message: String },

    /// The request payload did not describe a valid deck.
    #[error("Job '{job_id}' has an invalid payload: {message}")]
    InvalidPayload { job_id: String, message: String },

    #[error("Job '{job_id}' was cancelled")]
    Cancelled { job_id: String },
}

impl PipelineError {
    pub fn slide_failed(
        job_id: impl Into<String>,
        slide_index: usize,
        template_id: impl Into<String>,
        source: SlideError,
    ) -> Self {
        Self::SlideFailed {
            job_id: job_id.into(),
            slide_index,
            template_id: template_id.into(),
            source,
        }
    }

    pub fn concat(job_id: impl Into<String>, source: ConcatError) -> Self {
        Self::Concat {
            job_id: job_id.into(),
            source,
        }
    }

    pub fn setup(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Setup {
            job_id: job_id.into(),
            message: message.into(),
        }
    }

    pub fn invalid_payload(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            job_id: job_id.into(),
            message: message.into(),
        }
    }

    pub fn cancelled(job_id: impl Into<String>) -> Self {
        Self::Cancelled {
            job_id: job_id.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::SlideFailed { source, .. } => source.kind(),
            PipelineError::Concat { .. } => FailureKind::Concat,
            PipelineError::Setup { .. } => FailureKind::Io,
            PipelineError::InvalidPayload { .. } => FailureKind::Payload,
            PipelineError::Cancelled { .. } => FailureKind::Cancelled,
        }
    }

    /// Index of the slide that failed, if the failure belongs to one.
    pub fn slide_index(&self) -> Option<usize> {
        match self {
            PipelineError::SlideFailed { slide_index, .. } => Some(*slide_index),
            _ => None,
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            PipelineError::SlideFailed { job_id, .. }
            | PipelineError::Concat { job_id, .. }
            | PipelineError::Setup { job_id, .. }
            | PipelineError::InvalidPayload { job_id, .. }
            | PipelineError::Cancelled { job_id } => job_id,
        }
    }
}

/// Result type for slide operations.
pub type SlideResult<T> = Result<T, SlideError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
