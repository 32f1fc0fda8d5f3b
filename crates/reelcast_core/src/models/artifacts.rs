//! Intermediate artifacts and the ordered segment timeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Synthesized narration audio.
///
/// The duration is unknown until the file has been probed; only the probed
/// value is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub path: PathBuf,
    pub duration_secs: Option<f64>,
}

impl AudioArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            duration_secs: None,
        }
    }

    /// Record the probed duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn is_probed(&self) -> bool {
        self.duration_secs.is_some()
    }
}

/// Rendered visual for one slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VisualArtifact {
    /// Still frame with no intrinsic duration.
    Image { path: PathBuf },
    /// Recording of an animated slide.
    Clip {
        path: PathBuf,
        requested_secs: f64,
        recorded_secs: f64,
    },
}

impl VisualArtifact {
    pub fn path(&self) -> &Path {
        match self {
            VisualArtifact::Image { path } | VisualArtifact::Clip { path, .. } => path,
        }
    }

    pub fn kind(&self) -> SegmentKind {
        match self {
            VisualArtifact::Image { .. } => SegmentKind::Still,
            VisualArtifact::Clip { .. } => SegmentKind::Motion,
        }
    }
}

/// Which kind of visual a segment was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Still,
    Motion,
}

/// One slide's finished audio+video piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Slide index in declaration order.
    pub index: usize,
    pub path: PathBuf,
    /// Measured duration of the written segment.
    pub duration_secs: f64,
    pub kind: SegmentKind,
}

#[derive(Error, Debug, PartialEq)]
pub enum TimelineError {
    #[error("segment {got} appended out of order (expected {expected})")]
    OutOfOrder { expected: usize, got: usize },
}

/// Ordered list of segments for one job.
///
/// Only accepts segments in slide order, with no gaps or repeats.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    segments: Vec<Segment>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next segment.
    pub fn push(&mut self, segment: Segment) -> Result<(), TimelineError> {
        let expected = self.segments.len();
        if segment.index != expected {
            return Err(TimelineError::OutOfOrder {
                expected,
                got: segment.index,
            });
        }
        self.segments.push(segment);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration_secs).sum()
    }

    pub fn summary(&self) -> TimelineSummary {
        TimelineSummary {
            segments: self.len(),
            total_secs: self.total_duration(),
            kinds: self.segments.iter().map(|s| s.kind).collect(),
        }
    }
}

/// Compact view of a timeline for job results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSummary {
    pub segments: usize,
    pub total_secs: f64,
    pub kinds: Vec<SegmentKind>,
}
