//! Domain types shared across the pipeline.

mod artifacts;
mod job;
mod slide;

pub use artifacts::{
    AudioArtifact, Segment, SegmentKind, Timeline, TimelineError, TimelineSummary, VisualArtifact,
};
pub use job::{slugify, Job, JobId};
pub use slide::{ReadyCondition, RenderMode, SlideSpec};
