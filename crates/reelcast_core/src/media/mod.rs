//! Media inspection.

pub mod probe;

pub use probe::{
    narration_duration, parse_media_info, DurationProbe, FfprobeProbe, MediaInfo, ProbeError,
    ProbeResult,
};
