//! Segment composition.
//!
//! A segment is one slide's visual muxed with its narration, lasting exactly
//! as long as the narration. Audio is never stretched or cut; the visual is
//! held (stills) or trimmed (recordings) to fit it.

pub mod concat;
mod profile;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::io::{ensure_parent, ToolError, ToolRunner};
use crate::media::{DurationProbe, ProbeError};
use crate::models::{AudioArtifact, Segment, VisualArtifact};

pub use concat::{ConcatError, ConcatResult, Concatenator, FfmpegConcatenator};
pub use profile::{format_secs, EncodingProfile};

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("input not found: {path}")]
    MissingInput { path: PathBuf },

    #[error("audio {path} has not been probed")]
    Unprobed { path: PathBuf },

    /// Visual and audio lengths disagree beyond tolerance.
    #[error("segment {index}: duration {actual:.3}s differs from narration {expected:.3}s by more than {tolerance:.3}s")]
    DurationMismatch {
        index: usize,
        expected: f64,
        actual: f64,
        tolerance: f64,
    },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("failed to measure segment: {0}")]
    Probe(#[from] ProbeError),

    #[error("I/O error while {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("composing timed out after {secs}s")]
    TimedOut { secs: u64 },
}

pub type ComposeResult<T> = Result<T, ComposeError>;

/// Muxes a visual with its narration into a segment.
#[async_trait]
pub trait SegmentComposer: Send + Sync {
    /// Write segment `index` to `output`. Inputs are left in place.
    async fn compose(
        &self,
        index: usize,
        visual: &VisualArtifact,
        audio: &AudioArtifact,
        output: &Path,
    ) -> ComposeResult<Segment>;
}

/// How a recorded clip is fitted to its narration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClipFit {
    /// Within tolerance; used as recorded.
    AsIs,
    /// Longer than the narration; cut to its length.
    Trim,
}

/// Decide how to fit a clip of `clip_secs` to `audio_secs`.
///
/// A clip shorter than the narration beyond tolerance is a rendering defect
/// and is reported, not padded.
pub fn fit_clip(
    index: usize,
    clip_secs: f64,
    audio_secs: f64,
    tolerance: f64,
) -> ComposeResult<ClipFit> {
    if audio_secs - clip_secs > tolerance {
        return Err(ComposeError::DurationMismatch {
            index,
            expected: audio_secs,
            actual: clip_secs,
            tolerance,
        });
    }
    if clip_secs - audio_secs > tolerance {
        Ok(ClipFit::Trim)
    } else {
        Ok(ClipFit::AsIs)
    }
}

/// Accept a written segment only if its length is within `tolerance` of the
/// narration. A segment whose length could not be read counts as 0s.
pub fn check_segment_length(
    index: usize,
    actual: Option<f64>,
    expected: f64,
    tolerance: f64,
) -> ComposeResult<f64> {
    let actual = actual.unwrap_or(0.0);
    if (actual - expected).abs() > tolerance {
        return Err(ComposeError::DurationMismatch {
            index,
            expected,
            actual,
            tolerance,
        });
    }
    Ok(actual)
}

/// [`SegmentComposer`] running ffmpeg with the fixed [`EncodingProfile`].
pub struct FfmpegComposer {
    ffmpeg: String,
    profile: EncodingProfile,
    runner: ToolRunner,
    probe: Arc<dyn DurationProbe>,
}

impl FfmpegComposer {
    pub fn new(
        ffmpeg: impl Into<String>,
        profile: EncodingProfile,
        runner: ToolRunner,
        probe: Arc<dyn DurationProbe>,
    ) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            profile,
            runner,
            probe,
        }
    }

    /// Loop a still for exactly `audio_secs`.
    pub fn still_args(&self, image: &Path, audio: &Path, audio_secs: f64, output: &Path) -> Vec<String> {
        let mut args = base_args();
        args.extend([
            "-loop".to_string(),
            "1".to_string(),
            "-framerate".to_string(),
            self.profile.fps.to_string(),
            "-i".to_string(),
            path_arg(image),
            "-i".to_string(),
            path_arg(audio),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "1:a:0".to_string(),
        ]);
        args.extend(self.profile.video_args());
        args.extend(self.profile.audio_args());
        args.extend(["-t".to_string(), format_secs(audio_secs)]);
        args.extend(output_args(output));
        args
    }

    /// Replace a clip's sound with the narration, trimming when asked.
    pub fn clip_args(
        &self,
        clip: &Path,
        audio: &Path,
        audio_secs: f64,
        fit: ClipFit,
        output: &Path,
    ) -> Vec<String> {
        let mut args = base_args();
        args.extend([
            "-i".to_string(),
            path_arg(clip),
            "-i".to_string(),
            path_arg(audio),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "1:a:0".to_string(),
        ]);
        args.extend(self.profile.video_args());
        args.extend(self.profile.audio_args());
        if fit == ClipFit::Trim {
            args.extend(["-t".to_string(), format_secs(audio_secs)]);
        }
        args.extend(output_args(output));
        args
    }

    async fn clip_length(&self, path: &Path, recorded_secs: f64) -> ComposeResult<f64> {
        let info = self.probe.probe_media(path).await?;
        Ok(info.video_duration.or(info.duration()).unwrap_or(recorded_secs))
    }
}

#[async_trait]
impl SegmentComposer for FfmpegComposer {
    async fn compose(
        &self,
        index: usize,
        visual: &VisualArtifact,
        audio: &AudioArtifact,
        output: &Path,
    ) -> ComposeResult<Segment> {
        let audio_secs = audio.duration_secs.ok_or_else(|| ComposeError::Unprobed {
            path: audio.path.clone(),
        })?;

        for input in [visual.path(), audio.path.as_path()] {
            if !input.exists() {
                return Err(ComposeError::MissingInput {
                    path: input.to_path_buf(),
                });
            }
        }

        let tolerance = self.profile.tolerance();
        let args = match visual {
            VisualArtifact::Image { path } => self.still_args(path, &audio.path, audio_secs, output),
            VisualArtifact::Clip {
                path,
                recorded_secs,
                ..
            } => {
                let clip_secs = self.clip_length(path, *recorded_secs).await?;
                let fit = fit_clip(index, clip_secs, audio_secs, tolerance)?;
                tracing::debug!(index, clip_secs, audio_secs, ?fit, "Fitting clip to narration");
                self.clip_args(path, &audio.path, audio_secs, fit, output)
            }
        };

        ensure_parent(output).map_err(|source| ComposeError::Io {
            operation: "creating segment directory".to_string(),
            source,
        })?;
        self.runner.run(&self.ffmpeg, &args).await?;

        let info = self.probe.probe_media(output).await?;
        let actual = check_segment_length(index, info.duration(), audio_secs, tolerance)?;

        Ok(Segment {
            index,
            path: output.to_path_buf(),
            duration_secs: actual,
            kind: visual.kind(),
        })
    }
}

fn base_args() -> Vec<String> {
    vec!["-y".to_string(), "-hide_banner".to_string(), "-loglevel".to_string(), "error".to_string()]
}

fn output_args(output: &Path) -> Vec<String> {
    vec!["-movflags".to_string(), "+faststart".to_string(), path_arg(output)]
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaInfo, ProbeResult};

    struct NoProbe;

    #[async_trait]
    impl DurationProbe for NoProbe {
        async fn probe(&self, _audio: &AudioArtifact) -> ProbeResult<f64> {
            unreachable!("not used")
        }

        async fn probe_media(&self, _path: &Path) -> ProbeResult<MediaInfo> {
            unreachable!("not used")
        }
    }

    fn composer() -> FfmpegComposer {
        FfmpegComposer::new("ffmpeg", EncodingProfile::default(), ToolRunner::new(), Arc::new(NoProbe))
    }

    #[test]
    fn clip_fit_rules() {
        let tol = 0.04;
        assert_eq!(fit_clip(1, 4.5, 4.0, tol).unwrap(), ClipFit::Trim);
        assert_eq!(fit_clip(1, 4.02, 4.0, tol).unwrap(), ClipFit::AsIs);
        assert_eq!(fit_clip(1, 3.98, 4.0, tol).unwrap(), ClipFit::AsIs);
        assert!(matches!(
            fit_clip(1, 3.5, 4.0, tol),
            Err(ComposeError::DurationMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn segment_length_boundaries() {
        // Binary-exact values so the boundary is not blurred by rounding
        let tol = 0.0625;
        assert_eq!(check_segment_length(0, Some(2.0625), 2.0, tol).unwrap(), 2.0625);
        assert_eq!(check_segment_length(0, Some(1.9375), 2.0, tol).unwrap(), 1.9375);

        assert!(matches!(
            check_segment_length(3, Some(2.0625 + 0.001), 2.0, tol),
            Err(ComposeError::DurationMismatch { index: 3, .. })
        ));
        assert!(check_segment_length(3, Some(1.9375 - 0.001), 2.0, tol).is_err());
    }

    #[test]
    fn unreadable_segment_length_counts_as_zero() {
        match check_segment_length(2, None, 2.1, 0.04) {
            Err(ComposeError::DurationMismatch {
                index,
                expected,
                actual,
                ..
            }) => {
                assert_eq!(index, 2);
                assert_eq!(expected, 2.1);
                assert_eq!(actual, 0.0);
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
        // Only a zero-length narration would accept it
        assert_eq!(check_segment_length(2, None, 0.0, 0.04).unwrap(), 0.0);
    }

    /// Everything from the video filter up to the audio codec.
    fn video_encoder_options(args: &[String]) -> Vec<String> {
        let start = args.iter().position(|a| a == "-vf").unwrap();
        let end = args.iter().position(|a| a == "-c:a").unwrap();
        args[start..end].to_vec()
    }

    #[test]
    fn still_and_clip_segments_share_video_encoding() {
        let c = composer();
        let still = c.still_args(
            Path::new("slide_0.png"),
            Path::new("audio_0.mp3"),
            2.1,
            Path::new("segment_0.mp4"),
        );
        let clip = c.clip_args(
            Path::new("clip_1.mp4"),
            Path::new("audio_1.mp3"),
            4.0,
            ClipFit::Trim,
            Path::new("segment_1.mp4"),
        );

        assert_eq!(video_encoder_options(&still), video_encoder_options(&clip));
        assert_eq!(video_encoder_options(&still), c.profile.video_args());
        assert!(!still.iter().any(|a| a == "-tune"));
    }

    #[test]
    fn still_args_hold_image_for_narration_length() {
        let args = composer().still_args(
            Path::new("slide_0.png"),
            Path::new("audio_0.mp3"),
            2.1,
            Path::new("segment_0.mp4"),
        );
        let line = args.join(" ");

        assert!(line.contains("-loop 1 -framerate 25 -i slide_0.png -i audio_0.mp3"));
        assert!(line.contains("-t 2.100"));
        assert!(line.contains("-c:v libx264 -pix_fmt yuv420p -r 25"));
        assert!(!args.iter().any(|a| a == "-shortest"));
        assert_eq!(args.last().map(String::as_str), Some("segment_0.mp4"));
    }

    #[test]
    fn clip_args_only_trim_when_needed() {
        let c = composer();
        let trimmed = c.clip_args(
            Path::new("clip_1.mp4"),
            Path::new("audio_1.mp3"),
            4.0,
            ClipFit::Trim,
            Path::new("segment_1.mp4"),
        );
        assert!(trimmed.join(" ").contains("-t 4.000"));

        let as_is = c.clip_args(
            Path::new("clip_1.mp4"),
            Path::new("audio_1.mp3"),
            4.0,
            ClipFit::AsIs,
            Path::new("segment_1.mp4"),
        );
        assert!(!as_is.iter().any(|a| a == "-t"));
    }

    #[tokio::test]
    async fn unprobed_audio_is_rejected() {
        let visual = VisualArtifact::Image {
            path: PathBuf::from("slide_0.png"),
        };
        let audio = AudioArtifact::new("audio_0.mp3");
        let result = composer()
            .compose(0, &visual, &audio, Path::new("segment_0.mp4"))
            .await;
        assert!(matches!(result, Err(ComposeError::Unprobed { .. })));
    }

    #[tokio::test]
    async fn missing_inputs_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let visual = VisualArtifact::Image {
            path: dir.path().join("slide_0.png"),
        };
        let audio = AudioArtifact::new(dir.path().join("audio_0.mp3")).with_duration(2.0);
        let result = composer()
            .compose(0, &visual, &audio, &dir.path().join("segment_0.mp4"))
            .await;
        assert!(matches!(result, Err(ComposeError::MissingInput { .. })));
    }
}
