//! Duration measurement with ffprobe.
//!
//! The probed audio duration is the single source of truth for how long a
//! slide lasts. Stream duration is preferred; container duration is the
//! fallback (some muxers only write the latter).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::io::{file_len, ToolError, ToolRunner};
use crate::models::AudioArtifact;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("file not found: {path}")]
    Missing { path: PathBuf },

    #[error("file is empty: {path}")]
    Empty { path: PathBuf },

    #[error("no audio stream in {path}")]
    NoAudioStream { path: PathBuf },

    #[error("non-positive duration {value} reported for {path}")]
    ZeroDuration { path: PathBuf, value: f64 },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("failed to parse ffprobe output: {message}")]
    Parse { message: String },

    #[error("probe timed out after {secs}s")]
    TimedOut { secs: u64 },
}

pub type ProbeResult<T> = Result<T, ProbeError>;

/// What ffprobe reports about a media file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    /// Container duration.
    pub format_duration: Option<f64>,
    /// Duration of the first audio stream.
    pub audio_duration: Option<f64>,
    /// Duration of the first video stream.
    pub video_duration: Option<f64>,
    pub has_audio: bool,
    pub has_video: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl MediaInfo {
    /// Best overall duration: container first, then the longest stream.
    pub fn duration(&self) -> Option<f64> {
        self.format_duration.or_else(|| {
            match (self.audio_duration, self.video_duration) {
                (Some(a), Some(v)) => Some(a.max(v)),
                (a, v) => a.or(v),
            }
        })
    }

    /// Narration length: audio stream first, then container.
    pub fn narration_duration(&self) -> Option<f64> {
        self.audio_duration.or(self.format_duration)
    }
}

/// Measures media files.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Duration of a narration file in seconds.
    async fn probe(&self, audio: &AudioArtifact) -> ProbeResult<f64>;

    /// Stream layout and durations of any media file.
    async fn probe_media(&self, path: &Path) -> ProbeResult<MediaInfo>;
}

/// [`DurationProbe`] backed by the ffprobe binary.
pub struct FfprobeProbe {
    ffprobe: String,
    runner: ToolRunner,
}

impl FfprobeProbe {
    pub fn new(ffprobe: impl Into<String>, runner: ToolRunner) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            runner,
        }
    }
}

#[async_trait]
impl DurationProbe for FfprobeProbe {
    async fn probe(&self, audio: &AudioArtifact) -> ProbeResult<f64> {
        let info = self.probe_media(&audio.path).await?;
        narration_duration(&audio.path, &info)
    }

    async fn probe_media(&self, path: &Path) -> ProbeResult<MediaInfo> {
        check_file(path)?;

        let path_arg = path.to_string_lossy().to_string();
        let args = [
            "-v",
            "error",
            "-show_entries",
            "stream=codec_type,duration,width,height:format=duration",
            "-of",
            "json",
            path_arg.as_str(),
        ];
        let output = self.runner.run(&self.ffprobe, &args).await?;

        let info = parse_media_info(&output.stdout)?;
        tracing::debug!(
            file = %path.display(),
            duration = ?info.duration(),
            has_audio = info.has_audio,
            has_video = info.has_video,
            "Probed media"
        );
        Ok(info)
    }
}

fn check_file(path: &Path) -> ProbeResult<()> {
    match file_len(path) {
        None => Err(ProbeError::Missing {
            path: path.to_path_buf(),
        }),
        Some(0) => Err(ProbeError::Empty {
            path: path.to_path_buf(),
        }),
        Some(_) => Ok(()),
    }
}

/// Pick the narration duration out of probe results, rejecting unusable ones.
pub fn narration_duration(path: &Path, info: &MediaInfo) -> ProbeResult<f64> {
    if !info.has_audio {
        return Err(ProbeError::NoAudioStream {
            path: path.to_path_buf(),
        });
    }

    let value = info.narration_duration().unwrap_or(0.0);
    if value <= 0.0 || !value.is_finite() {
        return Err(ProbeError::ZeroDuration {
            path: path.to_path_buf(),
            value,
        });
    }
    Ok(value)
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    duration: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Parse `ffprobe -of json` output.
pub fn parse_media_info(json: &str) -> ProbeResult<MediaInfo> {
    let data: FfprobeOutput = serde_json::from_str(json).map_err(|e| ProbeError::Parse {
        message: e.to_string(),
    })?;

    let mut info = MediaInfo {
        format_duration: data
            .format
            .as_ref()
            .and_then(|f| parse_seconds(f.duration.as_deref())),
        ..MediaInfo::default()
    };

    for stream in &data.streams {
        match stream.codec_type.as_deref() {
            Some("audio") if !info.has_audio => {
                info.has_audio = true;
                info.audio_duration = parse_seconds(stream.duration.as_deref());
            }
            Some("video") if !info.has_video => {
                info.has_video = true;
                info.video_duration = parse_seconds(stream.duration.as_deref());
                info.width = stream.width;
                info.height = stream.height;
            }
            _ => {}
        }
    }

    Ok(info)
}

/// ffprobe reports durations as strings and uses "N/A" when unknown.
fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value
        .filter(|v| *v != "N/A")
        .and_then(|v| v.trim().parse::<f64>().ok())
}
