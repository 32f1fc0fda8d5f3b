//! The single encoding profile every segment is written with.
//!
//! Stream-copy concatenation only works when all segments agree on codec,
//! resolution, frame rate and audio layout, so these values are process-wide.

use crate::config::{EncodingSettings, RenderSettings};

#[derive(Debug, Clone, PartialEq)]
pub struct EncodingProfile {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_codec: String,
    pub pixel_format: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub drift_tolerance_frames: u32,
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self::from_settings(&EncodingSettings::default(), &RenderSettings::default())
    }
}

impl EncodingProfile {
    pub fn from_settings(encoding: &EncodingSettings, render: &RenderSettings) -> Self {
        Self {
            width: render.width,
            height: render.height,
            fps: encoding.fps.max(1),
            video_codec: encoding.video_codec.clone(),
            pixel_format: encoding.pixel_format.clone(),
            audio_codec: encoding.audio_codec.clone(),
            audio_bitrate: encoding.audio_bitrate.clone(),
            sample_rate: encoding.sample_rate,
            channels: encoding.channels,
            drift_tolerance_frames: encoding.drift_tolerance_frames,
        }
    }

    /// Length of one frame in seconds.
    pub fn frame_interval(&self) -> f64 {
        1.0 / f64::from(self.fps)
    }

    /// Allowed audio/video drift in seconds.
    ///
    /// Never below one frame: video durations are quantized to frames.
    pub fn tolerance(&self) -> f64 {
        self.frame_interval() * f64::from(self.drift_tolerance_frames.max(1))
    }

    /// Scale into the frame, letterbox, and force the profile frame rate.
    pub fn video_filter(&self) -> String {
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps}",
            w = self.width,
            h = self.height,
            fps = self.fps
        )
    }

    pub fn video_args(&self) -> Vec<String> {
        vec![
            "-vf".into(),
            self.video_filter(),
            "-c:v".into(),
            self.video_codec.clone(),
            "-pix_fmt".into(),
            self.pixel_format.clone(),
            "-r".into(),
            self.fps.to_string(),
        ]
    }

    pub fn audio_args(&self) -> Vec<String> {
        vec![
            "-c:a".into(),
            self.audio_codec.clone(),
            "-b:a".into(),
            self.audio_bitrate.clone(),
            "-ar".into(),
            self.sample_rate.to_string(),
            "-ac".into(),
            self.channels.to_string(),
        ]
    }
}

/// Seconds formatted for ffmpeg `-t`.
pub fn format_secs(secs: f64) -> String {
    format!("{:.3}", secs)
}
