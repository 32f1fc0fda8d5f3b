//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::{LogConfig, LogLevel};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Path-related settings.
    #[serde(default)]
    pub paths: PathSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Speech synthesis backend.
    #[serde(default)]
    pub narration: NarrationSettings,

    /// Headless browser rendering.
    #[serde(default)]
    pub render: RenderSettings,

    /// Fixed encoding profile shared by every segment.
    #[serde(default)]
    pub encoding: EncodingSettings,

    /// Per-stage time limits.
    #[serde(default)]
    pub timeouts: TimeoutSettings,

    /// External tool locations.
    #[serde(default)]
    pub tools: ToolSettings,
}

/// Path configuration for output, work, logs, templates and assets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Folder receiving final videos (`<id>.mp4`).
    #[serde(default = "default_output_folder")]
    pub output_folder: String,

    /// Root under which each job gets its own `<slug>_<id>` directory.
    #[serde(default = "default_work_root")]
    pub work_root: String,

    /// Folder for per-job log files and the rolling app log.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,

    /// Folder holding slide templates.
    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,

    /// Folder holding static assets staged into each job.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,
}

fn default_output_folder() -> String {
    "videos".to_string()
}

fn default_work_root() -> String {
    ".work".to_string()
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

fn default_templates_dir() -> String {
    "templates".to_string()
}

fn default_assets_dir() -> String {
    "assets".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            output_folder: default_output_folder(),
            work_root: default_work_root(),
            logs_folder: default_logs_folder(),
            templates_dir: default_templates_dir(),
            assets_dir: default_assets_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Use compact log format.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Number of tool output lines to show after a failure.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Progress update step percentage.
    #[serde(default = "default_progress_step")]
    pub progress_step: u32,

    /// Minimum level written to job logs.
    #[serde(default)]
    pub level: LogLevel,
}

fn default_true() -> bool {
    true
}

fn default_error_tail() -> u32 {
    20
}

fn default_progress_step() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            compact: true,
            error_tail: default_error_tail(),
            progress_step: default_progress_step(),
            level: LogLevel::Info,
        }
    }
}

impl LoggingSettings {
    /// Build the per-job logger configuration.
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            compact: self.compact,
            progress_step: self.progress_step,
            error_tail: self.error_tail as usize,
        }
    }
}

/// Which speech engine produces narration audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrationBackend {
    /// Google Translate TTS endpoint over HTTPS.
    #[default]
    Google,
    /// A local command-line engine.
    Command,
}

/// Narration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationSettings {
    #[serde(default)]
    pub backend: NarrationBackend,

    /// Language code passed to the engine.
    #[serde(default = "default_language")]
    pub language: String,

    /// Top-level domain of the Google endpoint (`co.in`, `com`, ...).
    #[serde(default = "default_tld")]
    pub tld: String,

    /// Program run by the command backend.
    #[serde(default = "default_tts_command")]
    pub command: String,

    /// Arguments for the command backend; `{text}`, `{lang}` and `{output}`
    /// are substituted.
    #[serde(default = "default_tts_args")]
    pub args: Vec<String>,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_tld() -> String {
    "co.in".to_string()
}

fn default_tts_command() -> String {
    "espeak-ng".to_string()
}

fn default_tts_args() -> Vec<String> {
    vec![
        "-v".to_string(),
        "{lang}".to_string(),
        "-w".to_string(),
        "{output}".to_string(),
        "{text}".to_string(),
    ]
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self {
            backend: NarrationBackend::default(),
            language: default_language(),
            tld: default_tld(),
            command: default_tts_command(),
            args: default_tts_args(),
        }
    }
}

/// Headless browser configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Delay after load before a still capture.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Default readiness wait when a slide does not set its own.
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    /// Screenshot sampling rate while recording motion slides.
    #[serde(default = "default_capture_fps")]
    pub capture_fps: u32,

    /// Explicit browser binary; auto-detected when empty.
    #[serde(default)]
    pub chrome_executable: String,

    /// Launch the browser with `--no-sandbox` (containers).
    #[serde(default = "default_true")]
    pub no_sandbox: bool,
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_settle_ms() -> u64 {
    500
}

fn default_ready_timeout_ms() -> u64 {
    10_000
}

fn default_capture_fps() -> u32 {
    10
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            settle_ms: default_settle_ms(),
            ready_timeout_ms: default_ready_timeout_ms(),
            capture_fps: default_capture_fps(),
            chrome_executable: String::new(),
            no_sandbox: true,
        }
    }
}

impl RenderSettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

/// Encoding profile configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingSettings {
    #[serde(default = "default_fps")]
    pub fps: u32,

    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_channels")]
    pub channels: u32,

    /// Allowed audio/video drift, in frame intervals.
    #[serde(default = "default_drift_frames")]
    pub drift_tolerance_frames: u32,
}

fn default_fps() -> u32 {
    25
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_pixel_format() -> String {
    "yuv420p".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_audio_bitrate() -> String {
    "192k".to_string()
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_channels() -> u32 {
    2
}

fn default_drift_frames() -> u32 {
    1
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            video_codec: default_video_codec(),
            pixel_format: default_pixel_format(),
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            drift_tolerance_frames: default_drift_frames(),
        }
    }
}

/// Per-stage time limits, in seconds. Values below 1 are read as 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_synthesis_secs")]
    pub synthesis_secs: u64,

    #[serde(default = "default_probe_secs")]
    pub probe_secs: u64,

    /// Limit for a still render; recordings get their requested length on top.
    #[serde(default = "default_render_secs")]
    pub render_secs: u64,

    #[serde(default = "default_compose_secs")]
    pub compose_secs: u64,

    #[serde(default = "default_concat_secs")]
    pub concat_secs: u64,
}

fn default_synthesis_secs() -> u64 {
    60
}

fn default_probe_secs() -> u64 {
    15
}

fn default_render_secs() -> u64 {
    60
}

fn default_compose_secs() -> u64 {
    180
}

fn default_concat_secs() -> u64 {
    300
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            synthesis_secs: default_synthesis_secs(),
            probe_secs: default_probe_secs(),
            render_secs: default_render_secs(),
            compose_secs: default_compose_secs(),
            concat_secs: default_concat_secs(),
        }
    }
}

impl TimeoutSettings {
    pub fn synthesis(&self) -> Duration {
        at_least_one_sec(self.synthesis_secs)
    }

    pub fn probe(&self) -> Duration {
        at_least_one_sec(self.probe_secs)
    }

    /// Base limit for a render; recordings add their length and ready wait.
    pub fn render(&self) -> Duration {
        at_least_one_sec(self.render_secs)
    }

    pub fn compose(&self) -> Duration {
        at_least_one_sec(self.compose_secs)
    }

    pub fn concat(&self) -> Duration {
        at_least_one_sec(self.concat_secs)
    }
}

fn at_least_one_sec(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}

/// External tool locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Paths,
    Logging,
    Narration,
    Render,
    Encoding,
    Timeouts,
    Tools,
}

impl ConfigSection {
    pub const ALL: [ConfigSection; 7] = [
        ConfigSection::Paths,
        ConfigSection::Logging,
        ConfigSection::Narration,
        ConfigSection::Render,
        ConfigSection::Encoding,
        ConfigSection::Timeouts,
        ConfigSection::Tools,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Narration => "narration",
            ConfigSection::Render => "render",
            ConfigSection::Encoding => "encoding",
            ConfigSection::Timeouts => "timeouts",
            ConfigSection::Tools => "tools",
        }
    }

    /// Section for a TOML table name, e.g. `render`.
    pub fn from_table_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|section| section.table_name() == name)
    }

    /// Comment written above the section in generated files.
    pub fn description(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Output, work, template and asset directories",
            ConfigSection::Logging => "Logging configuration",
            ConfigSection::Narration => "Speech synthesis backend",
            ConfigSection::Render => "Headless browser rendering",
            ConfigSection::Encoding => "Encoding profile shared by every segment",
            ConfigSection::Timeouts => "Per-stage time limits in seconds",
            ConfigSection::Tools => "External tool paths",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeouts_are_raised_to_one_second() {
        let timeouts: TimeoutSettings =
            toml::from_str("synthesis_secs = 0\nrender_secs = 0\nconcat_secs = 7").unwrap();

        assert_eq!(timeouts.synthesis(), Duration::from_secs(1));
        assert_eq!(timeouts.render(), Duration::from_secs(1));
        assert_eq!(timeouts.concat(), Duration::from_secs(7));
        assert_eq!(timeouts.probe(), Duration::from_secs(15));
    }

    #[test]
    fn default_settings_serializes() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        assert!(toml.contains("[paths]"));
        assert!(toml.contains("[encoding]"));
        assert!(toml.contains("work_root"));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let minimal = "[paths]\noutput_folder = \"custom_output\"\n[narration]\nbackend = \"command\"";
        let parsed: Settings = toml::from_str(minimal).unwrap();
        assert_eq!(parsed.paths.output_folder, "custom_output");
        assert_eq!(parsed.paths.work_root, ".work");
        assert_eq!(parsed.narration.backend, NarrationBackend::Command);
        assert_eq!(parsed.narration.tld, "co.in");
        assert_eq!(parsed.encoding.fps, 25);
        assert_eq!(parsed.render.width, 1280);
        assert!(parsed.logging.compact);
    }

    #[test]
    fn logging_maps_to_job_logger_config() {
        let logging = LoggingSettings {
            compact: false,
            error_tail: 7,
            ..LoggingSettings::default()
        };
        let config = logging.to_log_config();
        assert!(!config.compact);
        assert_eq!(config.error_tail, 7);
    }
}
