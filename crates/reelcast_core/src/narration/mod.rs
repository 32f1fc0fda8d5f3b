//! Narration synthesis.
//!
//! A [`Synthesizer`] turns fully substituted text into exactly one audio
//! file. It never reports a duration; the probe measures that afterwards.

mod command;
mod google;

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::io::{is_non_empty_file, ToolError};
use crate::models::AudioArtifact;

pub use command::CommandTts;
pub use google::{split_for_tts, GoogleTranslateTts, MAX_CHUNK_CHARS};

/// Errors from speech synthesis.
#[derive(Error, Debug)]
pub enum NarrationError {
    /// Narration text was empty or whitespace only.
    #[error("narration text is empty")]
    EmptyText,

    /// The HTTP request to the speech service failed.
    #[error("speech request failed: {message}")]
    Request { message: String },

    /// The local speech engine failed.
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("I/O error while {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    /// The engine finished but left no audio behind.
    #[error("speech engine produced no audio at {path}")]
    EmptyOutput { path: PathBuf },

    #[error("speech synthesis timed out after {secs}s")]
    TimedOut { secs: u64 },
}

impl NarrationError {
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

pub type NarrationResult<T> = Result<T, NarrationError>;

/// Text-to-speech backend.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Speak `text` in `language` into `output`.
    ///
    /// Fails with [`NarrationError::EmptyText`] before contacting the engine
    /// when there is nothing to say.
    async fn synthesize(
        &self,
        text: &str,
        language: &str,
        output: &Path,
    ) -> NarrationResult<AudioArtifact>;
}

/// Reject empty narration before any backend work.
pub(crate) fn ensure_text(text: &str) -> NarrationResult<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(NarrationError::EmptyText)
    } else {
        Ok(trimmed)
    }
}

/// Confirm the engine wrote a non-empty file.
pub(crate) fn finish_output(output: &Path) -> NarrationResult<AudioArtifact> {
    if !is_non_empty_file(output) {
        return Err(NarrationError::EmptyOutput {
            path: output.to_path_buf(),
        });
    }
    Ok(AudioArtifact::new(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn whitespace_text_is_rejected() {
        assert!(matches!(ensure_text("  \n\t"), Err(NarrationError::EmptyText)));
        assert_eq!(ensure_text("  Hi Asha ").unwrap(), "Hi Asha");
    }

    #[test]
    fn empty_output_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audio_0.mp3");
        std::fs::write(&path, b"").unwrap();

        assert!(matches!(finish_output(&path), Err(NarrationError::EmptyOutput { .. })));

        std::fs::write(&path, b"ID3\x03").unwrap();
        let audio = finish_output(&path).unwrap();
        assert_eq!(audio.path, path);
        assert!(audio.duration_secs.is_none());
    }
}
