//! Gapless concatenation of same-profile segments.
//!
//! Uses the ffmpeg concat demuxer with stream copy over an explicit ordered
//! manifest. Output goes to a `.partial` file first and is only renamed into
//! place once it exists and is non-empty.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use super::path_arg;
use crate::io::{ensure_parent, is_non_empty_file, ToolError, ToolRunner};
use crate::models::Segment;

#[derive(Error, Debug)]
pub enum ConcatError {
    #[error("no segments to concatenate")]
    NoSegments,

    #[error("segment {index} is missing: {path}")]
    MissingSegment { index: usize, path: PathBuf },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("concatenation produced no output at {path}")]
    EmptyOutput { path: PathBuf },

    #[error("I/O error while {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("concatenation timed out after {secs}s")]
    TimedOut { secs: u64 },
}

impl ConcatError {
    fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

pub type ConcatResult<T> = Result<T, ConcatError>;

/// Joins segments in the given order into one file.
#[async_trait]
pub trait Concatenator: Send + Sync {
    /// Write `manifest` listing `segments`, then join them into `output`.
    async fn concatenate(
        &self,
        segments: &[Segment],
        manifest: &Path,
        output: &Path,
    ) -> ConcatResult<PathBuf>;
}

pub struct FfmpegConcatenator {
    ffmpeg: String,
    runner: ToolRunner,
}

impl FfmpegConcatenator {
    pub fn new(ffmpeg: impl Into<String>, runner: ToolRunner) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            runner,
        }
    }

    fn concat_args(manifest: &Path, partial: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            path_arg(manifest),
            "-c".to_string(),
            "copy".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-f".to_string(),
            "mp4".to_string(),
            path_arg(partial),
        ]
    }
}

#[async_trait]
impl Concatenator for FfmpegConcatenator {
    async fn concatenate(
        &self,
        segments: &[Segment],
        manifest: &Path,
        output: &Path,
    ) -> ConcatResult<PathBuf> {
        let resolved = resolve_segments(segments)?;

        tokio::fs::write(manifest, build_manifest(&resolved))
            .await
            .map_err(|e| ConcatError::io("writing concat manifest", e))?;

        ensure_parent(output).map_err(|e| ConcatError::io("creating output directory", e))?;
        let partial = partial_path(output);
        if partial.exists() {
            tokio::fs::remove_file(&partial)
                .await
                .map_err(|e| ConcatError::io("removing stale partial output", e))?;
        }

        self.runner
            .run(&self.ffmpeg, &Self::concat_args(manifest, &partial))
            .await?;

        if !is_non_empty_file(&partial) {
            return Err(ConcatError::EmptyOutput { path: partial });
        }

        tokio::fs::rename(&partial, output)
            .await
            .map_err(|e| ConcatError::io("moving output into place", e))?;

        Ok(output.to_path_buf())
    }
}

/// Check every segment exists and resolve it to an absolute path.
///
/// The concat demuxer resolves relative entries against the manifest's own
/// directory, so entries are always written absolute.
pub fn resolve_segments(segments: &[Segment]) -> ConcatResult<Vec<PathBuf>> {
    if segments.is_empty() {
        return Err(ConcatError::NoSegments);
    }

    segments
        .iter()
        .map(|segment| {
            std::fs::canonicalize(&segment.path)
                .ok()
                .filter(|p| p.is_file())
                .ok_or_else(|| ConcatError::MissingSegment {
                    index: segment.index,
                    path: segment.path.clone(),
                })
        })
        .collect()
}

/// Render an ffconcat manifest for `paths`, in order.
pub fn build_manifest(paths: &[PathBuf]) -> String {
    let mut manifest = String::from("ffconcat version 1.0\n");
    for path in paths {
        manifest.push_str("file '");
        manifest.push_str(&escape_manifest_path(&path.to_string_lossy()));
        manifest.push_str("'\n");
    }
    manifest
}

/// Quote-escape for single-quoted ffconcat entries.
fn escape_manifest_path(path: &str) -> String {
    path.replace('\'', "'\\''")
}

/// `<name>.mp4` -> `<name>.mp4.partial`
pub fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}
