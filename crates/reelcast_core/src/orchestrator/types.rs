//! Core types for the orchestrator pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::errors::FailureKind;
use crate::config::Settings;
use crate::logging::JobLogger;
use crate::models::{Job, Timeline};

/// Progress callback type for reporting pipeline progress.
///
/// Arguments: (stage_name, percent_complete, message)
pub type ProgressCallback = Box<dyn Fn(&str, u32, &str) + Send + Sync>;

/// Read-only context passed through the pipeline.
///
/// Mutable state goes in `JobState`.
pub struct Context {
    pub job: Job,
    pub settings: Settings,
    /// Per-job logger.
    pub logger: Arc<JobLogger>,
    progress_callback: Option<ProgressCallback>,
}

impl Context {
    pub fn new(job: Job, settings: Settings, logger: Arc<JobLogger>) -> Self {
        Self {
            job,
            settings,
            logger,
            progress_callback: None,
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Report progress to the job log (stepped in compact mode) and the
    /// callback, if set.
    pub fn report_progress(&self, stage: &str, percent: u32, message: &str) {
        self.logger.progress(percent, message);
        if let Some(ref callback) = self.progress_callback {
            callback(stage, percent, message);
        }
    }

    pub fn job_id(&self) -> &str {
        self.job.id.as_str()
    }

    pub fn work_dir(&self) -> &Path {
        &self.job.work_dir
    }
}

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobPhase {
    Created,
    Rendering { slide: usize },
    Composing { slide: usize },
    Concatenating,
    Done,
    Failed {
        kind: FailureKind,
        slide: Option<usize>,
        message: String,
    },
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Done | JobPhase::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: JobPhase,
    pub at: String,
}

/// Mutable job state accumulated while the pipeline runs.
///
/// Written to `job_state.json` after every transition so a failed job can
/// be inspected afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: String,
    pub started_at: Option<String>,
    pub phases: Vec<PhaseRecord>,
    pub timeline: Timeline,
    /// Set only once the final file is verified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip)]
    state_path: Option<PathBuf>,
}

impl JobState {
    /// Create a new job state in the `Created` phase.
    pub fn new(job_id: impl Into<String>) -> Self {
        let mut state = Self {
            job_id: job_id.into(),
            started_at: Some(chrono::Local::now().to_rfc3339()),
            ..Default::default()
        };
        state.phases.push(PhaseRecord {
            phase: JobPhase::Created,
            at: chrono::Local::now().to_rfc3339(),
        });
        state
    }

    /// Persist to `path` after every transition.
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    pub fn current_phase(&self) -> &JobPhase {
        self.phases
            .last()
            .map(|r| &r.phase)
            .unwrap_or(&JobPhase::Created)
    }

    /// Record a transition and persist the state file, if one is set.
    pub fn transition(&mut self, phase: JobPhase) {
        tracing::debug!(job_id = %self.job_id, ?phase, "Job phase");
        self.phases.push(PhaseRecord {
            phase,
            at: chrono::Local::now().to_rfc3339(),
        });

        if let Some(path) = self.state_path.clone() {
            if let Err(e) = self.persist(&path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to write job state");
            }
        }
    }

    /// Write the state as pretty JSON via a temp file and rename.
    pub fn persist(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)
    }

    pub fn is_done(&self) -> bool {
        matches!(self.current_phase(), JobPhase::Done)
    }
}
