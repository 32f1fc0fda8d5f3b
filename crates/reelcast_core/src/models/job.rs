//! Job identity and on-disk layout.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Short job identifier: the first 8 hex characters of a v4 UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        let full = Uuid::new_v4().simple().to_string();
        Self(full[..8].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One video generation request.
///
/// The working directory is scoped to this job and never cleaned up
/// automatically; it holds every intermediate artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Subject name (e.g. the person the report is for).
    pub name: String,
    /// Raw request payload.
    pub payload: serde_json::Value,
    pub work_dir: PathBuf,
    /// Declared final output path (`<output_folder>/<id>.mp4`).
    pub output_path: PathBuf,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl Job {
    /// Create a job with a freshly generated id.
    pub fn new(
        name: impl Into<String>,
        payload: serde_json::Value,
        work_root: &Path,
        output_folder: &Path,
    ) -> Self {
        Self::with_id(JobId::generate(), name, payload, work_root, output_folder)
    }

    pub fn with_id(
        id: JobId,
        name: impl Into<String>,
        payload: serde_json::Value,
        work_root: &Path,
        output_folder: &Path,
    ) -> Self {
        let name = name.into();
        let work_dir = work_root.join(format!("{}_{}", slugify(&name), id));
        let output_path = output_folder.join(format!("{}.mp4", id));

        Self {
            id,
            name,
            payload,
            work_dir,
            output_path,
            created_at: chrono::Local::now().to_rfc3339(),
        }
    }

    /// Display name used for the job log file.
    pub fn log_name(&self) -> String {
        format!("{}_{}", slugify(&self.name), self.id)
    }

    /// `<work_dir>/<slug>_<id>.log`
    pub fn log_path(&self) -> PathBuf {
        self.artifact(format!("{}.log", self.log_name()))
    }

    /// Path of an artifact inside the job directory.
    pub fn artifact(&self, file_name: impl AsRef<Path>) -> PathBuf {
        self.work_dir.join(file_name)
    }
}

/// Lowercase filesystem-safe form of a name. Empty names become `job`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_sep = true;

    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }

    while slug.ends_with('_') {
        slug.pop();
    }

    if slug.is_empty() {
        "job".to_string()
    } else {
        slug
    }
}
