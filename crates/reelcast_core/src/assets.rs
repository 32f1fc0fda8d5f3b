//! Read-only static assets staged into each job directory.
//!
//! Slide markup references images by relative path, so every asset a deck
//! needs is copied next to the rendered markup before the first render.

use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tokio::fs;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("asset '{name}' not found in {root}")]
    Missing { name: String, root: PathBuf },

    #[error("asset name '{0}' must be a relative path inside the assets directory")]
    InvalidName(String),

    #[error("failed to stage asset '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Directory of shared assets.
#[derive(Debug, Clone)]
pub struct AssetLibrary {
    root: PathBuf,
}

impl AssetLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copy `names` from the library into `job_dir`, keeping relative paths.
    ///
    /// Fails on the first missing asset; nothing in the library is modified.
    pub async fn stage<S: AsRef<str>>(
        &self,
        names: &[S],
        job_dir: &Path,
    ) -> Result<Vec<PathBuf>, AssetError> {
        let mut staged = Vec::with_capacity(names.len());

        for name in names {
            let name = name.as_ref();
            let relative = validate_name(name)?;
            let source = self.root.join(relative);
            let is_file = fs::metadata(&source)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false);
            if !is_file {
                return Err(AssetError::Missing {
                    name: name.to_string(),
                    root: self.root.clone(),
                });
            }

            let target = job_dir.join(relative);
            let io_err = |source| AssetError::Io {
                name: name.to_string(),
                source,
            };
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).await.map_err(io_err)?;
            }
            fs::copy(&source, &target).await.map_err(io_err)?;

            tracing::debug!(asset = name, "Staged asset");
            staged.push(target);
        }

        Ok(staged)
    }
}

fn validate_name(name: &str) -> Result<&Path, AssetError> {
    let path = Path::new(name);
    let plain = !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if plain {
        Ok(path)
    } else {
        Err(AssetError::InvalidName(name.to_string()))
    }
}
