//! Slide markup from Jinja-style templates.

use std::path::{Path, PathBuf};

use minijinja::{path_loader, Environment};

use super::{RenderError, RenderResult};
use crate::io::ensure_parent;

/// Renders slide templates with a data context.
///
/// Templates load lazily from a directory; in-memory templates can be added
/// on top (used by tests and embedded decks).
pub struct TemplateStore {
    env: Environment<'static>,
    root: Option<PathBuf>,
}

impl TemplateStore {
    /// Store with no templates.
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
            root: None,
        }
    }

    /// Store loading `<dir>/<template_id>` on demand.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let mut env = Environment::new();
        env.set_loader(path_loader(dir.clone()));
        Self {
            env,
            root: Some(dir),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Register a template from source.
    pub fn add_template(
        &mut self,
        template_id: impl Into<String>,
        source: impl Into<String>,
    ) -> RenderResult<()> {
        let template_id = template_id.into();
        self.env
            .add_template_owned(template_id.clone(), source.into())
            .map_err(|e| RenderError::template(&template_id, e))
    }

    /// Render `template_id` with `context`.
    pub fn markup(&self, template_id: &str, context: &serde_json::Value) -> RenderResult<String> {
        let template = self
            .env
            .get_template(template_id)
            .map_err(|e| RenderError::template(template_id, e))?;
        template
            .render(context)
            .map_err(|e| RenderError::template(template_id, e))
    }

    /// Render `template_id` and write the markup to `output`.
    pub fn write_markup(
        &self,
        template_id: &str,
        context: &serde_json::Value,
        output: &Path,
    ) -> RenderResult<PathBuf> {
        let markup = self.markup(template_id, context)?;
        ensure_parent(output).map_err(|e| RenderError::io("creating markup directory", e))?;
        std::fs::write(output, markup).map_err(|e| RenderError::io("writing slide markup", e))?;
        Ok(output.to_path_buf())
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new()
    }
}
