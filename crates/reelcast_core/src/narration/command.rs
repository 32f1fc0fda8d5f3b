//! Local speech engine invoked as an external command.

use std::path::Path;

use async_trait::async_trait;

use super::{ensure_text, finish_output, NarrationResult, Synthesizer};
use crate::io::ToolRunner;
use crate::models::AudioArtifact;

/// Runs a local TTS program such as `espeak-ng` or `piper`.
///
/// Argument templates may contain `{text}`, `{lang}` and `{output}`.
/// The output is probed by content, so engines writing WAV work as well.
pub struct CommandTts {
    program: String,
    args: Vec<String>,
    runner: ToolRunner,
}

impl CommandTts {
    pub fn new(program: impl Into<String>, args: Vec<String>, runner: ToolRunner) -> Self {
        Self {
            program: program.into(),
            args,
            runner,
        }
    }

    fn expand_args(&self, text: &str, language: &str, output: &Path) -> Vec<String> {
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{text}", text)
                    .replace("{lang}", language)
                    .replace("{output}", &output)
            })
            .collect()
    }
}

#[async_trait]
impl Synthesizer for CommandTts {
    fn name(&self) -> &str {
        &self.program
    }

    async fn synthesize(
        &self,
        text: &str,
        language: &str,
        output: &Path,
    ) -> NarrationResult<AudioArtifact> {
        let text = ensure_text(text)?;
        let args = self.expand_args(text, language, output);
        self.runner.run(&self.program, &args).await?;
        finish_output(output)
    }
}
