//! Slide pipeline: every slide becomes one segment, then the segments are joined.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::errors::{PipelineError, PipelineResult, SlideResult};
use super::types::{Context, JobPhase, JobState};
use crate::compose::{ComposeError, ConcatError, Concatenator, SegmentComposer};
use crate::io::is_non_empty_file;
use crate::logging::Stage;
use crate::media::{DurationProbe, ProbeError};
use crate::models::{RenderMode, Segment, SlideSpec};
use crate::narration::{NarrationError, Synthesizer};
use crate::render::{RenderError, SlideRenderer, TemplateStore};

/// Adapter set for one job.
///
/// Each job gets its own instances; nothing here is shared between jobs
/// except the read-only template store.
#[derive(Clone)]
pub struct Adapters {
    pub templates: Arc<TemplateStore>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub probe: Arc<dyn DurationProbe>,
    pub renderer: Arc<dyn SlideRenderer>,
    pub composer: Arc<dyn SegmentComposer>,
    pub concatenator: Arc<dyn Concatenator>,
}

/// Runs a deck through render → synthesize → probe → capture → compose,
/// strictly in declaration order, then concatenates.
///
/// Stops at the first failure. Artifacts already written stay in the job
/// directory and no final file is produced.
pub struct SlidePipeline {
    adapters: Adapters,
    cancelled: Arc<AtomicBool>,
}

impl SlidePipeline {
    pub fn new(adapters: Adapters) -> Self {
        Self {
            adapters,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an existing cancellation flag (e.g. one handle per batch).
    pub fn with_cancel_handle(mut self, handle: &CancelHandle) -> Self {
        self.cancelled = Arc::clone(&handle.flag);
        self
    }

    /// Get a cancellation handle.
    ///
    /// Call `cancel()` on the returned handle to stop the pipeline
    /// at the next slide boundary.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancelled),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Produce the final video for `slides`.
    ///
    /// Returns the output path only after it has been verified non-empty.
    /// The renderer is shut down whether or not the run succeeds.
    pub async fn run(
        &self,
        ctx: &Context,
        slides: &[SlideSpec],
        state: &mut JobState,
    ) -> PipelineResult<PathBuf> {
        let result = self.run_slides(ctx, slides, state).await;
        self.adapters.renderer.shutdown().await;

        match &result {
            Ok(path) => {
                state.output_path = Some(path.clone());
                state.transition(JobPhase::Done);
                ctx.report_progress("Complete", 100, "Video ready");
                ctx.logger.info(&format!(
                    "Video ready: {} ({} segments, {:.2}s)",
                    path.display(),
                    state.timeline.len(),
                    state.timeline.total_duration()
                ));
            }
            Err(e) => {
                state.transition(JobPhase::Failed {
                    kind: e.kind(),
                    slide: e.slide_index(),
                    message: e.to_string(),
                });
                ctx.logger.error(&e.to_string());
            }
        }

        result
    }

    async fn run_slides(
        &self,
        ctx: &Context,
        slides: &[SlideSpec],
        state: &mut JobState,
    ) -> PipelineResult<PathBuf> {
        let job_id = ctx.job_id().to_string();
        let stages = slides.len() + 1;

        for (index, slide) in slides.iter().enumerate() {
            if self.is_cancelled() {
                ctx.logger
                    .warn(&format!("Cancelled before slide {}", index));
                return Err(PipelineError::cancelled(&job_id));
            }

            ctx.logger.begin_slide(index, slides.len(), &slide.template_id);
            ctx.report_progress(
                "Slides",
                percent(index, stages),
                &format!("Slide {} of {}", index + 1, slides.len()),
            );

            let segment = self
                .produce_segment(ctx, index, slide, state)
                .await
                .and_then(|segment| {
                    state.timeline.push(segment.clone())?;
                    Ok(segment)
                })
                .map_err(|e| PipelineError::slide_failed(&job_id, index, &slide.template_id, e))?;

            ctx.logger.finish_slide(segment.duration_secs);
        }

        if self.is_cancelled() {
            return Err(PipelineError::cancelled(&job_id));
        }

        state.transition(JobPhase::Concatenating);
        ctx.logger.heading(
            Stage::Concat,
            &format!("Concatenating {} segments", state.timeline.len()),
        );
        ctx.report_progress(
            "Concatenating",
            percent(slides.len(), stages),
            &format!("Joining {} segments", state.timeline.len()),
        );

        let limits = &ctx.settings.timeouts;
        let manifest = ctx.job.artifact("concat_list.txt");
        let output = bounded(
            limits.concat(),
            self.adapters.concatenator.concatenate(
                state.timeline.segments(),
                &manifest,
                &ctx.job.output_path,
            ),
            |secs| ConcatError::TimedOut { secs },
        )
        .await
        .map_err(|e| PipelineError::concat(&job_id, e))?;

        if !is_non_empty_file(&output) {
            return Err(PipelineError::concat(
                &job_id,
                ConcatError::EmptyOutput { path: output },
            ));
        }

        Ok(output)
    }

    /// One slide: markup → audio → duration → visual → segment.
    async fn produce_segment(
        &self,
        ctx: &Context,
        index: usize,
        slide: &SlideSpec,
        state: &mut JobState,
    ) -> SlideResult<Segment> {
        let limits = &ctx.settings.timeouts;
        let adapters = &self.adapters;

        state.transition(JobPhase::Rendering { slide: index });

        let markup_path = ctx.job.artifact(format!("slide_{}.html", index));
        adapters
            .templates
            .write_markup(&slide.template_id, &slide.context, &markup_path)?;
        ctx.logger
            .debug(&format!("Markup written to {}", markup_path.display()));

        ctx.logger.enter(Stage::Synthesis);
        let audio_path = ctx.job.artifact(format!("audio_{}.mp3", index));
        let audio = bounded(
            limits.synthesis(),
            adapters.synthesizer.synthesize(
                &slide.narration,
                &ctx.settings.narration.language,
                &audio_path,
            ),
            |secs| NarrationError::TimedOut { secs },
        )
        .await?;
        ctx.logger.info(&format!(
            "Narration synthesized with {}",
            adapters.synthesizer.name()
        ));

        ctx.logger.enter(Stage::Probe);
        let duration = bounded(
            limits.probe(),
            adapters.probe.probe(&audio),
            |secs| ProbeError::TimedOut { secs },
        )
        .await?;
        let audio = audio.with_duration(duration);
        ctx.logger
            .info(&format!("Narration length: {:.3}s", duration));

        ctx.logger.enter(Stage::Render);
        let render_base = limits.render();
        let visual = match &slide.mode {
            RenderMode::Static => {
                let output = ctx.job.artifact(format!("slide_{}.png", index));
                bounded(
                    render_base,
                    adapters.renderer.render_to_image(&markup_path, &output),
                    |secs| RenderError::TimedOut { secs },
                )
                .await?
            }
            RenderMode::Motion { ready } => {
                let output = ctx.job.artifact(format!("clip_{}.mp4", index));
                let wait = ready.as_ref().map(|r| r.timeout).unwrap_or_default();
                let limit = render_base + Duration::from_secs_f64(duration) + wait;
                if let Some(ready) = ready {
                    ctx.logger
                        .debug(&format!("Waiting for '{}' before recording", ready.selector));
                }
                bounded(
                    limit,
                    adapters.renderer.render_to_clip(
                        &markup_path,
                        &output,
                        duration,
                        ready.as_ref(),
                    ),
                    |secs| RenderError::TimedOut { secs },
                )
                .await?
            }
        };
        ctx.logger
            .info(&format!("Visual captured: {}", visual.path().display()));

        state.transition(JobPhase::Composing { slide: index });
        ctx.logger.enter(Stage::Compose);
        let segment_path = ctx.job.artifact(format!("segment_{}.mp4", index));
        let segment = bounded(
            limits.compose(),
            adapters
                .composer
                .compose(index, &visual, &audio, &segment_path),
            |secs| ComposeError::TimedOut { secs },
        )
        .await?;

        Ok(segment)
    }
}

/// Handle for cancelling a running pipeline.
#[derive(Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the pipeline.
    ///
    /// The pipeline will stop at the next slide boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Await `fut` for at most `limit`; expiry becomes the stage's own error.
///
/// The future is dropped on expiry, which reaps any child process spawned
/// with `kill_on_drop`.
pub(crate) async fn bounded<T, E, F>(
    limit: Duration,
    fut: F,
    on_timeout: impl FnOnce(u64) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(whole_secs(limit))),
    }
}

/// Seconds rounded up, so a sub-second limit never reads as 0s.
fn whole_secs(limit: Duration) -> u64 {
    limit.as_secs() + u64::from(limit.subsec_nanos() > 0)
}

fn percent(done: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    ((done as f64 / total as f64) * 100.0) as u32
}
