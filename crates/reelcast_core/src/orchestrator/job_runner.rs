//! Job runner: turns a request into a finished video.
//!
//! Builds the deck, lays out the job directory, stages assets, creates the
//! job's own adapters and runs the slide pipeline. Batches run several jobs
//! at once, each fully isolated.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;

use super::errors::{FailureKind, PipelineError, PipelineResult};
use super::pipeline::{Adapters, CancelHandle, SlidePipeline};
use super::types::{Context, JobState, ProgressCallback};
use crate::assets::AssetLibrary;
use crate::compose::{EncodingProfile, FfmpegComposer, FfmpegConcatenator};
use crate::config::{NarrationBackend, Settings};
use crate::io::ToolRunner;
use crate::jobs::{build_deck, JobRequest};
use crate::logging::{JobLogger, LogCallback, Stage};
use crate::media::{DurationProbe, FfprobeProbe};
use crate::models::{Job, JobId, Timeline, TimelineSummary};
use crate::narration::{CommandTts, GoogleTranslateTts, Synthesizer};
use crate::render::{ChromiumRenderer, TemplateStore};

/// Outcome of one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub job_id: String,
    pub success: bool,
    /// Final video; present only on success.
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
    pub failure_kind: Option<FailureKind>,
    /// Index of the slide that failed, if any.
    pub failed_slide: Option<usize>,
    pub timeline: TimelineSummary,
    /// Job directory holding every intermediate artifact.
    pub work_dir: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
}

impl JobResult {
    fn success(job_id: String, output_path: PathBuf, state: &JobState, job: &Job, log: &Path) -> Self {
        Self {
            job_id,
            success: true,
            output_path: Some(output_path),
            error: None,
            failure_kind: None,
            failed_slide: None,
            timeline: state.timeline.summary(),
            work_dir: Some(job.work_dir.clone()),
            log_path: Some(log.to_path_buf()),
        }
    }

    fn failure(err: &PipelineError, timeline: &Timeline) -> Self {
        Self {
            job_id: err.job_id().to_string(),
            success: false,
            output_path: None,
            error: Some(err.to_string()),
            failure_kind: Some(err.kind()),
            failed_slide: err.slide_index(),
            timeline: timeline.summary(),
            work_dir: None,
            log_path: None,
        }
    }

    fn located(mut self, job: &Job, log: Option<&Path>) -> Self {
        self.work_dir = Some(job.work_dir.clone());
        self.log_path = log.map(Path::to_path_buf);
        self
    }
}

/// Creates the adapter set for one job.
pub trait AdapterFactory: Send + Sync {
    fn create(&self, job: &Job, settings: &Settings, runner: ToolRunner) -> PipelineResult<Adapters>;
}

/// Real adapters: configured TTS backend, ffprobe, headless Chromium, ffmpeg.
pub struct ToolchainFactory {
    templates: Arc<TemplateStore>,
}

impl ToolchainFactory {
    pub fn new(templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            templates: Arc::new(TemplateStore::from_dir(templates_dir)),
        }
    }
}

impl AdapterFactory for ToolchainFactory {
    fn create(&self, job: &Job, settings: &Settings, runner: ToolRunner) -> PipelineResult<Adapters> {
        let tools = &settings.tools;
        let profile = EncodingProfile::from_settings(&settings.encoding, &settings.render);

        let synthesizer: Arc<dyn Synthesizer> = match settings.narration.backend {
            NarrationBackend::Google => Arc::new(
                GoogleTranslateTts::new(&settings.narration.tld)
                    .map_err(|e| PipelineError::setup(job.id.as_str(), e.to_string()))?,
            ),
            NarrationBackend::Command => Arc::new(CommandTts::new(
                &settings.narration.command,
                settings.narration.args.clone(),
                runner.clone(),
            )),
        };
        let probe: Arc<dyn DurationProbe> =
            Arc::new(FfprobeProbe::new(&tools.ffprobe, runner.clone()));

        Ok(Adapters {
            templates: Arc::clone(&self.templates),
            synthesizer,
            probe: Arc::clone(&probe),
            renderer: Arc::new(ChromiumRenderer::new(
                settings.render.clone(),
                &tools.ffmpeg,
                profile.clone(),
                runner.clone(),
            )),
            composer: Arc::new(FfmpegComposer::new(
                &tools.ffmpeg,
                profile,
                runner.clone(),
                probe,
            )),
            concatenator: Arc::new(FfmpegConcatenator::new(&tools.ffmpeg, runner)),
        })
    }
}

/// Optional observers for one run.
#[derive(Default)]
pub struct RunHooks {
    /// Receives every line written to the job log.
    pub log_callback: Option<LogCallback>,
    pub progress: Option<ProgressCallback>,
    pub cancel: Option<CancelHandle>,
}

/// Runs jobs against one settings snapshot.
pub struct JobRunner {
    settings: Settings,
    factory: Arc<dyn AdapterFactory>,
    assets: AssetLibrary,
}

impl JobRunner {
    pub fn new(settings: Settings) -> Self {
        let factory = Arc::new(ToolchainFactory::new(&settings.paths.templates_dir));
        let assets = AssetLibrary::new(&settings.paths.assets_dir);
        Self {
            settings,
            factory,
            assets,
        }
    }

    /// Replace the adapter factory (tests, alternative engines).
    pub fn with_factory(mut self, factory: impl AdapterFactory + 'static) -> Self {
        self.factory = Arc::new(factory);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run one job to completion or first failure.
    pub async fn run(&self, request: &JobRequest, hooks: RunHooks) -> JobResult {
        let id = JobId::generate();
        let settings = &self.settings;
        let paths = &settings.paths;

        let deck = match build_deck(request, settings.render.ready_timeout()) {
            Ok(deck) => deck,
            Err(e) => {
                let err = PipelineError::invalid_payload(id.as_str(), e.to_string());
                tracing::error!(job_id = %id, kind = %request.kind, "{}", err);
                return JobResult::failure(&err, &Timeline::new());
            }
        };

        let job = Job::with_id(
            id,
            deck.name.clone(),
            request.payload.clone(),
            Path::new(&paths.work_root),
            Path::new(&paths.output_folder),
        );
        let job_id = job.id.to_string();
        tracing::info!(job_id = %job_id, kind = %request.kind, name = %job.name, "Starting job");

        let dirs = async {
            tokio::fs::create_dir_all(&job.work_dir).await?;
            tokio::fs::create_dir_all(&paths.output_folder).await
        };
        if let Err(e) = dirs.await {
            let err = PipelineError::setup(&job_id, format!("Failed to create job directories: {}", e));
            return JobResult::failure(&err, &Timeline::new()).located(&job, None);
        }

        let logger = match JobLogger::create(
            job.log_path(),
            settings.logging.to_log_config(),
            hooks.log_callback,
        ) {
            Ok(logger) => Arc::new(logger),
            Err(e) => {
                let err = PipelineError::setup(&job_id, format!("Failed to create logger: {}", e));
                return JobResult::failure(&err, &Timeline::new()).located(&job, None);
            }
        };
        let log_path = logger.log_path().to_path_buf();

        logger.heading(Stage::Setup, &format!("Job {} ({})", job_id, request.kind));
        logger.info(&format!("Subject: {}", job.name));
        logger.info(&format!("Slides: {}", deck.slides.len()));
        logger.info(&format!("Work dir: {}", job.work_dir.display()));

        let setup = self
            .assets
            .stage(&deck.assets, &job.work_dir)
            .await
            .map_err(|e| PipelineError::setup(&job_id, e.to_string()))
            .and_then(|staged| {
                logger.info(&format!("Staged {} assets", staged.len()));
                let runner = ToolRunner::new()
                    .with_logger(Arc::clone(&logger))
                    .with_workdir(&job.work_dir);
                self.factory.create(&job, settings, runner)
            });
        let adapters = match setup {
            Ok(adapters) => adapters,
            Err(err) => {
                logger.error(&err.to_string());
                logger.close();
                return JobResult::failure(&err, &Timeline::new()).located(&job, Some(&log_path));
            }
        };

        let mut state = JobState::new(&job_id).with_state_file(job.artifact("job_state.json"));
        if let Err(e) = state.persist(&job.artifact("job_state.json")) {
            logger.warn(&format!("Failed to write job state: {}", e));
        }

        let mut pipeline = SlidePipeline::new(adapters);
        if let Some(handle) = &hooks.cancel {
            pipeline = pipeline.with_cancel_handle(handle);
        }

        let mut ctx = Context::new(job.clone(), settings.clone(), Arc::clone(&logger));
        if let Some(progress) = hooks.progress {
            ctx = ctx.with_progress_callback(progress);
        }

        let outcome = pipeline.run(&ctx, &deck.slides, &mut state).await;
        logger.close();

        match outcome {
            Ok(output) => {
                tracing::info!(job_id = %job_id, output = %output.display(), "Job finished");
                JobResult::success(job_id, output, &state, &job, &log_path)
            }
            Err(err) => {
                tracing::error!(
                    job_id = %job_id,
                    kind = %err.kind(),
                    slide = ?err.slide_index(),
                    "Job failed"
                );
                JobResult::failure(&err, &state.timeline).located(&job, Some(&log_path))
            }
        }
    }

    /// Run `requests` with at most `concurrency` jobs in flight.
    ///
    /// Results come back in request order. A shared `cancel` handle stops
    /// every job at its next slide boundary.
    pub async fn run_batch(
        self: Arc<Self>,
        requests: Vec<JobRequest>,
        concurrency: usize,
        cancel: Option<CancelHandle>,
    ) -> Vec<JobResult> {
        let permits = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut handles = Vec::with_capacity(requests.len());

        for request in requests {
            let runner = Arc::clone(&self);
            let permits = Arc::clone(&permits);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let hooks = RunHooks {
                    cancel,
                    ..RunHooks::default()
                };
                runner.run(&request, hooks).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    let err = PipelineError::setup("unknown", format!("job task aborted: {}", e));
                    results.push(JobResult::failure(&err, &Timeline::new()));
                }
            }
        }
        results
    }
}
