//! End-to-end pipeline runs against in-process adapters.
//!
//! The fake synthesizer writes the narration length into the audio file and
//! the fake probe reads it back, so durations flow through the pipeline the
//! same way they do with real media.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};

use reelcast_core::compose::{
    fit_clip, ComposeError, ComposeResult, ConcatError, ConcatResult, Concatenator,
    SegmentComposer,
};
use reelcast_core::config::Settings;
use reelcast_core::io::ToolRunner;
use reelcast_core::jobs::{JobRequest, ReportKind};
use reelcast_core::logging::{JobLogger, LogConfig};
use reelcast_core::media::{DurationProbe, MediaInfo, ProbeError, ProbeResult};
use reelcast_core::models::{
    AudioArtifact, Job, ReadyCondition, Segment, SegmentKind, SlideSpec, VisualArtifact,
};
use reelcast_core::narration::{NarrationError, NarrationResult, Synthesizer};
use reelcast_core::orchestrator::{
    AdapterFactory, Adapters, CancelHandle, Context, FailureKind, JobPhase, JobRunner,
    JobState, PipelineError, PipelineResult, RunHooks, SlideError, SlidePipeline,
};
use reelcast_core::render::{RenderError, RenderResult, SlideRenderer, TemplateStore};

const FRAME: f64 = 0.04;

// ---------------------------------------------------------------------------
// Fake adapters
// ---------------------------------------------------------------------------

struct FakeTts {
    lengths: HashMap<String, f64>,
    default_secs: f64,
}

impl FakeTts {
    fn new(default_secs: f64) -> Self {
        Self {
            lengths: HashMap::new(),
            default_secs,
        }
    }

    fn speaking(mut self, text: &str, secs: f64) -> Self {
        self.lengths.insert(text.to_string(), secs);
        self
    }
}

#[async_trait]
impl Synthesizer for FakeTts {
    fn name(&self) -> &str {
        "fake"
    }

    async fn synthesize(
        &self,
        text: &str,
        _language: &str,
        output: &Path,
    ) -> NarrationResult<AudioArtifact> {
        if text.trim().is_empty() {
            return Err(NarrationError::EmptyText);
        }
        let secs = self.lengths.get(text).copied().unwrap_or(self.default_secs);
        std::fs::write(output, secs.to_string()).map_err(|e| NarrationError::io("writing audio", e))?;
        Ok(AudioArtifact::new(output))
    }
}

struct FakeProbe;

#[async_trait]
impl DurationProbe for FakeProbe {
    async fn probe(&self, audio: &AudioArtifact) -> ProbeResult<f64> {
        let text = std::fs::read_to_string(&audio.path).map_err(|_| ProbeError::Missing {
            path: audio.path.clone(),
        })?;
        text.trim().parse().map_err(|_| ProbeError::Parse {
            message: format!("not a duration: {}", text),
        })
    }

    async fn probe_media(&self, path: &Path) -> ProbeResult<MediaInfo> {
        Err(ProbeError::Parse {
            message: format!("no media info for {}", path.display()),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RenderCall {
    Image,
    Clip { requested: f64, selector: Option<String> },
}

#[derive(Default)]
struct FakeRenderer {
    calls: Mutex<Vec<RenderCall>>,
    shutdowns: Mutex<u32>,
}

#[async_trait]
impl SlideRenderer for FakeRenderer {
    async fn render_to_image(&self, markup: &Path, output: &Path) -> RenderResult<VisualArtifact> {
        assert!(markup.is_file(), "markup must exist before rendering");
        self.calls.lock().push(RenderCall::Image);
        std::fs::write(output, b"png").map_err(|e| RenderError::io("writing still", e))?;
        Ok(VisualArtifact::Image {
            path: output.to_path_buf(),
        })
    }

    async fn render_to_clip(
        &self,
        markup: &Path,
        output: &Path,
        requested_secs: f64,
        ready: Option<&ReadyCondition>,
    ) -> RenderResult<VisualArtifact> {
        self.calls.lock().push(RenderCall::Clip {
            requested: requested_secs,
            selector: ready.map(|r| r.selector.clone()),
        });

        if let Some(ready) = ready {
            let html = std::fs::read_to_string(markup).map_err(|e| RenderError::io("reading markup", e))?;
            let id = ready.selector.split('#').nth(1).unwrap_or(&ready.selector);
            if !html.contains(id) {
                return Err(RenderError::ReadyTimeout {
                    selector: ready.selector.clone(),
                    timeout_ms: ready.timeout.as_millis() as u64,
                });
            }
        }

        std::fs::write(output, b"mp4").map_err(|e| RenderError::io("writing clip", e))?;
        Ok(VisualArtifact::Clip {
            path: output.to_path_buf(),
            requested_secs,
            recorded_secs: requested_secs + 0.3,
        })
    }

    async fn shutdown(&self) {
        *self.shutdowns.lock() += 1;
    }
}

struct FakeComposer;

#[async_trait]
impl SegmentComposer for FakeComposer {
    async fn compose(
        &self,
        index: usize,
        visual: &VisualArtifact,
        audio: &AudioArtifact,
        output: &Path,
    ) -> ComposeResult<Segment> {
        let audio_secs = audio.duration_secs.ok_or_else(|| ComposeError::Unprobed {
            path: audio.path.clone(),
        })?;
        if let VisualArtifact::Clip { recorded_secs, .. } = visual {
            fit_clip(index, *recorded_secs, audio_secs, FRAME)?;
        }
        std::fs::write(output, b"segment").map_err(|e| ComposeError::Io {
            operation: "writing segment".into(),
            source: e,
        })?;
        Ok(Segment {
            index,
            path: output.to_path_buf(),
            duration_secs: audio_secs,
            kind: visual.kind(),
        })
    }
}

/// Never finishes composing slide `stall_at`.
struct StallingComposer {
    stall_at: usize,
}

#[async_trait]
impl SegmentComposer for StallingComposer {
    async fn compose(
        &self,
        index: usize,
        visual: &VisualArtifact,
        audio: &AudioArtifact,
        output: &Path,
    ) -> ComposeResult<Segment> {
        if index == self.stall_at {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        FakeComposer.compose(index, visual, audio, output).await
    }
}

struct FakeConcat;

#[async_trait]
impl Concatenator for FakeConcat {
    async fn concatenate(
        &self,
        segments: &[Segment],
        manifest: &Path,
        output: &Path,
    ) -> ConcatResult<PathBuf> {
        if segments.is_empty() {
            return Err(ConcatError::NoSegments);
        }
        let mut listing = String::new();
        for segment in segments {
            if !segment.path.is_file() {
                return Err(ConcatError::MissingSegment {
                    index: segment.index,
                    path: segment.path.clone(),
                });
            }
            listing.push_str(&format!("file '{}'\n", segment.path.display()));
        }
        std::fs::write(manifest, &listing).unwrap();
        std::fs::create_dir_all(output.parent().unwrap()).unwrap();
        std::fs::write(output, listing).unwrap();
        Ok(output.to_path_buf())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn templates() -> TemplateStore {
    let mut store = TemplateStore::new();
    let sources = [
        ("greeting.html", "<h1>Hi {{ name }}</h1>"),
        ("chart.html", r#"<canvas id="spendChart"></canvas>"#),
        ("plain.html", "<p>no chart here</p>"),
        ("intro_template.html", "<h1>Hi {{ user_name }}</h1>"),
        (
            "bank_slide_template.html",
            r#"<h2>{{ bank_name }}</h2><canvas id="spendChart"></canvas>"#,
        ),
        ("outro_template.html", "<p>Bye</p>"),
        ("slide_1.html", "<p>{{ user_name }} {{ credit_score }}</p>"),
        ("slide_2.html", "<p>{{ more_count }} more</p>"),
        ("slide_3.html", "<p>{{ more_count }} more</p>"),
        ("slide_4.html", "<p>Congratulations</p>"),
        ("slide_5.html", "<p>On time</p>"),
    ];
    for (id, source) in sources {
        store.add_template(id, source).unwrap();
    }
    store
}

struct Harness {
    root: TempDir,
    renderer: Arc<FakeRenderer>,
    tts: Arc<FakeTts>,
    templates: Arc<TemplateStore>,
}

impl Harness {
    fn new(tts: FakeTts) -> Self {
        Self {
            root: tempdir().unwrap(),
            renderer: Arc::new(FakeRenderer::default()),
            tts: Arc::new(tts),
            templates: Arc::new(templates()),
        }
    }

    fn adapters(&self) -> Adapters {
        Adapters {
            templates: Arc::clone(&self.templates),
            synthesizer: self.tts.clone(),
            probe: Arc::new(FakeProbe),
            renderer: self.renderer.clone(),
            composer: Arc::new(FakeComposer),
            concatenator: Arc::new(FakeConcat),
        }
    }

    fn context(&self, name: &str) -> Context {
        self.context_with(name, Settings::default())
    }

    fn context_with(&self, name: &str, settings: Settings) -> Context {
        let job = Job::new(
            name,
            json!({}),
            &self.root.path().join("work"),
            &self.root.path().join("videos"),
        );
        std::fs::create_dir_all(&job.work_dir).unwrap();
        let logger = JobLogger::create(job.log_path(), LogConfig::default(), None).unwrap();
        Context::new(job, settings, Arc::new(logger))
    }

    async fn run(&self, ctx: &Context, slides: &[SlideSpec]) -> (PipelineResult<PathBuf>, JobState) {
        let mut state =
            JobState::new(ctx.job.id.as_str()).with_state_file(ctx.job.artifact("job_state.json"));
        let result = SlidePipeline::new(self.adapters()).run(ctx, slides, &mut state).await;
        (result, state)
    }

    fn settings(&self) -> Settings {
        let root = self.root.path();
        let assets = root.join("assets");
        std::fs::create_dir_all(&assets).unwrap();
        for name in [
            "background.jpg",
            "character.png",
            "cards_clock.png",
            "money_check_calendar.png",
            "moneybag_clock.png",
        ] {
            std::fs::write(assets.join(name), b"img").unwrap();
        }

        let mut settings = Settings::default();
        settings.paths.output_folder = root.join("videos").to_string_lossy().into_owned();
        settings.paths.work_root = root.join("work").to_string_lossy().into_owned();
        settings.paths.assets_dir = assets.to_string_lossy().into_owned();
        settings
    }
}

struct FakeFactory {
    adapters: Adapters,
}

impl AdapterFactory for FakeFactory {
    fn create(&self, _job: &Job, _settings: &Settings, _runner: ToolRunner) -> PipelineResult<Adapters> {
        Ok(self.adapters.clone())
    }
}

fn chart_slide(narration: &str) -> SlideSpec {
    SlideSpec::motion("chart.html", json!({}), narration)
        .ready_when("canvas#spendChart", Duration::from_secs(3))
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_still_slide_matches_narration_length() {
    let harness = Harness::new(FakeTts::new(1.0).speaking("Hi Asha", 2.1));
    let ctx = harness.context("Asha");
    let slides = [SlideSpec::still("greeting.html", json!({"name": "Asha"}), "Hi Asha")];

    let (result, state) = harness.run(&ctx, &slides).await;
    let output = result.unwrap();

    assert_eq!(output, ctx.job.output_path);
    assert!(output.is_file());
    assert!(state.is_done());
    assert_eq!(state.output_path.as_deref(), Some(output.as_path()));
    assert_eq!(state.timeline.len(), 1);
    assert!((state.timeline.segments()[0].duration_secs - 2.1).abs() < FRAME);

    let markup = std::fs::read_to_string(ctx.job.artifact("slide_0.html")).unwrap();
    assert_eq!(markup, "<h1>Hi Asha</h1>");
    assert!(ctx.job.artifact("slide_0.png").is_file());
    assert!(ctx.job.artifact("audio_0.mp3").is_file());
    assert!(ctx.job.artifact("segment_0.mp4").is_file());
    assert!(ctx.job.artifact("concat_list.txt").is_file());
}

#[tokio::test]
async fn motion_slide_records_for_the_narration_length() {
    let harness = Harness::new(
        FakeTts::new(1.0)
            .speaking("Hi Asha", 2.1)
            .speaking("Here is your spending", 4.0),
    );
    let ctx = harness.context("Asha");
    let slides = [
        SlideSpec::still("greeting.html", json!({"name": "Asha"}), "Hi Asha"),
        chart_slide("Here is your spending"),
    ];

    let (result, state) = harness.run(&ctx, &slides).await;
    result.unwrap();

    let calls = harness.renderer.calls.lock().clone();
    assert_eq!(calls[0], RenderCall::Image);
    match &calls[1] {
        RenderCall::Clip { requested, selector } => {
            assert!(*requested >= 4.0);
            assert_eq!(selector.as_deref(), Some("canvas#spendChart"));
        }
        other => panic!("expected a recording, got {:?}", other),
    }

    let segments = state.timeline.segments();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[1].kind, SegmentKind::Motion);
    assert!((segments[1].duration_secs - 4.0).abs() < FRAME);
    assert!(ctx.job.artifact("clip_1.mp4").is_file());
}

#[tokio::test]
async fn empty_narration_aborts_without_output() {
    let harness = Harness::new(FakeTts::new(1.0));
    let ctx = harness.context("Asha");
    let slides = [SlideSpec::still("greeting.html", json!({"name": "Asha"}), "   ")];

    let (result, state) = harness.run(&ctx, &slides).await;
    let err = result.unwrap_err();

    assert_eq!(err.kind(), FailureKind::Synthesis);
    assert_eq!(err.slide_index(), Some(0));
    assert!(!ctx.job.output_path.exists());
    assert!(state.output_path.is_none());
    assert!(state.timeline.is_empty());
    assert!(harness.renderer.calls.lock().is_empty());

    let persisted: Value =
        serde_json::from_str(&std::fs::read_to_string(ctx.job.artifact("job_state.json")).unwrap())
            .unwrap();
    let last = persisted["phases"].as_array().unwrap().last().unwrap().clone();
    assert_eq!(last["phase"]["state"], "failed");
    assert_eq!(last["phase"]["kind"], "synthesis");
}

#[tokio::test]
async fn missing_ready_selector_fails_at_that_slide() {
    let harness = Harness::new(FakeTts::new(1.5));
    let ctx = harness.context("Asha");
    let slides = [
        SlideSpec::still("greeting.html", json!({"name": "Asha"}), "Hi Asha"),
        SlideSpec::motion("plain.html", json!({}), "Here is your spending")
            .ready_when("canvas#spendChart", Duration::from_secs(3)),
        SlideSpec::still("greeting.html", json!({"name": "Asha"}), "Bye"),
    ];

    let (result, state) = harness.run(&ctx, &slides).await;
    let err = result.unwrap_err();

    assert_eq!(err.kind(), FailureKind::Render);
    assert_eq!(err.slide_index(), Some(1));
    match &err {
        PipelineError::SlideFailed { template_id, .. } => assert_eq!(template_id, "plain.html"),
        other => panic!("unexpected error: {}", other),
    }
    assert!(!ctx.job.output_path.exists());
    // Earlier artifacts stay; later slides never start.
    assert!(ctx.job.artifact("segment_0.mp4").is_file());
    assert!(!ctx.job.artifact("slide_2.html").exists());
    assert_eq!(state.timeline.len(), 1);
    assert_eq!(
        state.current_phase(),
        &JobPhase::Failed {
            kind: FailureKind::Render,
            slide: Some(1),
            message: err.to_string(),
        }
    );
    assert_eq!(*harness.renderer.shutdowns.lock(), 1);
}

#[tokio::test]
async fn stalled_compose_times_out_at_that_slide() {
    let harness = Harness::new(FakeTts::new(1.0));
    let mut settings = Settings::default();
    // Read as one second
    settings.timeouts.compose_secs = 0;
    let ctx = harness.context_with("Asha", settings);
    let adapters = Adapters {
        composer: Arc::new(StallingComposer { stall_at: 1 }),
        ..harness.adapters()
    };
    let slides = [
        SlideSpec::still("greeting.html", json!({"name": "Asha"}), "Hi Asha"),
        SlideSpec::still("greeting.html", json!({"name": "Asha"}), "Bye"),
    ];

    let started = Instant::now();
    let mut state =
        JobState::new(ctx.job.id.as_str()).with_state_file(ctx.job.artifact("job_state.json"));
    let err = SlidePipeline::new(adapters)
        .run(&ctx, &slides, &mut state)
        .await
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(10));

    assert_eq!(err.kind(), FailureKind::Compose);
    assert_eq!(err.slide_index(), Some(1));
    assert!(matches!(
        err,
        PipelineError::SlideFailed {
            source: SlideError::Compose(ComposeError::TimedOut { secs: 1 }),
            ..
        }
    ));
    assert!(!ctx.job.output_path.exists());
    assert_eq!(state.timeline.len(), 1);
    assert!(matches!(
        state.current_phase(),
        JobPhase::Failed {
            kind: FailureKind::Compose,
            slide: Some(1),
            ..
        }
    ));
    assert_eq!(*harness.renderer.shutdowns.lock(), 1);

    ctx.logger.flush();
    let log = std::fs::read_to_string(ctx.job.log_path()).unwrap();
    assert!(log.contains("[slide 2/2 compose] ERROR:"), "{}", log);
}

#[tokio::test]
async fn cancelled_job_stops_at_slide_boundary() {
    let harness = Harness::new(FakeTts::new(1.0));
    let ctx = harness.context("Asha");
    let slides = [SlideSpec::still("greeting.html", json!({"name": "Asha"}), "Hi Asha")];

    let handle = CancelHandle::new();
    handle.cancel();
    let mut state = JobState::new(ctx.job.id.as_str());
    let err = SlidePipeline::new(harness.adapters())
        .with_cancel_handle(&handle)
        .run(&ctx, &slides, &mut state)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Cancelled);
    assert!(!ctx.job.artifact("slide_0.html").exists());
    assert_eq!(*harness.renderer.shutdowns.lock(), 1);
}

#[tokio::test]
async fn concatenated_length_is_the_sum_of_segments() {
    let harness = Harness::new(
        FakeTts::new(1.0)
            .speaking("one", 1.2)
            .speaking("two", 3.4)
            .speaking("three", 0.9),
    );
    let ctx = harness.context("Asha");
    let slides = [
        SlideSpec::still("greeting.html", json!({"name": "Asha"}), "one"),
        chart_slide("two"),
        SlideSpec::still("greeting.html", json!({"name": "Asha"}), "three"),
    ];

    let (result, state) = harness.run(&ctx, &slides).await;
    let output = result.unwrap();

    let total = state.timeline.total_duration();
    assert!((total - 5.5).abs() <= FRAME * 3.0);

    let listing = std::fs::read_to_string(output).unwrap();
    let order: Vec<_> = listing.lines().collect();
    assert_eq!(order.len(), 3);
    assert!(order[0].contains("segment_0.mp4"));
    assert!(order[2].contains("segment_2.mp4"));
}

#[tokio::test]
async fn bank_insights_job_runs_through_the_runner() {
    let harness = Harness::new(FakeTts::new(2.0));
    let runner = JobRunner::new(harness.settings()).with_factory(FakeFactory {
        adapters: harness.adapters(),
    });

    let request = JobRequest::new(
        ReportKind::BankInsights,
        json!({
            "name": "Asha Rao",
            "banks": [{
                "bank_name": "HDFC Bank",
                "high_spend": {"amount": 12500, "merchant": "Croma", "date": "12 Mar"},
                "monthly_spend": 48200,
                "category_breakdown": {"Shopping": 20000, "Food": 9000}
            }]
        }),
    );
    let result = runner.run(&request, RunHooks::default()).await;

    assert!(result.success, "{:?}", result.error);
    let output = result.output_path.unwrap();
    assert!(output.is_file());
    assert_eq!(output.file_name().unwrap().to_string_lossy(), format!("{}.mp4", result.job_id));
    assert_eq!(
        result.timeline.kinds,
        vec![SegmentKind::Still, SegmentKind::Motion, SegmentKind::Still]
    );

    let work_dir = result.work_dir.unwrap();
    assert!(work_dir.join("background.jpg").is_file());
    assert!(work_dir
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("asha_rao_"));
    assert!(result.log_path.unwrap().starts_with(&work_dir));
}

#[tokio::test]
async fn rerun_with_fresh_id_gives_equivalent_timeline() {
    let harness = Harness::new(FakeTts::new(1.7));
    let runner = Arc::new(JobRunner::new(harness.settings()).with_factory(FakeFactory {
        adapters: harness.adapters(),
    }));

    let payload = json!({
        "name": "Asha",
        "credit_score": 782,
        "accounts_active": [],
        "total_count_active": 3,
        "accounts_closed": [],
        "total_count_closed": 1
    });
    let requests = vec![
        JobRequest::new(ReportKind::CreditReport, payload.clone()),
        JobRequest::new(ReportKind::CreditReport, payload),
    ];
    let results = runner.run_batch(requests, 2, None).await;

    assert!(results.iter().all(|r| r.success));
    assert_ne!(results[0].job_id, results[1].job_id);
    assert_ne!(results[0].work_dir, results[1].work_dir);
    assert_eq!(results[0].timeline, results[1].timeline);
    assert_eq!(results[0].timeline.segments, 5);
}
