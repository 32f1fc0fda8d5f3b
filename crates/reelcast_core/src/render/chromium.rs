//! Headless Chromium renderer over the DevTools protocol.
//!
//! One browser per renderer, launched on first use and reused serially for
//! every slide of the job. Motion slides are recorded by sampling
//! screenshots with their wall-clock offsets, then encoding the frames with
//! ffmpeg through an ffconcat manifest that preserves the real timing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{RenderError, RenderResult, SlideRenderer};
use crate::compose::{format_secs, EncodingProfile};
use crate::config::RenderSettings;
use crate::io::{ensure_parent, is_non_empty_file, ToolRunner};
use crate::models::{ReadyCondition, VisualArtifact};

const READY_POLL: Duration = Duration::from_millis(100);
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One sampled frame of a recording.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    /// File name inside the frames directory.
    pub file_name: String,
    /// Seconds since recording started.
    pub at_secs: f64,
}

struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

pub struct ChromiumRenderer {
    settings: RenderSettings,
    ffmpeg: String,
    profile: EncodingProfile,
    runner: ToolRunner,
    session: Mutex<Option<BrowserSession>>,
}

impl ChromiumRenderer {
    pub fn new(
        settings: RenderSettings,
        ffmpeg: impl Into<String>,
        profile: EncodingProfile,
        runner: ToolRunner,
    ) -> Self {
        Self {
            settings,
            ffmpeg: ffmpeg.into(),
            profile,
            runner,
            session: Mutex::new(None),
        }
    }

    fn browser_config(&self) -> RenderResult<BrowserConfig> {
        let (width, height) = (self.settings.width, self.settings.height);
        let mut builder = BrowserConfig::builder()
            .window_size(width, height)
            .viewport(Viewport {
                width,
                height,
                ..Viewport::default()
            })
            .launch_timeout(LAUNCH_TIMEOUT)
            .request_timeout(REQUEST_TIMEOUT)
            .arg("--hide-scrollbars")
            .arg("--mute-audio")
            .arg("--allow-file-access-from-files");

        if self.settings.no_sandbox {
            builder = builder.no_sandbox();
        }
        if !self.settings.chrome_executable.is_empty() {
            builder = builder.chrome_executable(&self.settings.chrome_executable);
        }

        builder.build().map_err(RenderError::launch)
    }

    async fn launch(&self) -> RenderResult<BrowserSession> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        tracing::info!("Launched headless browser");
        Ok(BrowserSession { browser, handler })
    }

    /// Open `markup` in a fresh tab, launching the browser if needed.
    async fn open(&self, markup: &Path) -> RenderResult<Page> {
        let url = file_url(markup)?;

        let mut session = self.session.lock().await;
        if session.is_none() {
            *session = Some(self.launch().await?);
        }
        let browser = match session.as_ref() {
            Some(s) => &s.browser,
            None => return Err(RenderError::launch("browser session unavailable")),
        };

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::navigation(&url, e))?;
        page.goto(url.as_str())
            .await
            .map_err(|e| RenderError::navigation(&url, e))?;
        Ok(page)
    }

    async fn screenshot(page: &Page, format: CaptureScreenshotFormat) -> RenderResult<Vec<u8>> {
        page.screenshot(ScreenshotParams::builder().format(format).build())
            .await
            .map_err(RenderError::capture)
    }

    /// Sample frames until at least `requested` has elapsed.
    async fn record(
        &self,
        page: &Page,
        frames_dir: &Path,
        requested: Duration,
    ) -> RenderResult<(Vec<CapturedFrame>, f64)> {
        let interval = Duration::from_secs_f64(1.0 / f64::from(self.settings.capture_fps.max(1)));
        let started = Instant::now();
        let mut frames = Vec::new();

        loop {
            let at = started.elapsed();
            if at >= requested && !frames.is_empty() {
                break;
            }

            let bytes = Self::screenshot(page, CaptureScreenshotFormat::Jpeg).await?;
            let file_name = format!("frame_{:05}.jpg", frames.len());
            tokio::fs::write(frames_dir.join(&file_name), bytes)
                .await
                .map_err(|e| RenderError::io("writing frame", e))?;
            frames.push(CapturedFrame {
                file_name,
                at_secs: at.as_secs_f64(),
            });

            tokio::time::sleep_until(started + interval * frames.len() as u32).await;
        }

        Ok((frames, started.elapsed().as_secs_f64()))
    }

    fn encode_args(&self, manifest: &Path, total_secs: f64, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            manifest.to_string_lossy().to_string(),
        ];
        args.extend(self.profile.video_args());
        args.extend([
            "-an".to_string(),
            "-t".to_string(),
            format_secs(total_secs),
            output.to_string_lossy().to_string(),
        ]);
        args
    }
}

#[async_trait]
impl SlideRenderer for ChromiumRenderer {
    async fn render_to_image(&self, markup: &Path, output: &Path) -> RenderResult<VisualArtifact> {
        let page = self.open(markup).await?;
        tokio::time::sleep(self.settings.settle_delay()).await;

        let bytes = Self::screenshot(&page, CaptureScreenshotFormat::Png).await?;
        close_page(page).await;

        ensure_parent(output).map_err(|e| RenderError::io("creating image directory", e))?;
        tokio::fs::write(output, bytes)
            .await
            .map_err(|e| RenderError::io("writing slide image", e))?;

        if !is_non_empty_file(output) {
            return Err(RenderError::MissingOutput {
                path: output.to_path_buf(),
            });
        }
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
        let frames_dir = frames_dir_for(output);
        tokio::fs::create_dir_all(&frames_dir)
            .await
            .map_err(|e| RenderError::io("creating frames directory", e))?;

        let page = self.open(markup).await?;
        if let Some(ready) = ready {
            if let Err(e) = wait_for_selector(&page, ready).await {
                close_page(page).await;
                return Err(e);
            }
        }

        let requested = Duration::from_secs_f64(requested_secs.max(0.0));
        let recorded = self.record(&page, &frames_dir, requested).await;
        close_page(page).await;
        let (frames, recorded_secs) = recorded?;

        tracing::debug!(
            frames = frames.len(),
            requested_secs,
            recorded_secs,
            "Recorded slide"
        );

        let manifest = frames_dir.join("frames.ffconcat");
        tokio::fs::write(&manifest, build_frame_manifest(&frames, recorded_secs))
            .await
            .map_err(|e| RenderError::io("writing frame manifest", e))?;

        self.runner
            .run(&self.ffmpeg, &self.encode_args(&manifest, recorded_secs, output))
            .await?;

        if !is_non_empty_file(output) {
            return Err(RenderError::MissingOutput {
                path: output.to_path_buf(),
            });
        }
        Ok(VisualArtifact::Clip {
            path: output.to_path_buf(),
            requested_secs,
            recorded_secs,
        })
    }

    async fn shutdown(&self) {
        let Some(mut session) = self.session.lock().await.take() else {
            return;
        };

        if let Err(e) = session.browser.close().await {
            tracing::warn!("Browser close failed: {}", e);
        }
        if let Err(e) = session.browser.wait().await {
            tracing::warn!("Waiting for browser exit failed: {}", e);
        }
        session.handler.abort();
        tracing::info!("Browser shut down");
    }
}

async fn close_page(page: Page) {
    if let Err(e) = page.close().await {
        tracing::debug!("Closing page failed: {}", e);
    }
}

/// Poll for `ready.selector` until it appears or the timeout expires.
async fn wait_for_selector(page: &Page, ready: &ReadyCondition) -> RenderResult<()> {
    let deadline = Instant::now() + ready.timeout;
    loop {
        if page.find_element(ready.selector.as_str()).await.is_ok() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(RenderError::ReadyTimeout {
                selector: ready.selector.clone(),
                timeout_ms: ready.timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(READY_POLL).await;
    }
}

fn file_url(markup: &Path) -> RenderResult<String> {
    let absolute = std::fs::canonicalize(markup).map_err(|e| RenderError::io("resolving markup path", e))?;
    reqwest::Url::from_file_path(&absolute)
        .map(|u| u.to_string())
        .map_err(|_| RenderError::navigation(absolute.display().to_string(), "not a valid file URL"))
}

/// `clip_3.mp4` -> `clip_3_frames/` next to it.
fn frames_dir_for(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "clip".to_string());
    output.with_file_name(format!("{}_frames", stem))
}

/// ffconcat manifest giving each frame its real on-screen time.
///
/// The last frame is held until `total_secs` and listed twice, since the
/// concat demuxer ignores the duration of the final entry.
pub fn build_frame_manifest(frames: &[CapturedFrame], total_secs: f64) -> String {
    let mut manifest = String::from("ffconcat version 1.0\n");

    for (i, frame) in frames.iter().enumerate() {
        let end = frames.get(i + 1).map(|f| f.at_secs).unwrap_or(total_secs);
        let duration = (end - frame.at_secs).max(0.001);
        manifest.push_str(&format!("file '{}'\nduration {:.6}\n", frame.file_name, duration));
    }
    if let Some(last) = frames.last() {
        manifest.push_str(&format!("file '{}'\n", last.file_name));
    }

    manifest
}
