//! Per-job log file with slide and stage scoping.
//!
//! Every line carries the slide and stage the pipeline is in. External tool
//! output is remembered under the same scope, so when a tool fails the log
//! shows what that step printed and nothing from earlier slides.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{format_line, LogCallback, LogConfig, LogLevel, Scope, SlideRef, Stage, ToolLine};

pub struct JobLogger {
    log_path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
    callback: Option<LogCallback>,
    config: LogConfig,
    scope: Mutex<Scope>,
    tail: Mutex<VecDeque<ToolLine>>,
    last_progress: Mutex<Option<u32>>,
}

impl JobLogger {
    /// Create (or truncate) the log at `log_path`, creating its directory.
    pub fn create(
        log_path: impl Into<PathBuf>,
        config: LogConfig,
        callback: Option<LogCallback>,
    ) -> io::Result<Self> {
        let log_path = log_path.into();
        if let Some(dir) = log_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = File::create(&log_path)?;

        Ok(Self {
            log_path,
            writer: Mutex::new(Some(BufWriter::new(file))),
            callback,
            tail: Mutex::new(VecDeque::with_capacity(config.error_tail)),
            config,
            scope: Mutex::new(Scope::default()),
            last_progress: Mutex::new(None),
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn scope(&self) -> Scope {
        self.scope.lock().clone()
    }

    /// Start slide `index` of `total`. Following lines carry its label.
    pub fn begin_slide(&self, index: usize, total: usize, template_id: &str) {
        *self.scope.lock() = Scope {
            slide: Some(SlideRef {
                index,
                total,
                template_id: template_id.to_string(),
            }),
            stage: Stage::Markup,
        };
        self.info(&format!("=== {} ===", template_id));
    }

    /// Move to `stage`, staying on the current slide if there is one.
    pub fn enter(&self, stage: Stage) {
        self.scope.lock().stage = stage;
    }

    /// Record the finished segment and leave the slide.
    pub fn finish_slide(&self, duration_secs: f64) {
        self.info(&format!("Segment ready ({:.3}s)", duration_secs));
        self.scope.lock().slide = None;
    }

    /// Job-level banner; leaves any slide scope.
    pub fn heading(&self, stage: Stage, title: &str) {
        *self.scope.lock() = Scope { slide: None, stage };
        self.info(&format!("=== {} ===", title));
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }
        let line = {
            let scope = self.scope.lock();
            format_line(&timestamp(), &scope, level, message)
        };
        self.write(&line);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Log a command line about to run.
    pub fn command(&self, command: &str) {
        self.info(&format!("$ {}", command));
    }

    /// Remember one line of tool output under the current scope.
    ///
    /// Echoed to the log only when compact mode is off.
    pub fn tool_line(&self, text: &str, stderr: bool) {
        let scope = self.scope();
        {
            let mut tail = self.tail.lock();
            while tail.len() >= self.config.error_tail.max(1) {
                tail.pop_front();
            }
            tail.push_back(ToolLine {
                slide: scope.slide_index(),
                stage: scope.stage,
                stderr,
                text: text.to_string(),
            });
        }

        if !self.config.compact {
            let stream = if stderr { "stderr" } else { "stdout" };
            self.debug(&format!("{}: {}", stream, text));
        }
    }

    /// After a failure of `tool`, write what it printed in the current scope.
    pub fn show_tail(&self, tool: &str) {
        let scope = self.scope();
        let lines: Vec<String> = self
            .tail()
            .into_iter()
            .filter(|line| line.belongs_to(&scope))
            .map(|line| line.text)
            .collect();
        if lines.is_empty() {
            return;
        }

        self.log(
            LogLevel::Error,
            &format!("{} output (last {} lines):", tool, lines.len()),
        );
        for line in lines {
            self.write(&format!("    {}", line));
        }
    }

    /// Remembered tool output, oldest first.
    pub fn tail(&self) -> Vec<ToolLine> {
        self.tail.lock().iter().cloned().collect()
    }

    /// Log overall job progress.
    ///
    /// In compact mode a value is only logged when it crosses the next
    /// multiple of `progress_step` (or first reaches 100). Returns whether
    /// a line was written.
    pub fn progress(&self, percent: u32, message: &str) -> bool {
        {
            let mut last = self.last_progress.lock();
            if self.config.compact {
                let step = self.config.progress_step.max(1);
                let due = match *last {
                    None => true,
                    Some(prev) => percent / step > prev / step || (percent >= 100 && prev < 100),
                };
                if !due {
                    return false;
                }
            }
            *last = Some(percent);
        }

        self.info(&format!("Progress {}%: {}", percent, message));
        true
    }

    pub fn flush(&self) {
        if let Some(writer) = self.writer.lock().as_mut() {
            let _ = writer.flush();
        }
    }

    /// Flush and release the file. Later lines only reach the callback.
    pub fn close(&self) {
        self.flush();
        *self.writer.lock() = None;
    }

    fn write(&self, line: &str) {
        if let Some(writer) = self.writer.lock().as_mut() {
            let _ = writeln!(writer, "{}", line);
        }
        if let Some(callback) = &self.callback {
            callback(line);
        }
    }
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

impl Drop for JobLogger {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for JobLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobLogger")
            .field("log_path", &self.log_path)
            .field("scope", &self.scope.lock().label())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn logger_in(dir: &Path, config: LogConfig) -> JobLogger {
        JobLogger::create(dir.join("asha_0a1b2c3d.log"), config, None).unwrap()
    }

    #[test]
    fn creates_log_file_and_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("asha_0a1b2c3d").join("asha_0a1b2c3d.log");
        let logger = JobLogger::create(&path, LogConfig::default(), None).unwrap();

        assert_eq!(logger.log_path(), path.as_path());
        assert!(path.exists());
    }

    #[test]
    fn lines_are_tagged_with_slide_and_stage() {
        let dir = tempdir().unwrap();
        let logger = logger_in(dir.path(), LogConfig::default());

        logger.heading(Stage::Setup, "Job 0a1b2c3d (credit-report)");
        logger.begin_slide(1, 5, "slide_2.html");
        logger.enter(Stage::Render);
        logger.info("Visual captured");
        logger.finish_slide(2.104);
        logger.heading(Stage::Concat, "Concatenating");
        logger.flush();

        let content = fs::read_to_string(logger.log_path()).unwrap();
        assert!(content.contains("[setup] === Job 0a1b2c3d (credit-report) ==="));
        assert!(content.contains("[slide 2/5 markup] === slide_2.html ==="));
        assert!(content.contains("[slide 2/5 render] Visual captured"));
        assert!(content.contains("[slide 2/5 render] Segment ready (2.104s)"));
        assert!(content.contains("[concat] === Concatenating ==="));
    }

    #[test]
    fn failure_tail_shows_only_the_failing_step() {
        let dir = tempdir().unwrap();
        let lines = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&lines);
        let callback: LogCallback = Box::new(move |line| sink.lock().push(line.to_string()));
        let logger = JobLogger::create(
            dir.path().join("job.log"),
            LogConfig::default(),
            Some(callback),
        )
        .unwrap();

        logger.begin_slide(0, 2, "slide_1.html");
        logger.enter(Stage::Probe);
        logger.tool_line("Duration: 00:00:02.10", false);
        logger.begin_slide(1, 2, "slide_2.html");
        logger.enter(Stage::Compose);
        logger.tool_line("Invalid data found when processing input", true);
        logger.show_tail("ffmpeg");

        let logged = lines.lock().join("\n");
        assert!(logged.contains("[slide 2/2 compose] ERROR: ffmpeg output (last 1 lines):"));
        assert!(logged.contains("    Invalid data found when processing input"));
        assert!(!logged.contains("Duration: 00:00:02.10"));

        let tail = logger.tail();
        assert_eq!(tail.len(), 2);
        assert_eq!((tail[1].slide, tail[1].stage, tail[1].stderr), (Some(1), Stage::Compose, true));
    }

    #[test]
    fn callback_respects_level() {
        let dir = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let callback: LogCallback = Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let logger =
            JobLogger::create(dir.path().join("job.log"), LogConfig::default(), Some(callback))
                .unwrap();

        logger.info("Subject: Asha");
        logger.debug("filtered at info level");
        logger.warn("Failed to write job state");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn compact_progress_logs_at_step_boundaries() {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            progress_step: 25,
            ..LogConfig::default()
        };
        let logger = logger_in(dir.path(), config);

        // A five-slide deck reports 0, 16, 33, 50, 66, 83, then 100
        let logged: Vec<bool> = [0, 16, 33, 50, 66, 83, 100]
            .iter()
            .map(|&p| logger.progress(p, "Slides"))
            .collect();
        assert_eq!(logged, vec![true, false, true, true, false, true, true]);
        assert!(!logger.progress(100, "Complete"));
    }

    #[test]
    fn verbose_mode_logs_every_progress_and_tool_line() {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            compact: false,
            level: LogLevel::Debug,
            ..LogConfig::default()
        };
        let logger = logger_in(dir.path(), config);

        assert!(logger.progress(16, "Slide 2 of 5"));
        assert!(logger.progress(17, "Slide 2 of 5"));
        logger.tool_line("frame=  25 fps=0.0", true);
        logger.flush();

        let content = fs::read_to_string(logger.log_path()).unwrap();
        assert!(content.contains("stderr: frame=  25 fps=0.0"));
    }

    #[test]
    fn tail_keeps_the_most_recent_lines() {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            error_tail: 5,
            ..LogConfig::default()
        };
        let logger = logger_in(dir.path(), config);

        for i in 0..10 {
            logger.tool_line(&format!("frame={}", i), true);
        }

        let tail = logger.tail();
        assert_eq!(tail.len(), 5);
        assert_eq!(tail[0].text, "frame=5");
        assert_eq!(tail[4].text, "frame=9");
    }
}
