//! Logging for reelcast.
//!
//! Two layers:
//! - process-wide `tracing` output, set up once by the binary ([`init_tracing`])
//! - one [`JobLogger`] per job, writing `<slug>_<id>.log` in the job directory
//!   with every line tagged by slide and stage
//!
//! # Example
//!
//! ```no_run
//! use reelcast_core::logging::{JobLogger, LogConfig, Stage};
//!
//! let logger = JobLogger::create("work/asha_1f2e3d4c/asha_1f2e3d4c.log", LogConfig::default(), None).unwrap();
//!
//! logger.begin_slide(0, 5, "slide_1.html");
//! logger.enter(Stage::Compose);
//! logger.command("ffmpeg -y -loop 1 -i slide_0.png ...");
//! logger.finish_slide(2.104);
//! ```

mod job_logger;
mod types;

use std::path::Path;

pub use job_logger::JobLogger;
pub use types::{LogCallback, LogConfig, LogLevel, Scope, SlideRef, Stage, ToolLine};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize global tracing subscriber for application-wide logging.
///
/// This sets up a subscriber that:
/// - Respects RUST_LOG environment variable
/// - Falls back to the provided default level
/// - Outputs to stderr with timestamps
/// - Optionally mirrors everything into a daily-rolling file under `log_dir`
///
/// Should be called once at application startup. Keep the returned guard
/// alive for as long as the file sink should keep flushing.
pub fn init_tracing(default_level: LogLevel, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()));

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "reelcast.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_ansi(false).with_writer(writer);

            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(filter)
                .init();
            None
        }
    }
}
