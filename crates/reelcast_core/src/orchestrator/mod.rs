//! Pipeline orchestrator for coordinating job execution.
//!
//! Every slide goes through the same chain, in declaration order:
//!
//! ```text
//! SlidePipeline
//!     ├── slide 0: markup → synthesize → probe → render → compose
//!     ├── slide 1: ...
//!     ├── slide n: ...
//!     └── concatenate segments → <output_folder>/<id>.mp4
//! ```
//!
//! The first failing slide stops the job. Artifacts already written stay in
//! the job directory; no final file is produced.
//!
//! # Example
//!
//! ```ignore
//! use reelcast_core::config::Settings;
//! use reelcast_core::jobs::{JobRequest, ReportKind};
//! use reelcast_core::orchestrator::{JobRunner, RunHooks};
//!
//! let runner = JobRunner::new(Settings::default());
//! let request = JobRequest::new(ReportKind::CreditReport, payload);
//! let result = runner.run(&request, RunHooks::default()).await;
//! println!("{:?}", result.output_path);
//! ```

mod errors;
mod job_runner;
mod pipeline;
mod types;

pub use errors::{FailureKind, PipelineError, PipelineResult, SlideError, SlideResult};
pub use job_runner::{AdapterFactory, JobResult, JobRunner, RunHooks, ToolchainFactory};
pub use pipeline::{Adapters, CancelHandle, SlidePipeline};
pub use types::{Context, JobPhase, JobState, PhaseRecord, ProgressCallback};
