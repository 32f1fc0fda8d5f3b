//! reelcast core - narrated slide videos from report payloads
//!
//! This crate holds the whole pipeline with no CLI dependencies: job kinds
//! declare slide decks, adapters render, speak, probe and encode, and the
//! orchestrator drives each job from payload to final video.

pub mod assets;
pub mod compose;
pub mod config;
pub mod io;
pub mod jobs;
pub mod logging;
pub mod media;
pub mod models;
pub mod narration;
pub mod orchestrator;
pub mod render;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
