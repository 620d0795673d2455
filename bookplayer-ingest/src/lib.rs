//! bookplayer-ingest: audiobook ingest pipeline
//!
//! Watches an inbox directory, extracts audiobook metadata with ffprobe,
//! splits each book into chapter files with ffmpeg and records the result
//! in SQLite. The engine in [`pipeline`] is generic over its stage handlers;
//! the handlers in [`services`] reach external tools through traits so
//! tests can substitute them.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod utils;

pub use crate::error::{StageError, StageResult};
pub use crate::pipeline::{PipelineHandle, PipelineOrchestrator, ShutdownReport};
