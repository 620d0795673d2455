//! Error types for bookplayer-ingest
//!
//! Stage handlers classify every per-item failure as a [`StageError`]. The
//! stage loop logs it and drops the item; errors never travel downstream.

use crate::services::chapter_splitter::SegmentError;
use crate::services::metadata_extractor::ProbeError;
use thiserror::Error;

/// Per-item failure inside a pipeline stage
#[derive(Debug, Error)]
pub enum StageError {
    /// Filesystem failure (directory listing, output directory creation)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata collaborator could not describe the file
    #[error("Metadata probe failed: {0}")]
    Probe(#[from] ProbeError),

    /// Splitting collaborator failed or produced the wrong output
    #[error("Chapter split failed: {0}")]
    Split(#[from] SegmentError),

    /// Store rejected the audiobook; the transaction was rolled back
    #[error("Persistence failed: {0}")]
    Persist(#[from] bookplayer_common::Error),

    /// Input violates a stage precondition
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Emission abandoned because the pipeline is shutting down
    #[error("Emission cancelled by pipeline shutdown")]
    Cancelled,

    /// Downstream receiver is gone
    #[error("Downstream stage closed")]
    DownstreamClosed,

    /// Bug or broken invariant
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StageError {
    /// True for errors caused by shutdown rather than by the item itself
    pub fn is_shutdown(&self) -> bool {
        matches!(self, StageError::Cancelled | StageError::DownstreamClosed)
    }
}

/// Convenience result type for stage handlers
pub type StageResult<T> = Result<T, StageError>;
