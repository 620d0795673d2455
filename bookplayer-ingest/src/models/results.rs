//! Values flowing along the pipeline links
//!
//! ```text
//! ScanTrigger -> DiscoveryResult -> MetadataResult -> SplitResult -> PersistedAudiobook
//! ```

use super::audiobook::{Audiobook, ProcessedAudiobook, ProcessedChapter};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Request for one directory scan (timer tick)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanTrigger;

/// New or changed media file found by the directory watcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    /// Absolute path
    pub path: PathBuf,
}

/// Metadata extracted from a discovered file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataResult {
    pub audiobook: Audiobook,
    pub source: PathBuf,
}

/// Result of splitting a source file into chapter files
///
/// `chapter_paths[i]` holds the audio of `audiobook.chapters[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitResult {
    pub audiobook: Audiobook,
    pub output_dir: PathBuf,
    pub chapter_paths: Vec<PathBuf>,
}

impl SplitResult {
    /// Pair each chapter with its file for the store
    pub fn into_processed(self) -> ProcessedAudiobook {
        let chapters = self
            .audiobook
            .chapters
            .into_iter()
            .zip(self.chapter_paths)
            .map(|(chapter, file_path)| ProcessedChapter { chapter, file_path })
            .collect();

        ProcessedAudiobook {
            id: None,
            info: self.audiobook.info,
            dir_path: self.output_dir,
            chapters,
            created_at: None,
        }
    }
}

/// Completion token emitted by the sink once an audiobook is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedAudiobook {
    pub id: i64,
    pub title: String,
    pub chapter_count: usize,
}
