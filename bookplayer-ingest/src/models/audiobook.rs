//! Audiobook and chapter records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Descriptive fields shared by probed and processed audiobooks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudiobookInfo {
    pub title: String,
    pub author: String,
    pub narrator: String,
    pub description: String,
    pub genre: String,
    /// Total duration in seconds
    pub duration: f64,
}

/// One chapter marker inside the source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    /// Seconds from the start of the source file
    pub start_time: f64,
    /// Seconds from the start of the source file
    pub end_time: f64,
    /// 1-based position; contiguous within an audiobook
    pub ordinal: u32,
}

impl Chapter {
    pub fn duration(&self) -> f64 {
        (self.end_time - self.start_time).max(0.0)
    }
}

/// Audiobook as described by the metadata probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Audiobook {
    pub info: AudiobookInfo,
    /// Ordered by ordinal
    pub chapters: Vec<Chapter>,
}

impl Audiobook {
    /// Reassign ordinals 1..=n in current order
    pub fn renumber_chapters(&mut self) {
        for (index, chapter) in self.chapters.iter_mut().enumerate() {
            chapter.ordinal = index as u32 + 1;
        }
    }

    /// True when ordinals are exactly 1..=n in order
    pub fn has_contiguous_ordinals(&self) -> bool {
        self.chapters
            .iter()
            .enumerate()
            .all(|(index, chapter)| chapter.ordinal == index as u32 + 1)
    }
}

/// Chapter after splitting, with the file holding its audio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedChapter {
    pub chapter: Chapter,
    pub file_path: PathBuf,
}

/// Audiobook as written to and read back from the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedAudiobook {
    /// Store-assigned id, None before insertion
    pub id: Option<i64>,
    pub info: AudiobookInfo,
    /// Directory holding the chapter files
    pub dir_path: PathBuf,
    pub chapters: Vec<ProcessedChapter>,
    /// Set by the store on insertion
    pub created_at: Option<DateTime<Utc>>,
}

impl ProcessedAudiobook {
    pub fn chapter_count(&self) -> usize {
        self.chapters.len()
    }
}
