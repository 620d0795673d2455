//! In-memory collaborators for pipeline tests

use async_trait::async_trait;
use bookplayer_common::{Error, Result};
use bookplayer_ingest::db::AudiobookStore;
use bookplayer_ingest::models::{Audiobook, AudiobookInfo, Chapter, ProcessedAudiobook};
use bookplayer_ingest::services::chapter_splitter::{chapter_file_name, output_extension};
use bookplayer_ingest::services::{ChapterSegmenter, MetadataProbe, ProbeError, SegmentError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Probe that describes every file as a book titled after its stem
#[derive(Clone)]
pub struct FakeProbe {
    chapters: u32,
    failing: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeProbe {
    pub fn new(chapters: u32) -> Self {
        Self {
            chapters,
            failing: Arc::default(),
            calls: Arc::default(),
        }
    }

    /// Make probing `file_name` fail
    pub fn fail_on(&self, file_name: &str) {
        self.failing.lock().unwrap().insert(file_name.to_string());
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataProbe for FakeProbe {
    async fn probe(&self, path: &Path) -> std::result::Result<Audiobook, ProbeError> {
        self.calls.lock().unwrap().push(path.to_path_buf());

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        if self.failing.lock().unwrap().contains(&name) {
            return Err(ProbeError::ToolFailed {
                status: "exit status: 1".to_string(),
                stderr: format!("{}: Invalid data found when processing input", name),
            });
        }

        let title = path.file_stem().unwrap().to_string_lossy().into_owned();
        let chapters = (1..=self.chapters)
            .map(|n| Chapter {
                title: format!("Part {}", n),
                start_time: (n - 1) as f64 * 10.0,
                end_time: n as f64 * 10.0,
                ordinal: n,
            })
            .collect();

        Ok(Audiobook {
            info: AudiobookInfo {
                title,
                author: "Test Author".to_string(),
                duration: self.chapters as f64 * 10.0,
                ..Default::default()
            },
            chapters,
        })
    }
}

/// Segmenter that copies the source bytes into each chapter file
#[derive(Clone, Default)]
pub struct FakeSegmenter {
    /// Write one file fewer than requested
    pub drop_last: bool,
}

#[async_trait]
impl ChapterSegmenter for FakeSegmenter {
    async fn segment(
        &self,
        source: &Path,
        output_dir: &Path,
        chapters: &[Chapter],
    ) -> std::result::Result<Vec<PathBuf>, SegmentError> {
        let extension = output_extension(source);
        let count = if self.drop_last {
            chapters.len().saturating_sub(1)
        } else {
            chapters.len()
        };

        let audio = tokio::fs::read(source).await?;
        let mut paths = Vec::new();
        for chapter in &chapters[..count] {
            let path = output_dir.join(chapter_file_name(chapter.ordinal, &extension));
            tokio::fs::write(&path, &audio).await?;
            paths.push(path);
        }
        Ok(paths)
    }
}

/// Store that keeps audiobooks in a vector
#[derive(Clone, Default)]
pub struct MemoryStore {
    books: Arc<Mutex<Vec<ProcessedAudiobook>>>,
    reject: bool,
}

impl MemoryStore {
    /// Store whose inserts always fail
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn books(&self) -> Vec<ProcessedAudiobook> {
        self.books.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.books().into_iter().map(|b| b.info.title).collect()
    }

    pub fn len(&self) -> usize {
        self.books.lock().unwrap().len()
    }
}

#[async_trait]
impl AudiobookStore for MemoryStore {
    async fn insert_audiobook(&self, audiobook: &ProcessedAudiobook) -> Result<i64> {
        if self.reject {
            return Err(Error::Internal("store offline".to_string()));
        }
        let mut books = self.books.lock().unwrap();
        let id = books.len() as i64 + 1;
        let mut stored = audiobook.clone();
        stored.id = Some(id);
        books.push(stored);
        Ok(id)
    }

    async fn get_audiobook_by_id(&self, id: i64) -> Result<ProcessedAudiobook> {
        self.books
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.id == Some(id))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("audiobook {}", id)))
    }
}

/// Store whose inserts wait until [`GatedStore::open`] is called
#[derive(Clone, Default)]
pub struct GatedStore {
    inner: MemoryStore,
    open: Arc<AtomicBool>,
    opened: Arc<Notify>,
}

impl GatedStore {
    /// Let every waiting and future insert through
    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.opened.notify_waiters();
    }

    pub fn titles(&self) -> Vec<String> {
        self.inner.titles()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl AudiobookStore for GatedStore {
    async fn insert_audiobook(&self, audiobook: &ProcessedAudiobook) -> Result<i64> {
        loop {
            // Registered before the check so an open() in between is not missed
            let opened = self.opened.notified();
            if self.open.load(Ordering::SeqCst) {
                break;
            }
            opened.await;
        }
        self.inner.insert_audiobook(audiobook).await
    }

    async fn get_audiobook_by_id(&self, id: i64) -> Result<ProcessedAudiobook> {
        self.inner.get_audiobook_by_id(id).await
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub async fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
