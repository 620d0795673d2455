//! Splitter and Sink Handler Tests
//!
//! Drives the handlers directly to check what reaches (or never reaches)
//! the next link.

mod helpers;

use bookplayer_ingest::error::StageError;
use bookplayer_ingest::models::{Audiobook, AudiobookInfo, Chapter, MetadataResult, SplitResult};
use bookplayer_ingest::pipeline::{Emitter, StageHandler};
use bookplayer_ingest::services::{AudiobookSink, ChapterSplitter, SegmentError};
use helpers::{FakeSegmenter, MemoryStore};
use std::path::PathBuf;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn audiobook(title: &str, chapters: u32) -> Audiobook {
    Audiobook {
        info: AudiobookInfo {
            title: title.to_string(),
            duration: chapters as f64 * 30.0,
            ..Default::default()
        },
        chapters: (1..=chapters)
            .map(|n| Chapter {
                title: format!("Chapter {}", n),
                start_time: (n - 1) as f64 * 30.0,
                end_time: n as f64 * 30.0,
                ordinal: n,
            })
            .collect(),
    }
}

fn metadata(dir: &TempDir, title: &str, chapters: u32) -> MetadataResult {
    metadata_from(dir, &format!("{}.m4b", title), b"source", title, chapters)
}

fn metadata_from(
    dir: &TempDir,
    file_name: &str,
    audio: &[u8],
    title: &str,
    chapters: u32,
) -> MetadataResult {
    let source = dir.path().join(file_name);
    std::fs::write(&source, audio).unwrap();
    MetadataResult {
        audiobook: audiobook(title, chapters),
        source,
    }
}

#[tokio::test]
async fn test_splitter_creates_title_directory_with_one_file_per_chapter() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("processed");
    let mut splitter = ChapterSplitter::new(FakeSegmenter::default(), &root).unwrap();
    let (emit, mut rx) = Emitter::channel(1, CancellationToken::new());

    splitter.handle(metadata(&dir, "Persuasion", 5), &emit).await.unwrap();

    let split = rx.try_recv().unwrap();
    assert_eq!(split.output_dir, root.join("Persuasion"));
    assert_eq!(split.chapter_paths.len(), 5);
    for (chapter, path) in split.audiobook.chapters.iter().zip(&split.chapter_paths) {
        assert_eq!(path, &root.join("Persuasion").join(format!("{}.m4b", chapter.ordinal)));
        assert!(path.exists());
    }
}

#[tokio::test]
async fn test_splitter_reuses_existing_title_directory() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("processed");
    let mut splitter = ChapterSplitter::new(FakeSegmenter::default(), &root).unwrap();
    let (emit, mut rx) = Emitter::channel(2, CancellationToken::new());

    splitter.handle(metadata(&dir, "Twice", 2), &emit).await.unwrap();
    splitter.handle(metadata(&dir, "Twice", 2), &emit).await.unwrap();

    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_ok());
}

#[tokio::test]
async fn test_splitter_rejects_short_output() {
    let dir = TempDir::new().unwrap();
    let segmenter = FakeSegmenter { drop_last: true };
    let mut splitter = ChapterSplitter::new(segmenter, dir.path().join("processed")).unwrap();
    let (emit, mut rx) = Emitter::channel(1, CancellationToken::new());

    let result = splitter.handle(metadata(&dir, "Short", 3), &emit).await;

    assert!(matches!(
        result,
        Err(StageError::Split(SegmentError::ChapterCountMismatch {
            expected: 3,
            actual: 2
        }))
    ));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_same_title_from_two_sources_gets_two_directories() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("processed");
    let mut splitter = ChapterSplitter::new(FakeSegmenter::default(), &root).unwrap();
    let (emit, mut rx) = Emitter::channel(3, CancellationToken::new());

    // Given: two different files that both claim the same title
    let poe = metadata_from(&dir, "poe.m4b", b"POE AUDIO", "Collected Stories", 2);
    let lovecraft = metadata_from(&dir, "lovecraft.m4b", b"LOVECRAFT AUDIO", "Collected Stories", 2);

    // When: both are split, then the first is split again
    splitter.handle(poe.clone(), &emit).await.unwrap();
    splitter.handle(lovecraft, &emit).await.unwrap();
    splitter.handle(poe, &emit).await.unwrap();

    // Then: each source keeps its own directory and audio
    let first = rx.try_recv().unwrap();
    let second = rx.try_recv().unwrap();
    let again = rx.try_recv().unwrap();
    assert_eq!(first.output_dir, root.join("Collected Stories"));
    assert_eq!(second.output_dir, root.join("Collected Stories (2)"));
    assert_eq!(again.output_dir, first.output_dir);
    assert_ne!(first.chapter_paths[0], second.chapter_paths[0]);
    assert_eq!(std::fs::read(&first.chapter_paths[0]).unwrap(), b"POE AUDIO");
    assert_eq!(std::fs::read(&second.chapter_paths[0]).unwrap(), b"LOVECRAFT AUDIO");
}

#[tokio::test]
async fn test_splitter_skips_title_taken_by_file_or_foreign_directory() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("processed");
    std::fs::create_dir_all(root.join("Clash (2)")).unwrap();
    std::fs::write(root.join("Clash"), b"not a directory").unwrap();
    let mut splitter = ChapterSplitter::new(FakeSegmenter::default(), &root).unwrap();
    let (emit, mut rx) = Emitter::channel(1, CancellationToken::new());

    splitter.handle(metadata(&dir, "Clash", 1), &emit).await.unwrap();

    let split = rx.try_recv().unwrap();
    assert_eq!(split.output_dir, root.join("Clash (3)"));
    assert!(std::fs::read_dir(root.join("Clash (2)")).unwrap().next().is_none());
}

#[tokio::test]
async fn test_sink_emits_completion_token() {
    let store = MemoryStore::default();
    let mut sink = AudiobookSink::new(store.clone());
    let (emit, mut rx) = Emitter::channel(1, CancellationToken::new());
    let split = SplitResult {
        audiobook: audiobook("Middlemarch", 2),
        output_dir: PathBuf::from("/processed/Middlemarch"),
        chapter_paths: vec![
            PathBuf::from("/processed/Middlemarch/1.m4b"),
            PathBuf::from("/processed/Middlemarch/2.m4b"),
        ],
    };

    sink.handle(split, &emit).await.unwrap();

    let token = rx.try_recv().unwrap();
    assert_eq!(token.id, 1);
    assert_eq!(token.title, "Middlemarch");
    assert_eq!(token.chapter_count, 2);
    assert_eq!(store.books()[0].chapters[1].file_path, PathBuf::from("/processed/Middlemarch/2.m4b"));
}

#[tokio::test]
async fn test_sink_emits_nothing_when_store_rejects() {
    let mut sink = AudiobookSink::new(MemoryStore::rejecting());
    let (emit, mut rx) = Emitter::channel(1, CancellationToken::new());
    let split = SplitResult {
        audiobook: audiobook("Lost", 1),
        output_dir: PathBuf::from("/processed/Lost"),
        chapter_paths: vec![PathBuf::from("/processed/Lost/1.m4b")],
    };

    let result = sink.handle(split, &emit).await;

    assert!(matches!(result, Err(StageError::Persist(_))));
    assert!(rx.try_recv().is_err());
}
