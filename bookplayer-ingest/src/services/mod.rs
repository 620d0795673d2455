//! Stage handlers and their collaborators
//!
//! One module per pipeline stage, plus the fingerprinting used by the
//! directory watcher.

pub mod audiobook_sink;
pub mod chapter_splitter;
pub mod directory_watcher;
pub mod fingerprint;
pub mod metadata_extractor;

pub use audiobook_sink::AudiobookSink;
pub use chapter_splitter::{ChapterSegmenter, ChapterSplitter, FfmpegSegmenter, SegmentError};
pub use directory_watcher::{DirectoryWatcher, ScanSummary};
pub use fingerprint::{Fingerprint, FingerprintStore, FingerprintTable, Observation};
pub use metadata_extractor::{FfprobeProbe, MetadataExtractor, MetadataProbe, ProbeError};
