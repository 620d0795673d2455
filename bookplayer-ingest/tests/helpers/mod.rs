//! Test Helper Utilities
//!
//! Shared fakes and utilities for testing bookplayer-ingest

#![allow(dead_code)]

pub mod fakes;
pub mod log_capture;

pub use fakes::{wait_until, FakeProbe, FakeSegmenter, GatedStore, MemoryStore};
pub use log_capture::{capture_logs, LogCapture};

use std::path::Path;

/// Write `contents` to `dir/name`, replacing any existing file
pub fn write_file(dir: &Path, name: &str, contents: &[u8]) {
    std::fs::write(dir.join(name), contents).unwrap();
}
