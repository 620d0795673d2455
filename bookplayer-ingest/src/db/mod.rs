//! Audiobook persistence for bookplayer-ingest
//!
//! Schema creation lives in `bookplayer_common::db`; this module reads and
//! writes the rows.

pub mod audiobooks;
pub mod retry;

pub use audiobooks::{AudiobookStore, SqliteAudiobookStore};
pub use retry::retry_on_lock;
