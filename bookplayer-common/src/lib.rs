//! # Bookplayer Common Library
//!
//! Shared code for the bookplayer services:
//! - Error and result types
//! - TOML bootstrap configuration and path resolution
//! - Atomic file replacement
//! - SQLite pool initialization and schema
//! - Human-readable duration formatting

pub mod atomic;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod human_time;

pub use error::{Error, Result};
