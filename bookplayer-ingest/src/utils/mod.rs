//! Utility modules for bookplayer-ingest

pub mod process;

pub use process::{ensure_tool_available, run_tool, ToolOutput};
