//! Atomic whole-file replacement
//!
//! Writes go to a temporary file in the target's directory which is then
//! renamed over the target, so readers observe either the previous contents
//! or the new contents, never a partial write.

use crate::{Error, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace `path` with `contents` in a single rename
///
/// Creates the parent directory if it does not exist.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(contents)?;
    temp.flush()?;
    temp.as_file().sync_all()?;

    temp.persist(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.error.kind(),
            format!("Failed to replace {}: {}", path.display(), e.error),
        ))
    })?;

    tracing::debug!(path = %path.display(), bytes = contents.len(), "Atomic write complete");
    Ok(())
}
