//! External tool invocation
//!
//! Thin wrappers over `tokio::process::Command` for the ffprobe/ffmpeg
//! collaborators. Output is collected in full; tools are never streamed.

use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

/// Captured result of a finished tool run
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    /// Last non-empty stderr line, for error messages
    pub fn stderr_summary(&self) -> String {
        String::from_utf8_lossy(&self.stderr)
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("")
            .trim()
            .to_string()
    }
}

/// Check that `program -version` runs and exits successfully
pub async fn ensure_tool_available(program: &Path) -> io::Result<()> {
    let status = Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;

    if status.success() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("{} -version exited with {}", program.display(), status),
        ))
    }
}

/// Run `program` to completion and capture its output
pub async fn run_tool<I, A>(program: &Path, args: I) -> io::Result<ToolOutput>
where
    I: IntoIterator<Item = A>,
    A: AsRef<OsStr>,
{
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;

    Ok(ToolOutput {
        status: output.status,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_tool_is_not_found() {
        let err = ensure_tool_available(Path::new("/nonexistent/bin/ffprobe"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_run_tool_captures_stdout() {
        let output = run_tool(Path::new("sh"), ["-c", "printf hello; echo oops >&2; exit 3"])
            .await
            .unwrap();
        assert_eq!(output.stdout, b"hello");
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stderr_summary(), "oops");
    }
}
