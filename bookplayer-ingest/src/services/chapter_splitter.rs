//! Chapter splitting
//!
//! Each audiobook gets its own directory under the processed root, named
//! after its title, holding one file per chapter:
//!
//! ```text
//! processed_audiobooks/
//!   Dune/
//!     1.m4b
//!     2.m4b
//! ```
//!
//! The stage creates the directory and records the source file that owns it
//! in a `.source` marker. A directory is only reused for the same source;
//! another book with the same title gets `Dune (2)`, `Dune (3)` and so on.
//! A [`ChapterSegmenter`] writes the files.
//! Production uses ffmpeg's segment muxer with stream copy, so no audio is
//! re-encoded.

use crate::error::{StageError, StageResult};
use crate::models::{Chapter, MetadataResult, SplitResult};
use crate::pipeline::{Emitter, StageHandler};
use crate::utils::{ensure_tool_available, run_tool};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const STAGE_NAME: &str = "chapter_splitter";

/// Default ffmpeg executable, resolved through `PATH`
pub const FFMPEG_PROGRAM: &str = "ffmpeg";

const DEFAULT_EXTENSION: &str = "m4b";

/// File inside each output directory naming the source it was split from
pub const SOURCE_MARKER: &str = ".source";

/// Highest ` (N)` suffix tried before giving up on a title
const MAX_DIRECTORY_SUFFIX: u32 = 1000;

/// Chapter segmentation errors
#[derive(Debug, Error)]
pub enum SegmentError {
    /// Segmenter executable missing or not runnable
    #[error("{program} not available: {source}")]
    ToolMissing {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Segmenter could not be started
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Segmenter ran and reported failure
    #[error("segmenter exited with {status}: {stderr}")]
    ToolFailed { status: String, stderr: String },

    /// Segmenter finished but an expected chapter file is absent
    #[error("missing chapter file {0}")]
    MissingOutput(PathBuf),

    /// Output does not pair one file with each chapter
    #[error("expected {expected} chapter files, got {actual}")]
    ChapterCountMismatch { expected: usize, actual: usize },

    /// Nothing to split
    #[error("audiobook has no chapters")]
    NoChapters,
}

/// Writes one file per chapter into an existing directory
///
/// Returns the paths in chapter order. File names follow
/// [`chapter_file_name`].
#[async_trait]
pub trait ChapterSegmenter: Send + Sync + 'static {
    async fn segment(
        &self,
        source: &Path,
        output_dir: &Path,
        chapters: &[Chapter],
    ) -> Result<Vec<PathBuf>, SegmentError>;
}

/// `{ordinal}.{ext}`
pub fn chapter_file_name(ordinal: u32, extension: &str) -> String {
    format!("{}.{}", ordinal, extension)
}

/// Extension chapter files inherit from their source
pub fn output_extension(source: &Path) -> String {
    source
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Directory name for an audiobook title
///
/// Path separators and control characters become `_`; leading dots and
/// surrounding whitespace are stripped so the name stays inside the root.
pub fn directory_name_for(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = cleaned.trim().trim_start_matches('.').trim();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// ffmpeg-backed [`ChapterSegmenter`]
#[derive(Debug, Clone)]
pub struct FfmpegSegmenter {
    program: PathBuf,
}

impl FfmpegSegmenter {
    /// Use `ffmpeg` from `PATH`, failing if it cannot run
    pub async fn detect() -> Result<Self, SegmentError> {
        Self::detect_program(PathBuf::from(FFMPEG_PROGRAM)).await
    }

    pub async fn detect_program(program: PathBuf) -> Result<Self, SegmentError> {
        ensure_tool_available(&program)
            .await
            .map_err(|source| SegmentError::ToolMissing {
                program: program.display().to_string(),
                source,
            })?;
        debug!(program = %program.display(), "ffmpeg available");
        Ok(Self { program })
    }

    /// Command line for splitting `source` at the chapter boundaries
    ///
    /// A single chapter is a plain stream copy: the segment muxer would
    /// otherwise fall back to its fixed default segment length.
    pub fn build_args(source: &Path, output_dir: &Path, chapters: &[Chapter]) -> Vec<OsString> {
        let extension = output_extension(source);
        let first_ordinal = chapters.first().map(|c| c.ordinal).unwrap_or(1);

        let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y", "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(source.as_os_str().to_owned());
        for arg in ["-vn", "-acodec", "copy", "-map_chapters", "-1"] {
            args.push(arg.into());
        }

        if chapters.len() <= 1 {
            args.push(
                output_dir
                    .join(chapter_file_name(first_ordinal, &extension))
                    .into_os_string(),
            );
            return args;
        }

        // Boundaries are the ends of every chapter but the last
        let boundaries = chapters[..chapters.len() - 1]
            .iter()
            .map(|c| format!("{:.6}", c.end_time))
            .collect::<Vec<_>>()
            .join(",");

        for arg in [
            "-copyts",
            "-f",
            "segment",
            "-reset_timestamps",
            "1",
            "-segment_start_number",
        ] {
            args.push(arg.into());
        }
        args.push(first_ordinal.to_string().into());
        args.push("-segment_times".into());
        args.push(boundaries.into());
        args.push(output_dir.join(format!("%d.{}", extension)).into_os_string());
        args
    }
}

#[async_trait]
impl ChapterSegmenter for FfmpegSegmenter {
    async fn segment(
        &self,
        source: &Path,
        output_dir: &Path,
        chapters: &[Chapter],
    ) -> Result<Vec<PathBuf>, SegmentError> {
        if chapters.is_empty() {
            return Err(SegmentError::NoChapters);
        }

        let args = Self::build_args(source, output_dir, chapters);
        debug!(program = %self.program.display(), ?args, "Running segmenter");
        let output = run_tool(&self.program, &args).await?;

        if !output.status.success() {
            return Err(SegmentError::ToolFailed {
                status: output.status.to_string(),
                stderr: output.stderr_summary(),
            });
        }

        let extension = output_extension(source);
        let mut paths = Vec::with_capacity(chapters.len());
        for chapter in chapters {
            let path = output_dir.join(chapter_file_name(chapter.ordinal, &extension));
            if !tokio::fs::try_exists(&path).await? {
                return Err(SegmentError::MissingOutput(path));
            }
            paths.push(path);
        }
        Ok(paths)
    }
}

/// Stage handler that splits each audiobook into chapter files
pub struct ChapterSplitter<G> {
    segmenter: G,
    output_root: PathBuf,
}

impl<G: ChapterSegmenter> ChapterSplitter<G> {
    /// Create the processed root if needed
    pub fn new(segmenter: G, output_root: impl Into<PathBuf>) -> bookplayer_common::Result<Self> {
        let output_root = output_root.into();
        std::fs::create_dir_all(&output_root)?;
        Ok(Self {
            segmenter,
            output_root,
        })
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Output directory for `title`, owned by `source`
    ///
    /// Takes the first of `Title`, `Title (2)`, ... that is either free or
    /// already owned by `source`. Chapter files in a reused directory are
    /// overwritten.
    async fn prepare_output_dir(&self, title: &str, source: &Path) -> StageResult<PathBuf> {
        let base = directory_name_for(title);
        let owner = source.to_string_lossy();

        for n in 1..=MAX_DIRECTORY_SUFFIX {
            let name = if n == 1 {
                base.clone()
            } else {
                format!("{} ({})", base, n)
            };
            let dir = self.output_root.join(name);

            match tokio::fs::create_dir(&dir).await {
                Ok(()) => {
                    tokio::fs::write(dir.join(SOURCE_MARKER), owner.as_bytes()).await?;
                    return Ok(dir);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if directory_owner(&dir).await.as_deref() == Some(owner.as_ref()) {
                        debug!(dir = %dir.display(), "Reusing output directory");
                        return Ok(dir);
                    }
                    debug!(dir = %dir.display(), "Output directory taken by another source");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StageError::InvalidInput(format!(
            "no free output directory for {:?} under {}",
            title,
            self.output_root.display()
        )))
    }
}

/// Source recorded in `dir`, None for foreign directories and plain files
async fn directory_owner(dir: &Path) -> Option<String> {
    tokio::fs::read_to_string(dir.join(SOURCE_MARKER)).await.ok()
}

#[async_trait]
impl<G: ChapterSegmenter> StageHandler for ChapterSplitter<G> {
    type Input = MetadataResult;
    type Output = SplitResult;

    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    async fn handle(&mut self, input: MetadataResult, emit: &Emitter<SplitResult>) -> StageResult<()> {
        let MetadataResult { audiobook, source } = input;
        if audiobook.chapters.is_empty() {
            return Err(SegmentError::NoChapters.into());
        }

        let output_dir = self
            .prepare_output_dir(&audiobook.info.title, &source)
            .await?;
        let chapter_paths = self
            .segmenter
            .segment(&source, &output_dir, &audiobook.chapters)
            .await?;

        if chapter_paths.len() != audiobook.chapters.len() {
            return Err(SegmentError::ChapterCountMismatch {
                expected: audiobook.chapters.len(),
                actual: chapter_paths.len(),
            }
            .into());
        }

        info!(
            stage = STAGE_NAME,
            title = %audiobook.info.title,
            chapters = chapter_paths.len(),
            dir = %output_dir.display(),
            "Audiobook split"
        );

        emit.emit(SplitResult {
            audiobook,
            output_dir,
            chapter_paths,
        })
        .await
    }
}
