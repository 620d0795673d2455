//! Audiobook metadata extraction
//!
//! The stage asks a [`MetadataProbe`] to describe each discovered file.
//! Production uses [`FfprobeProbe`]:
//!
//! ```text
//! ffprobe -v quiet -print_format json -show_format -show_chapters <file>
//! ```
//!
//! Tag mapping (container tags, matched case-insensitively):
//!
//! | tag        | field         |
//! |------------|---------------|
//! | `title`    | `title`       |
//! | `artist`   | `author`      |
//! | `composer` | `narrator`    |
//! | `comment`  | `description` |
//! | `genre`    | `genre`       |

use crate::error::{StageError, StageResult};
use crate::models::{Audiobook, AudiobookInfo, Chapter, DiscoveryResult, MetadataResult};
use crate::pipeline::{Emitter, StageHandler};
use crate::utils::{ensure_tool_available, run_tool};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const STAGE_NAME: &str = "metadata_extractor";

/// Default ffprobe executable, resolved through `PATH`
pub const FFPROBE_PROGRAM: &str = "ffprobe";

/// Metadata probe errors
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Probe executable missing or not runnable
    #[error("{program} not available: {source}")]
    ToolMissing {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Probe could not be started or its output read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Probe ran and reported failure
    #[error("probe exited with {status}: {stderr}")]
    ToolFailed { status: String, stderr: String },

    /// Probe output is not the expected JSON
    #[error("unexpected probe output: {0}")]
    InvalidOutput(String),
}

/// Describes a media file as an [`Audiobook`]
#[async_trait]
pub trait MetadataProbe: Send + Sync + 'static {
    async fn probe(&self, path: &Path) -> Result<Audiobook, ProbeError>;
}

/// ffprobe-backed [`MetadataProbe`]
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: PathBuf,
}

impl FfprobeProbe {
    /// Use `ffprobe` from `PATH`, failing if it cannot run
    pub async fn detect() -> Result<Self, ProbeError> {
        Self::detect_program(PathBuf::from(FFPROBE_PROGRAM)).await
    }

    pub async fn detect_program(program: PathBuf) -> Result<Self, ProbeError> {
        ensure_tool_available(&program)
            .await
            .map_err(|source| ProbeError::ToolMissing {
                program: program.display().to_string(),
                source,
            })?;
        debug!(program = %program.display(), "ffprobe available");
        Ok(Self { program })
    }
}

#[async_trait]
impl MetadataProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> Result<Audiobook, ProbeError> {
        let args: [&OsStr; 7] = [
            OsStr::new("-v"),
            OsStr::new("quiet"),
            OsStr::new("-print_format"),
            OsStr::new("json"),
            OsStr::new("-show_format"),
            OsStr::new("-show_chapters"),
            path.as_os_str(),
        ];
        let output = run_tool(&self.program, args).await?;

        if !output.status.success() {
            return Err(ProbeError::ToolFailed {
                status: output.status.to_string(),
                stderr: output.stderr_summary(),
            });
        }

        parse_ffprobe_output(&output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    chapters: Vec<FfprobeChapter>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeChapter {
    start_time: Option<String>,
    end_time: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

fn tag(tags: &HashMap<String, String>, key: &str) -> String {
    tags.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim().to_string())
        .unwrap_or_default()
}

fn parse_seconds(field: &str, value: Option<&str>) -> Result<f64, ProbeError> {
    let raw = value.ok_or_else(|| ProbeError::InvalidOutput(format!("missing {}", field)))?;
    let seconds: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ProbeError::InvalidOutput(format!("{} is not a number: {:?}", field, raw)))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ProbeError::InvalidOutput(format!("{} out of range: {}", field, raw)));
    }
    Ok(seconds)
}

/// Convert ffprobe JSON into an [`Audiobook`]
///
/// Chapter ordinals are assigned by position, starting at 1. A missing
/// format duration is recorded as zero.
pub fn parse_ffprobe_output(json: &[u8]) -> Result<Audiobook, ProbeError> {
    let output: FfprobeOutput =
        serde_json::from_slice(json).map_err(|e| ProbeError::InvalidOutput(e.to_string()))?;

    let format = output
        .format
        .ok_or_else(|| ProbeError::InvalidOutput("missing format section".to_string()))?;

    let duration = match format.duration.as_deref() {
        Some(raw) => parse_seconds("format.duration", Some(raw))?,
        None => 0.0,
    };

    let info = AudiobookInfo {
        title: tag(&format.tags, "title"),
        author: tag(&format.tags, "artist"),
        narrator: tag(&format.tags, "composer"),
        description: tag(&format.tags, "comment"),
        genre: tag(&format.tags, "genre"),
        duration,
    };

    let chapters = output
        .chapters
        .iter()
        .enumerate()
        .map(|(index, chapter)| {
            Ok::<_, ProbeError>(Chapter {
                title: tag(&chapter.tags, "title"),
                start_time: parse_seconds("chapter start_time", chapter.start_time.as_deref())?,
                end_time: parse_seconds("chapter end_time", chapter.end_time.as_deref())?,
                ordinal: index as u32 + 1,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Audiobook { info, chapters })
}

/// Fill gaps the container left and check chapter sanity
///
/// - Empty title: the file stem.
/// - No chapter markers: one chapter spanning the whole file.
/// - Empty chapter title: `Chapter N`.
fn normalize(mut audiobook: Audiobook, source: &Path) -> StageResult<Audiobook> {
    if audiobook.info.title.is_empty() {
        audiobook.info.title = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
    }

    if audiobook.chapters.is_empty() {
        if audiobook.info.duration <= 0.0 {
            return Err(StageError::InvalidInput(format!(
                "{} has neither chapters nor a duration",
                source.display()
            )));
        }
        audiobook.chapters.push(Chapter {
            title: audiobook.info.title.clone(),
            start_time: 0.0,
            end_time: audiobook.info.duration,
            ordinal: 1,
        });
    }

    audiobook.renumber_chapters();

    for chapter in &mut audiobook.chapters {
        if chapter.end_time < chapter.start_time {
            return Err(StageError::InvalidInput(format!(
                "chapter {} ends before it starts ({} < {})",
                chapter.ordinal, chapter.end_time, chapter.start_time
            )));
        }
        if chapter.title.is_empty() {
            chapter.title = format!("Chapter {}", chapter.ordinal);
        }
    }

    Ok(audiobook)
}

/// Stage handler that probes each discovered file
pub struct MetadataExtractor<P> {
    probe: P,
}

impl<P: MetadataProbe> MetadataExtractor<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl<P: MetadataProbe> StageHandler for MetadataExtractor<P> {
    type Input = DiscoveryResult;
    type Output = MetadataResult;

    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    async fn handle(&mut self, input: DiscoveryResult, emit: &Emitter<MetadataResult>) -> StageResult<()> {
        let source = input.path;
        let meta = tokio::fs::metadata(&source).await?;
        if !meta.is_file() {
            return Err(StageError::InvalidInput(format!(
                "{} is not a regular file",
                source.display()
            )));
        }

        let audiobook = self.probe.probe(&source).await?;
        let audiobook = normalize(audiobook, &source)?;

        info!(
            stage = STAGE_NAME,
            path = %source.display(),
            title = %audiobook.info.title,
            chapters = audiobook.chapters.len(),
            "Metadata extracted"
        );

        emit.emit(MetadataResult { audiobook, source }).await
    }
}
