//! Directory watcher: change detection for the inbox directory
//!
//! Each trigger (timer tick or `Scan` command) lists the watched directory
//! non-recursively, hashes every media file and emits a
//! [`DiscoveryResult`] for names whose digest is new or different from the
//! table. A rename therefore shows up as a brand-new file.
//!
//! The digest is recorded only after the emission is accepted downstream.
//! If shutdown interrupts an emission the file is rediscovered next run.

use super::fingerprint::{hash_file_blocking, FingerprintStore, FingerprintTable, Observation};
use crate::error::{StageError, StageResult};
use crate::models::{DiscoveryResult, ScanTrigger};
use crate::pipeline::{CommandKind, Emitter, StageCommand, StageHandler};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub const STAGE_NAME: &str = "directory_watcher";

/// Outcome counters of one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Media files looked at
    pub examined: usize,
    /// Files emitted as new or changed
    pub discovered: usize,
    /// Files skipped because they could not be hashed
    pub unreadable: usize,
}

/// Stage handler that turns scan triggers into discoveries
pub struct DirectoryWatcher {
    directory: PathBuf,
    extension: String,
    table: FingerprintTable,
    store: FingerprintStore,
}

impl DirectoryWatcher {
    /// Create the watched directory if needed and load the fingerprint table
    pub fn new(
        directory: impl Into<PathBuf>,
        extension: &str,
        store: FingerprintStore,
    ) -> bookplayer_common::Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        let directory = std::fs::canonicalize(&directory)?;

        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        if extension.is_empty() {
            return Err(bookplayer_common::Error::Config(
                "media extension is empty".to_string(),
            ));
        }

        let table = store.load();
        info!(
            directory = %directory.display(),
            extension = %extension,
            known_files = table.len(),
            "Directory watcher ready"
        );

        Ok(Self {
            directory,
            extension,
            table,
            store,
        })
    }

    /// Absolute path of the watched directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn table(&self) -> &FingerprintTable {
        &self.table
    }

    fn is_media_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }

    /// Media files directly inside the directory, sorted by name
    async fn list_candidates(&self) -> std::io::Result<Vec<(String, PathBuf)>> {
        let mut entries = tokio::fs::read_dir(&self.directory).await?;
        let mut candidates = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !self.is_media_file(&path) {
                continue;
            }

            // Follows symlinks: a link to a regular file counts as one
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping entry");
                    continue;
                }
            }

            match entry.file_name().into_string() {
                Ok(name) => candidates.push((name, path)),
                Err(name) => warn!(name = ?name, "Skipping non UTF-8 file name"),
            }
        }

        candidates.sort();
        Ok(candidates)
    }

    /// Run one scan, emitting each new or changed file
    pub async fn scan(&mut self, emit: &Emitter<DiscoveryResult>) -> StageResult<ScanSummary> {
        let candidates = self.list_candidates().await?;
        let mut summary = ScanSummary {
            examined: candidates.len(),
            ..ScanSummary::default()
        };

        for (name, path) in candidates {
            let fingerprint = match hash_file_blocking(path.clone()).await {
                Ok(fp) => fp,
                Err(e) => {
                    summary.unreadable += 1;
                    warn!(stage = STAGE_NAME, path = %path.display(), error = %e, "Hash failed; skipping file");
                    continue;
                }
            };

            match self.table.observe(&name, &fingerprint) {
                Observation::Unchanged => continue,
                observation => {
                    debug!(path = %path.display(), ?observation, digest = %fingerprint, "File changed");
                }
            }

            emit.emit(DiscoveryResult { path }).await?;
            self.table.record(name, fingerprint);
            summary.discovered += 1;
        }

        debug!(
            stage = STAGE_NAME,
            examined = summary.examined,
            discovered = summary.discovered,
            unreadable = summary.unreadable,
            "Scan complete"
        );
        Ok(summary)
    }
}

#[async_trait]
impl StageHandler for DirectoryWatcher {
    type Input = ScanTrigger;
    type Output = DiscoveryResult;

    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    async fn handle(&mut self, _trigger: ScanTrigger, emit: &Emitter<DiscoveryResult>) -> StageResult<()> {
        self.scan(emit).await.map(|_| ())
    }

    fn command_kinds(&self) -> Vec<CommandKind> {
        vec![CommandKind::Scan]
    }

    async fn process_command(
        &mut self,
        command: StageCommand,
        emit: &Emitter<DiscoveryResult>,
    ) -> StageResult<()> {
        match command.kind() {
            CommandKind::Scan => {
                info!(stage = STAGE_NAME, "Scan requested");
                self.scan(emit).await.map(|_| ())
            }
            other => Err(StageError::Internal(format!("undeclared command kind {}", other))),
        }
    }

    async fn shutdown(&mut self) {
        match self.store.flush_blocking(&self.table).await {
            Ok(()) => info!(
                stage = STAGE_NAME,
                entries = self.table.len(),
                path = %self.store.path().display(),
                "Fingerprint table saved"
            ),
            Err(e) => error!(stage = STAGE_NAME, error = %e, "Failed to save fingerprint table"),
        }
    }
}
