//! Audiobook sink: last pipeline stage
//!
//! Persists each split audiobook through an [`AudiobookStore`] and emits a
//! [`PersistedAudiobook`] completion token. Nothing is emitted for an
//! audiobook the store rejected.

use crate::db::AudiobookStore;
use crate::error::StageResult;
use crate::models::{PersistedAudiobook, SplitResult};
use crate::pipeline::{Emitter, StageHandler};
use async_trait::async_trait;
use bookplayer_common::human_time::format_duration;
use tracing::info;

pub const STAGE_NAME: &str = "audiobook_sink";

/// Stage handler that stores processed audiobooks
pub struct AudiobookSink<S> {
    store: S,
}

impl<S: AudiobookStore> AudiobookSink<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S: AudiobookStore> StageHandler for AudiobookSink<S> {
    type Input = SplitResult;
    type Output = PersistedAudiobook;

    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    async fn handle(&mut self, input: SplitResult, emit: &Emitter<PersistedAudiobook>) -> StageResult<()> {
        let processed = input.into_processed();
        let id = self.store.insert_audiobook(&processed).await?;

        info!(
            stage = STAGE_NAME,
            id,
            title = %processed.info.title,
            author = %processed.info.author,
            duration = %format_duration(processed.info.duration),
            chapters = processed.chapter_count(),
            "Audiobook stored"
        );

        emit.emit(PersistedAudiobook {
            id,
            title: processed.info.title,
            chapter_count: processed.chapters.len(),
        })
        .await
    }

    async fn shutdown(&mut self) {
        self.store.close().await;
    }
}
