//! Stage handler trait and the emission path shared by all stages

use super::command::{CommandKind, StageCommand};
use crate::error::{StageError, StageResult};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Domain logic of one pipeline stage
///
/// The owning [`Stage`](super::Stage) calls at most one method at a time,
/// so implementations hold their state in `&mut self` without locks.
#[async_trait]
pub trait StageHandler: Send + 'static {
    /// Item type taken from the upstream link
    type Input: Send + 'static;
    /// Item type passed to the downstream link
    type Output: Send + 'static;

    /// Stage name for logs and completion reports
    fn name(&self) -> &'static str;

    /// Process one input, emitting zero or more outputs
    async fn handle(&mut self, input: Self::Input, emit: &Emitter<Self::Output>) -> StageResult<()>;

    /// Command kinds this stage reacts to
    fn command_kinds(&self) -> Vec<CommandKind> {
        Vec::new()
    }

    /// React to a command whose kind is in [`command_kinds`](Self::command_kinds)
    async fn process_command(
        &mut self,
        command: StageCommand,
        emit: &Emitter<Self::Output>,
    ) -> StageResult<()> {
        let _ = (command, emit);
        Ok(())
    }

    /// Release resources; called exactly once, before the stage terminates
    async fn shutdown(&mut self) {}
}

/// Sending half of a stage's output link
///
/// Emission waits for the downstream slot or for pipeline cancellation,
/// whichever comes first.
#[derive(Debug)]
pub struct Emitter<T> {
    tx: mpsc::Sender<T>,
    cancel: CancellationToken,
}

impl<T: Send> Emitter<T> {
    pub fn new(tx: mpsc::Sender<T>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Emitter plus the receiver for its items
    pub fn channel(capacity: usize, cancel: CancellationToken) -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx, cancel), rx)
    }

    /// Send one item downstream
    ///
    /// Returns [`StageError::Cancelled`] if the pipeline is cancelled before
    /// the item is accepted and [`StageError::DownstreamClosed`] if the
    /// receiver is gone.
    pub async fn emit(&self, item: T) -> StageResult<()> {
        if self.cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }

        tokio::select! {
            result = self.tx.send(item) => result.map_err(|_| StageError::DownstreamClosed),
            _ = self.cancel.cancelled() => Err(StageError::Cancelled),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
