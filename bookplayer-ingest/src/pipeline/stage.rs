//! Pipeline stage: one handler, one loop, owned channels
//!
//! **State machine**
//!
//! ```text
//! Idle ──input──> Processing ──done──> Idle
//! Idle ──command (declared kind)──> Processing ──done──> Idle
//! Idle ──cancel──> ShuttingDown ──shutdown()──> Terminated
//! ```
//!
//! Cancellation is observed only between work items: a handler call that
//! is in flight runs to completion (emissions inside it give up early with
//! [`StageError::Cancelled`](crate::error::StageError::Cancelled)).

use super::command::{CommandKind, StageCommand};
use super::handler::{Emitter, StageHandler};
use std::collections::HashSet;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Counters reported once when a stage terminates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    pub stage: &'static str,
    /// Inputs handled without error
    pub items_processed: u64,
    /// Inputs whose handler returned an error
    pub items_failed: u64,
    /// Commands dispatched to the handler
    pub commands_processed: u64,
    /// Commands discarded because the kind was not declared
    pub commands_ignored: u64,
}

/// Channel ends the orchestrator uses to drive a stage
#[derive(Debug)]
pub struct StageEndpoints<I, O> {
    pub input: mpsc::Sender<I>,
    pub commands: mpsc::Sender<StageCommand>,
    pub output: mpsc::Receiver<O>,
    /// Resolves once the stage has terminated
    pub done: oneshot::Receiver<StageReport>,
}

/// Runtime wrapper around a [`StageHandler`]
pub struct Stage<H: StageHandler> {
    handler: H,
    input_rx: mpsc::Receiver<H::Input>,
    command_rx: mpsc::Receiver<StageCommand>,
    emitter: Emitter<H::Output>,
    done_tx: oneshot::Sender<StageReport>,
    cancel: CancellationToken,
    report: StageReport,
}

impl<H: StageHandler> Stage<H> {
    /// Build a stage and the endpoints that feed and drain it
    pub fn new(
        handler: H,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, StageEndpoints<H::Input, H::Output>) {
        let (input_tx, input_rx) = mpsc::channel(capacity);
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let (emitter, output_rx) = Emitter::channel(capacity, cancel.clone());
        let (done_tx, done_rx) = oneshot::channel();

        let report = StageReport {
            stage: handler.name(),
            ..StageReport::default()
        };

        let stage = Self {
            handler,
            input_rx,
            command_rx,
            emitter,
            done_tx,
            cancel,
            report,
        };

        let endpoints = StageEndpoints {
            input: input_tx,
            commands: command_tx,
            output: output_rx,
            done: done_rx,
        };

        (stage, endpoints)
    }

    pub fn name(&self) -> &'static str {
        self.report.stage
    }

    /// Run the loop on a new task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Serve inputs and commands until cancelled
    pub async fn run(mut self) {
        let stage = self.name();
        let accepted: HashSet<CommandKind> = self.handler.command_kinds().into_iter().collect();
        let mut input_open = true;
        let mut commands_open = true;

        info!(stage, commands = ?accepted, "Stage started");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                command = self.command_rx.recv(), if commands_open => match command {
                    Some(command) => self.dispatch_command(command, &accepted).await,
                    None => {
                        debug!(stage, "Command channel closed");
                        commands_open = false;
                    }
                },

                input = self.input_rx.recv(), if input_open => match input {
                    Some(input) => self.process_input(input).await,
                    None => {
                        debug!(stage, "Upstream closed");
                        input_open = false;
                    }
                },
            }
        }

        info!(stage, "Stage shutting down");
        self.handler.shutdown().await;

        let Stage {
            emitter,
            done_tx,
            report,
            ..
        } = self;

        // Closing the output lets the downstream reader observe termination
        drop(emitter);

        info!(
            stage,
            processed = report.items_processed,
            failed = report.items_failed,
            commands = report.commands_processed,
            "Stage terminated"
        );

        if done_tx.send(report).is_err() {
            debug!(stage, "Nobody waiting for stage completion");
        }
    }

    async fn process_input(&mut self, input: H::Input) {
        match self.handler.handle(input, &self.emitter).await {
            Ok(()) => self.report.items_processed += 1,
            Err(e) if e.is_shutdown() => {
                self.report.items_failed += 1;
                debug!(stage = self.report.stage, error = %e, "Item abandoned at shutdown");
            }
            Err(e) => {
                self.report.items_failed += 1;
                warn!(stage = self.report.stage, error = %e, "Item dropped");
            }
        }
    }

    async fn dispatch_command(&mut self, command: StageCommand, accepted: &HashSet<CommandKind>) {
        let stage = self.report.stage;

        if !accepted.contains(command.kind()) {
            self.report.commands_ignored += 1;
            trace!(stage, kind = %command.kind(), "Command ignored");
            return;
        }

        let kind = command.kind().clone();
        debug!(stage, %kind, "Processing command");
        self.report.commands_processed += 1;

        if let Err(e) = self.handler.process_command(command, &self.emitter).await {
            if e.is_shutdown() {
                debug!(stage, %kind, error = %e, "Command abandoned at shutdown");
            } else {
                warn!(stage, %kind, error = %e, "Command failed");
            }
        }
    }
}
