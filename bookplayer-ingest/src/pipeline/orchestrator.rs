//! Pipeline orchestrator
//!
//! Builds the four ingest stages, starts them with the command router, and
//! runs the coordination loop that moves items along the links:
//!
//! ```text
//! timer ──ScanTrigger──> watcher ──DiscoveryResult──> extractor
//!     ──MetadataResult──> splitter ──SplitResult──> sink ──PersistedAudiobook──> log
//! ```
//!
//! **Backpressure:** the loop holds at most one item per link. While that
//! item waits for the downstream stage the loop stops reading the upstream
//! output, so the upstream stage blocks in `emit`. The loop itself never
//! awaits a single link, so a slow stage cannot stall the others.

use super::command::StageCommand;
use super::handler::StageHandler;
use super::router::CommandRouter;
use super::stage::{Stage, StageReport};
use super::CHANNEL_CAPACITY;
use crate::models::{DiscoveryResult, MetadataResult, PersistedAudiobook, ScanTrigger, SplitResult};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What the pipeline did, returned once every task has stopped
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    /// One report per stage, in pipeline order
    pub stages: Vec<StageReport>,
    /// Commands broadcast by the router
    pub commands_routed: u64,
    /// Completion tokens received from the sink
    pub audiobooks_persisted: u64,
    /// Timer ticks that became watcher triggers
    pub scans_triggered: u64,
    /// Timer ticks dropped because a trigger was already pending
    pub ticks_dropped: u64,
}

impl ShutdownReport {
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.stage == name)
    }
}

/// Control handle for a running pipeline
#[derive(Debug)]
pub struct PipelineHandle {
    commands: mpsc::Sender<StageCommand>,
    cancel: CancellationToken,
    task: JoinHandle<ShutdownReport>,
}

impl PipelineHandle {
    /// Submit a command for broadcast to every stage
    ///
    /// Fails (returning the command) once the router has stopped.
    pub async fn send_command(&self, command: StageCommand) -> Result<(), StageCommand> {
        self.commands.send(command).await.map_err(|e| e.0)
    }

    /// Submit a command without waiting
    ///
    /// Fails with `Full` while the router is still delivering earlier
    /// commands to busy stages.
    pub fn try_send_command(
        &self,
        command: StageCommand,
    ) -> Result<(), mpsc::error::TrySendError<StageCommand>> {
        self.commands.try_send(command)
    }

    /// Extra sender for components that submit commands independently
    pub fn command_sender(&self) -> mpsc::Sender<StageCommand> {
        self.commands.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the pipeline and wait for every stage to terminate
    pub async fn shutdown(self) -> ShutdownReport {
        self.cancel.cancel();
        self.wait().await
    }

    /// Wait for the pipeline to stop without cancelling it
    pub async fn wait(self) -> ShutdownReport {
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Coordination task failed");
                ShutdownReport::default()
            }
        }
    }
}

/// Owns the four stage handlers until the pipeline is started
pub struct PipelineOrchestrator<W, M, S, K> {
    watcher: W,
    extractor: M,
    splitter: S,
    sink: K,
    scan_interval: Duration,
}

impl<W, M, S, K> PipelineOrchestrator<W, M, S, K>
where
    W: StageHandler<Input = ScanTrigger, Output = DiscoveryResult>,
    M: StageHandler<Input = DiscoveryResult, Output = MetadataResult>,
    S: StageHandler<Input = MetadataResult, Output = SplitResult>,
    K: StageHandler<Input = SplitResult, Output = PersistedAudiobook>,
{
    pub fn new(watcher: W, extractor: M, splitter: S, sink: K, scan_interval: Duration) -> Self {
        Self {
            watcher,
            extractor,
            splitter,
            sink,
            scan_interval,
        }
    }

    /// Spawn every stage, the router and the coordination loop
    ///
    /// Must be called from within a tokio runtime. Cancelling `cancel`
    /// stops the pipeline; [`PipelineHandle::shutdown`] does so and waits.
    pub fn start(self, cancel: CancellationToken) -> PipelineHandle {
        let (watcher, watcher_ends) = Stage::new(self.watcher, CHANNEL_CAPACITY, cancel.clone());
        let (extractor, extractor_ends) =
            Stage::new(self.extractor, CHANNEL_CAPACITY, cancel.clone());
        let (splitter, splitter_ends) = Stage::new(self.splitter, CHANNEL_CAPACITY, cancel.clone());
        let (sink, sink_ends) = Stage::new(self.sink, CHANNEL_CAPACITY, cancel.clone());

        let (mut router, commands) = CommandRouter::new(CHANNEL_CAPACITY, cancel.clone());
        router.register(watcher.name(), watcher_ends.commands);
        router.register(extractor.name(), extractor_ends.commands);
        router.register(splitter.name(), splitter_ends.commands);
        router.register(sink.name(), sink_ends.commands);

        let names = [watcher.name(), extractor.name(), splitter.name(), sink.name()];
        info!(stages = ?names, interval_secs = self.scan_interval.as_secs_f64(), "Starting pipeline");

        watcher.spawn();
        extractor.spawn();
        splitter.spawn();
        sink.spawn();
        let router = tokio::spawn(router.run());

        let links = Links {
            trigger: watcher_ends.input,
            discovered: watcher_ends.output,
            to_extractor: extractor_ends.input,
            extracted: extractor_ends.output,
            to_splitter: splitter_ends.input,
            split: splitter_ends.output,
            to_sink: sink_ends.input,
            persisted: sink_ends.output,
        };
        let done = vec![
            (names[0], watcher_ends.done),
            (names[1], extractor_ends.done),
            (names[2], splitter_ends.done),
            (names[3], sink_ends.done),
        ];

        let task = tokio::spawn(coordinate(links, done, router, self.scan_interval, cancel.clone()));

        PipelineHandle {
            commands,
            cancel,
            task,
        }
    }
}

/// Channel ends owned by the coordination loop
struct Links {
    trigger: mpsc::Sender<ScanTrigger>,
    discovered: mpsc::Receiver<DiscoveryResult>,
    to_extractor: mpsc::Sender<DiscoveryResult>,
    extracted: mpsc::Receiver<MetadataResult>,
    to_splitter: mpsc::Sender<MetadataResult>,
    split: mpsc::Receiver<SplitResult>,
    to_sink: mpsc::Sender<SplitResult>,
    persisted: mpsc::Receiver<PersistedAudiobook>,
}

async fn coordinate(
    mut links: Links,
    done: Vec<(&'static str, oneshot::Receiver<StageReport>)>,
    router: JoinHandle<u64>,
    scan_interval: Duration,
    cancel: CancellationToken,
) -> ShutdownReport {
    let mut report = ShutdownReport::default();

    // First tick fires immediately: one scan at startup
    let mut ticker = tokio::time::interval(scan_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // In-flight item per link, waiting for the downstream slot
    let mut discovered: Option<DiscoveryResult> = None;
    let mut extracted: Option<MetadataResult> = None;
    let mut split: Option<SplitResult> = None;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            _ = ticker.tick() => match links.trigger.try_send(ScanTrigger) {
                Ok(()) => {
                    report.scans_triggered += 1;
                    debug!("Scan triggered");
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    report.ticks_dropped += 1;
                    debug!("Tick dropped: previous trigger still pending");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!("Watcher input closed; tick dropped");
                }
            },

            // Deliveries first so slots free up before more is read
            Ok(permit) = links.to_extractor.reserve(), if discovered.is_some() => {
                if let Some(item) = discovered.take() {
                    permit.send(item);
                }
            }
            Ok(permit) = links.to_splitter.reserve(), if extracted.is_some() => {
                if let Some(item) = extracted.take() {
                    permit.send(item);
                }
            }
            Ok(permit) = links.to_sink.reserve(), if split.is_some() => {
                if let Some(item) = split.take() {
                    permit.send(item);
                }
            }

            Some(item) = links.discovered.recv(), if discovered.is_none() => {
                debug!(path = %item.path.display(), "Discovered");
                discovered = Some(item);
            }
            Some(item) = links.extracted.recv(), if extracted.is_none() => {
                debug!(title = %item.audiobook.info.title, "Metadata extracted");
                extracted = Some(item);
            }
            Some(item) = links.split.recv(), if split.is_none() => {
                debug!(title = %item.audiobook.info.title, chapters = item.chapter_paths.len(), "Split");
                split = Some(item);
            }
            Some(item) = links.persisted.recv() => {
                report.audiobooks_persisted += 1;
                info!(id = item.id, title = %item.title, chapters = item.chapter_count, "Audiobook ingested");
            }
        }
    }

    let discarded = [discovered.is_some(), extracted.is_some(), split.is_some()]
        .into_iter()
        .filter(|held| *held)
        .count();
    info!(discarded, "Pipeline cancelled; waiting for stages");
    drop(links);

    for (stage, done_rx) in done {
        match done_rx.await {
            Ok(stage_report) => report.stages.push(stage_report),
            Err(_) => {
                error!(stage, "Stage ended without reporting completion");
                report.stages.push(StageReport {
                    stage,
                    ..StageReport::default()
                });
            }
        }
    }

    match router.await {
        Ok(routed) => report.commands_routed = routed,
        Err(e) => error!(error = %e, "Command router task failed"),
    }

    info!(
        persisted = report.audiobooks_persisted,
        scans = report.scans_triggered,
        ticks_dropped = report.ticks_dropped,
        "Pipeline stopped"
    );
    report
}
