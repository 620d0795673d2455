//! Command fan-out to every stage

use super::command::StageCommand;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct Route {
    stage: &'static str,
    tx: mpsc::Sender<StageCommand>,
}

/// Broadcasts each inbound command to all registered stages
///
/// Delivery is sequential in registration order: while a stage is busy the
/// router waits for its command slot before moving on to the next stage.
pub struct CommandRouter {
    inbound: mpsc::Receiver<StageCommand>,
    routes: Vec<Route>,
    cancel: CancellationToken,
}

impl CommandRouter {
    /// Router plus the sender operators use to submit commands
    pub fn new(capacity: usize, cancel: CancellationToken) -> (Self, mpsc::Sender<StageCommand>) {
        let (tx, inbound) = mpsc::channel(capacity);
        let router = Self {
            inbound,
            routes: Vec::new(),
            cancel,
        };
        (router, tx)
    }

    /// Add a stage's command channel to the fan-out
    pub fn register(&mut self, stage: &'static str, tx: mpsc::Sender<StageCommand>) {
        self.routes.push(Route { stage, tx });
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Route commands until cancelled; returns the number of commands routed
    pub async fn run(mut self) -> u64 {
        let mut routed = 0u64;
        let mut inbound_open = true;

        info!(stages = self.routes.len(), "Command router started");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                command = self.inbound.recv(), if inbound_open => match command {
                    Some(command) => {
                        if !self.broadcast(command).await {
                            break;
                        }
                        routed += 1;
                    }
                    None => {
                        debug!("All command senders dropped");
                        inbound_open = false;
                    }
                },
            }
        }

        self.inbound.close();
        info!(routed, "Command router stopped");
        routed
    }

    /// Deliver to every route; false if cancelled part way through
    async fn broadcast(&mut self, command: StageCommand) -> bool {
        debug!(kind = %command.kind(), stages = self.routes.len(), "Routing command");

        let mut closed = Vec::new();
        for (index, route) in self.routes.iter().enumerate() {
            tokio::select! {
                result = route.tx.send(command.clone()) => {
                    if result.is_err() {
                        closed.push(index);
                    }
                }
                _ = self.cancel.cancelled() => return false,
            }
        }

        for index in closed.into_iter().rev() {
            let route = self.routes.remove(index);
            warn!(stage = route.stage, "Stage command channel closed; removed from router");
        }
        true
    }
}
