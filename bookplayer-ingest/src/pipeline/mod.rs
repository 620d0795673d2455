//! Generic staged pipeline engine
//!
//! A pipeline is a chain of [`Stage`]s, each wrapping one [`StageHandler`].
//! Stages run on their own tasks and talk only through bounded channels:
//!
//! ```text
//!            tick                 ┌───────────── CommandRouter ─────────────┐
//!             │                   ▼               ▼              ▼          ▼
//!   ──> [watcher] ──> coord ──> [extractor] ──> coord ──> [splitter] ──> coord ──> [sink]
//! ```
//!
//! The coordination loop in [`orchestrator`] moves items between stages and
//! is the only place backpressure is applied. Commands arrive out of band
//! through the [`router`], which broadcasts each one to every stage.

pub mod command;
pub mod handler;
pub mod orchestrator;
pub mod router;
pub mod stage;

pub use command::{CommandKind, StageCommand};
pub use handler::{Emitter, StageHandler};
pub use orchestrator::{PipelineHandle, PipelineOrchestrator, ShutdownReport};
pub use router::CommandRouter;
pub use stage::{Stage, StageEndpoints, StageReport};

/// Capacity of every pipeline channel
///
/// One slot: a send completes once the item is buffered and the next send
/// waits until the receiving stage has taken it.
pub const CHANNEL_CAPACITY: usize = 1;
