//! Out-of-band control commands

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a control command
///
/// Stages declare the kinds they react to; every other kind is discarded
/// without logging above `trace`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Scan the watched directory now instead of waiting for the timer
    Scan,
    /// Extension point for kinds this crate does not define
    Custom(String),
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Scan => write!(f, "scan"),
            CommandKind::Custom(name) => write!(f, "custom:{}", name),
        }
    }
}

/// Control command broadcast to every stage
///
/// Immutable once built. The router clones it once per recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCommand {
    kind: CommandKind,
    #[serde(default)]
    payload: serde_json::Value,
}

impl StageCommand {
    /// Command without payload
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(kind: CommandKind, payload: serde_json::Value) -> Self {
        Self { kind, payload }
    }

    /// Shorthand for `StageCommand::new(CommandKind::Scan)`
    pub fn scan() -> Self {
        Self::new(CommandKind::Scan)
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }
}
