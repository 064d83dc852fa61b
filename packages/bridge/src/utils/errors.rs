// packages/bridge/src/utils/errors.rs
//! Error types for the exercise bridge
//!
//! Only [`BridgeError::LaunchFailed`] and [`BridgeError::ValidationError`] are
//! meant to reach the hosting application. Channel and protocol faults are
//! logged where they happen and absorbed.

use crate::channel::ChannelRole;
use crate::protocol::ProtocolError;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// A subprocess never became ready, or exited before it did
    #[error("failed to launch {name}: {reason}")]
    LaunchFailed { name: String, reason: String },

    /// Send attempted on a channel with no live connection
    #[error("{role} channel is not connected")]
    NotConnected { role: ChannelRole },

    /// Inbound frame that could not be parsed
    #[error("malformed message: {0}")]
    Malformed(#[from] ProtocolError),

    /// User code rejected by the validator; carries the validator output unchanged
    #[error("{0}")]
    ValidationError(String),

    /// Termination targeted a process group that no longer exists
    #[error("process {pid} already exited")]
    ProcessAlreadyExited { pid: i32 },

    /// The session (or runner) was shut down while an operation was waiting
    #[error("session closed")]
    SessionClosed,

    #[error("simulation control failed: {0}")]
    Simulation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl BridgeError {
    pub fn launch_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LaunchFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether the hosting application is expected to act on this error
    pub fn is_actionable(&self) -> bool {
        matches!(self, Self::LaunchFailed { .. } | Self::ValidationError(_))
    }
}
