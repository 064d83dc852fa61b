// packages/bridge/src/channel/mod.rs
//! Duplex message channels to the peer servers
//!
//! - **Client**: reconnecting WebSocket client ([`MessageChannel`])
//! - **MessageSink**: the outbound half, as seen by the dispatcher and the
//!   cycle scheduler
//! - **PeerChannel**: a sink that can be awaited for readiness and closed
//! - **InboundHandler**: receives every inbound text frame on the channel's
//!   own task

pub mod client;

pub use client::MessageChannel;

use crate::utils::errors::Result;
use futures::future::BoxFuture;
use std::fmt;

/// Which peer a channel talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    Exercise,
    Gui,
}

impl ChannelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelRole::Exercise => "exercise",
            ChannelRole::Gui => "gui",
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound side of a channel
///
/// `send` never blocks and never queues for later: it either hands exactly one
/// frame to the live connection or fails with
/// [`NotConnected`](crate::utils::errors::BridgeError::NotConnected).
pub trait MessageSink: Send + Sync {
    fn role(&self) -> ChannelRole;

    fn send(&self, text: String) -> Result<()>;

    fn is_connected(&self) -> bool;
}

/// A sink with a connection lifecycle, as owned by a session or runner
pub trait PeerChannel: MessageSink {
    /// Resolves once connected; fails if the channel is closed first
    fn ready(&self) -> BoxFuture<'_, Result<()>>;

    /// Stop the channel; later sends fail
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Receives inbound frames; `reply` sends on the channel the frame arrived on
pub trait InboundHandler: Send + Sync + 'static {
    fn on_message(&self, role: ChannelRole, text: &str, reply: &dyn MessageSink);
}
