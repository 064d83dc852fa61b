// packages/bridge/src/protocol/dispatcher.rs
//! Routes inbound frames to exactly one handler
//!
//! Malformed or unexpected frames are logged and dropped here; nothing a peer
//! sends can raise an error past the dispatcher or end the session.

use crate::channel::{ChannelRole, InboundHandler, MessageSink};
use crate::cycle::{AckFlowController, CycleState};
use crate::observability::{ACKS_RECEIVED, MESSAGES_DROPPED};
use crate::protocol::message::{Message, UpdateSource};
use crate::utils::errors::BridgeError;
use metrics::counter;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Receives every acknowledged state update from either peer
pub type UpdateCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Receives `#con` text
pub type ConsoleCallback = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    Malformed(String),
    /// Tag that only ever travels outbound (`#code`, `#freq`)
    OutboundOnly,
    /// Update tag that does not belong to the channel it arrived on
    WrongSource,
    /// Tag recognised but no handler is registered for it
    Unhandled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Acknowledged { frequency: Option<f64> },
    Console,
    Updated,
    Dropped(DropReason),
}

#[derive(Clone, Default)]
pub struct ProtocolDispatcher {
    ack: Option<(Arc<AckFlowController>, Arc<CycleState>)>,
    console: Option<ConsoleCallback>,
    updates: Option<UpdateCallback>,
}

impl ProtocolDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle `#ack`: set the flag, apply any negotiated frequency
    pub fn with_ack(mut self, ack: Arc<AckFlowController>, state: Arc<CycleState>) -> Self {
        self.ack = Some((ack, state));
        self
    }

    pub fn with_console(mut self, console: ConsoleCallback) -> Self {
        self.console = Some(console);
        self
    }

    /// Callback for `#gui` / `#exc` updates; every update is answered with `#ack`
    pub fn with_updates(mut self, updates: UpdateCallback) -> Self {
        self.updates = Some(updates);
        self
    }

    pub fn dispatch(&self, role: ChannelRole, text: &str, reply: &dyn MessageSink) -> DispatchOutcome {
        let message = match Message::parse(text) {
            Ok(message) => message,
            Err(e) => return self.drop_malformed(role, text, e.into()),
        };

        match message {
            Message::Ack { frequency } => match &self.ack {
                Some((ack, state)) => {
                    counter!(ACKS_RECEIVED, "role" => role.as_str()).increment(1);
                    if let Some(frequency) = frequency {
                        if state.set_target_frequency(frequency) {
                            debug!(%role, frequency, "Peer negotiated frequency");
                        }
                    }
                    ack.set_ack(true);
                    DispatchOutcome::Acknowledged { frequency }
                }
                None => self.discard(role, DropReason::Unhandled),
            },

            Message::Console(text) => match (&self.console, role) {
                (Some(console), ChannelRole::Gui) => {
                    console(text);
                    DispatchOutcome::Console
                }
                (Some(_), _) => self.discard(role, DropReason::WrongSource),
                (None, _) => self.discard(role, DropReason::Unhandled),
            },

            Message::Code(_) | Message::Frequency(_) => self.discard(role, DropReason::OutboundOnly),

            Message::Update { source, payload } => {
                if !source_matches(source, role) {
                    return self.discard(role, DropReason::WrongSource);
                }
                trace!(%role, "Update received");
                // Acknowledged even without a callback so the peer keeps stepping
                if let Some(updates) = &self.updates {
                    updates(Value::Object(payload));
                }

                if let Err(e) = reply.send(Message::ack().to_string()) {
                    warn!(%role, "Failed to acknowledge update: {}", e);
                }
                DispatchOutcome::Updated
            }
        }
    }

    fn drop_malformed(&self, role: ChannelRole, text: &str, error: BridgeError) -> DispatchOutcome {
        let preview: String = text.chars().take(30).collect();
        warn!(%role, message = %preview, "Dropping message: {}", error);
        self.discard(role, DropReason::Malformed(error.to_string()))
    }

    fn discard(&self, role: ChannelRole, reason: DropReason) -> DispatchOutcome {
        debug!(%role, ?reason, "Message dropped");
        counter!(MESSAGES_DROPPED, "role" => role.as_str()).increment(1);
        DispatchOutcome::Dropped(reason)
    }
}

fn source_matches(source: UpdateSource, role: ChannelRole) -> bool {
    matches!(
        (source, role),
        (UpdateSource::Gui, ChannelRole::Gui) | (UpdateSource::Exercise, ChannelRole::Exercise)
    )
}

impl InboundHandler for ProtocolDispatcher {
    fn on_message(&self, role: ChannelRole, text: &str, reply: &dyn MessageSink) {
        self.dispatch(role, text, reply);
    }
}
