// packages/bridge/src/protocol/mod.rs
//! Peer message protocol
//!
//! - **Message**: tagged text frames and their parser
//! - **Dispatcher**: routes parsed frames to the ack gate and callbacks

pub mod dispatcher;
pub mod message;

pub use dispatcher::{ConsoleCallback, DispatchOutcome, DropReason, ProtocolDispatcher, UpdateCallback};
pub use message::{FrequencyReport, Message, ProtocolError, UpdateSource};
