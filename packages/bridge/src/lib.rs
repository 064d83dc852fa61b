// packages/bridge/src/lib.rs
//! Exercise Bridge Library
//!
//! Supervises an exercise's peer processes (the exercise server and its GUI
//! server), talks to both over tagged text messages, and paces the
//! ack-gated update cycle between them.
//!
//! # Architecture
//!
//! - **runtime**: peer process supervision and readiness detection
//! - **channel**: reconnecting WebSocket channels to the peers
//! - **protocol**: tagged message parsing and dispatch
//! - **cycle**: ack gate, paced scheduler, frequency and RTF measurement
//! - **session**: exercise lifecycle, simulation control, code validation
//! - **gui**: browser-facing update loop
//! - **observability**: tracing and metrics setup
//! - **utils**: configuration and errors

pub mod channel;
pub mod cycle;
pub mod gui;
pub mod observability;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod utils;

pub use channel::{ChannelRole, MessageChannel, MessageSink};
pub use session::{Collaborators, ExerciseSession};
pub use utils::config::BridgeConfig;
pub use utils::errors::{BridgeError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
