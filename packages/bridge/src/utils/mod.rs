// packages/bridge/src/utils/mod.rs
//! Shared utilities: error types and configuration loading

pub mod config;
pub mod errors;

pub use config::BridgeConfig;
pub use errors::{BridgeError, Result};
