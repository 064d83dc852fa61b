// packages/bridge/src/gui/mod.rs
//! Ack-gated GUI update loop

pub mod runner;

pub use runner::{GuiRunner, PayloadSource};
