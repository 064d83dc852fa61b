// packages/bridge/src/cycle/mod.rs
//! Paced, ack-gated update cycle
//!
//! - **Ack**: single outstanding acknowledgment gate
//! - **Scheduler**: publish, wait for ack, sleep the rest of the period
//! - **State**: shared counters and rates
//! - **Meter**: achieved frequency per measurement window
//! - **Rtf**: simulator real-time factor polling

pub mod ack;
pub mod meter;
pub mod rtf;
pub mod scheduler;
pub mod state;

pub use ack::AckFlowController;
pub use meter::FrequencyMeter;
pub use rtf::RealTimeFactorPoller;
pub use scheduler::CycleScheduler;
pub use state::{CycleSnapshot, CycleState};
