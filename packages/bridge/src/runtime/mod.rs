// packages/bridge/src/runtime/mod.rs
//! Peer process supervision
//!
//! - **Process Manager**: spawning peers in their own process group and
//!   tearing the whole group down
//! - **Readiness**: side-channel readiness detection through a log file
//!
//! # Lifecycle
//!
//! ```text
//! launch() ─► spawn `sh -c <command>` (new process group)
//!                  │
//!                  ▼
//!          poll log file every 200ms ──► first line == marker? ──► ready
//!                  │                                 │
//!                  └── process exited / timeout ─────┴──► LaunchFailed
//!
//! terminate() ─► SIGTERM group ─► grace period ─► SIGKILL leftovers ─► reap
//! ```

pub mod process_manager;
pub mod readiness;

pub use process_manager::{LaunchSpec, ManagedProcess, ProcessSupervisor};
pub use readiness::{ReadinessTimeout, ReadinessWatch};
