// packages/bridge/src/session/mod.rs
//! Exercise session lifecycle and its collaborators
//!
//! - **Wrapper**: launches both peers and drives them ([`ExerciseSession`])
//! - **Simulation**: pause, resume and reset of the simulator
//! - **Validation**: user code checks before it reaches the exercise

pub mod simulation;
pub mod validation;
pub mod wrapper;

pub use simulation::{CommandSimulationControl, SimulationControl};
pub use validation::{AcceptAll, CodeValidator, CommandValidator};
pub use wrapper::{Collaborators, ExerciseSession, PeerLink};
