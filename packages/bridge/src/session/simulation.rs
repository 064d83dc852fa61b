// packages/bridge/src/session/simulation.rs
//! Simulator control
//!
//! The session only ever pauses, resumes or resets the world. Calls are
//! blocking; the session runs them on the blocking pool.

use crate::utils::config::{split_command, SimulationConfig};
use crate::utils::errors::{BridgeError, Result};
use std::process::{Command, Stdio};
use tracing::debug;

pub trait SimulationControl: Send + Sync + 'static {
    fn pause_simulation(&self) -> Result<()>;

    fn resume_simulation(&self) -> Result<()>;

    fn reset_world(&self) -> Result<()>;
}

/// Runs one configured command per operation
#[derive(Debug, Clone)]
pub struct CommandSimulationControl {
    config: SimulationConfig,
}

impl CommandSimulationControl {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    fn run(&self, line: &str) -> Result<()> {
        let (program, args) = split_command(line)
            .ok_or_else(|| BridgeError::Simulation("empty simulation command".to_string()))?;

        debug!(command = %line, "Running simulation command");
        let output = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| BridgeError::Simulation(format!("{}: {}", program, e)))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(BridgeError::Simulation(format!(
                "'{}' exited with {}: {}",
                line,
                output.status,
                stderr.trim()
            )))
        }
    }
}

impl SimulationControl for CommandSimulationControl {
    fn pause_simulation(&self) -> Result<()> {
        self.run(&self.config.pause_command)
    }

    fn resume_simulation(&self) -> Result<()> {
        self.run(&self.config.resume_command)
    }

    fn reset_world(&self) -> Result<()> {
        self.run(&self.config.reset_command)
    }
}
