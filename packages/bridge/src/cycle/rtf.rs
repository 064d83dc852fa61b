// packages/bridge/src/cycle/rtf.rs
//! Real-time factor polling
//!
//! Runs the simulator's statistics command and reads its output line by
//! line. The first comma-separated field of every line carries the factor,
//! either bare (`1.00`) or wrapped (`Factor[1.00]`). When the command exits
//! the poller waits one interval and starts it again.

use crate::cycle::state::CycleState;
use crate::utils::config::split_command;
use crate::utils::errors::{BridgeError, Result};
use futures::StreamExt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Extract the real-time factor from one line of statistics output
pub fn parse_rtf(line: &str) -> Option<f64> {
    let field = line.split(',').next()?.trim();

    let value = match field.find('[') {
        Some(open) => {
            let rest = &field[open + 1..];
            &rest[..rest.find(']')?]
        }
        None => field,
    };

    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub struct RealTimeFactorPoller {
    command: String,
    interval: Duration,
    state: Arc<CycleState>,
}

impl RealTimeFactorPoller {
    pub fn new(command: impl Into<String>, interval: Duration, state: Arc<CycleState>) -> Self {
        Self {
            command: command.into(),
            interval,
            state,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.cancelled() => break,
            }

            if let Err(e) = self.sample(&shutdown).await {
                warn!(command = %self.command, "Real-time factor poll failed: {}", e);
            }
        }

        debug!("Real-time factor poller stopped");
    }

    /// Run the command once, updating the factor for every parseable line
    async fn sample(&self, shutdown: &CancellationToken) -> Result<()> {
        let (program, args) = split_command(&self.command)
            .ok_or_else(|| BridgeError::Simulation("empty statistics command".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Simulation("statistics command has no stdout".to_string()))?;
        let mut lines = FramedRead::new(stdout, LinesCodec::new());

        loop {
            let line = tokio::select! {
                line = lines.next() => line,
                _ = shutdown.cancelled() => break,
            };

            match line {
                Some(Ok(line)) => match parse_rtf(&line) {
                    Some(rtf) => self.state.set_real_time_factor(rtf),
                    None => debug!(line = %line, "Ignoring unparseable statistics line"),
                },
                Some(Err(e)) => {
                    debug!("Statistics output error: {}", e);
                    break;
                }
                None => break,
            }
        }

        let _ = child.start_kill();
        let _ = child.wait().await;
        Ok(())
    }
}
