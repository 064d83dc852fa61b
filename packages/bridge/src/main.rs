// packages/bridge/src/main.rs
//! Exercise Bridge
//!
//! Launches an exercise and its GUI, prints every state update as a JSON
//! line on stdout, and tears both down on Ctrl-C.
//!
//! Usage: `exercise-bridge [CODE_FILE]`. When a code file is given it is
//! validated and loaded into the exercise after start.

use anyhow::{Context, Result};
use exercise_bridge::observability::{init_metrics, init_tracing};
use exercise_bridge::session::validation;
use exercise_bridge::session::CommandSimulationControl;
use exercise_bridge::{BridgeConfig, Collaborators, ExerciseSession};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = BridgeConfig::load().context("failed to load configuration")?;

    init_tracing(&config.observability)?;
    init_metrics(&config.observability)?;

    info!("Starting Exercise Bridge v{}", exercise_bridge::VERSION);
    info!("Configuration loaded: {:?}", config);

    let collaborators = Collaborators {
        simulation: Arc::new(CommandSimulationControl::new(config.simulation.clone())),
        validator: Arc::from(validation::from_config(&config.validator)),
        on_update: Some(Arc::new(|payload: serde_json::Value| println!("{}", payload))),
        on_console: Some(Arc::new(|text: String| info!(console = %text, "Console input"))),
    };

    let mut session = ExerciseSession::launch(config, collaborators).await?;
    info!(id = %session.id(), "Session ready");

    session.start().await;

    if let Some(path) = std::env::args().nth(1) {
        let code = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read code file '{}'", path))?;
        match session.load_code(&code).await {
            Ok(()) => info!(%path, "Code loaded"),
            Err(e) if e.is_actionable() => error!(%path, "Code rejected:\n{}", e),
            Err(e) => warn!(%path, "Code not loaded: {}", e),
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl-C handler")?;
    info!("Received shutdown signal, cleaning up...");

    session.terminate().await;
    info!("Exercise Bridge stopped");
    Ok(())
}
