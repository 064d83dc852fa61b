// packages/bridge/src/observability/mod.rs
//! Logging and metrics setup
//!
//! Logs go through `tracing`; `RUST_LOG` wins over the configured filter.
//! Metrics go through the `metrics` facade and are exported over HTTP in the
//! Prometheus text format when a listen address is configured.

use crate::utils::config::ObservabilityConfig;
use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Frames dropped by the protocol dispatcher, labelled by channel role
pub const MESSAGES_DROPPED: &str = "bridge_messages_dropped_total";

/// Acknowledgments received from a peer
pub const ACKS_RECEIVED: &str = "bridge_acks_received_total";

/// Frames written to a channel, labelled by channel role
pub const FRAMES_SENT: &str = "bridge_frames_sent_total";

/// Channel (re)connections, labelled by channel role
pub const CHANNEL_CONNECTS: &str = "bridge_channel_connects_total";

/// Achieved update-loop frequency over the last measurement window
pub const CYCLE_FREQUENCY: &str = "bridge_cycle_frequency_hz";

/// Period the scheduler is currently pacing to
pub const CYCLE_TARGET_PERIOD: &str = "bridge_cycle_target_period_ms";

/// Last real-time factor reported by the simulator
pub const REAL_TIME_FACTOR: &str = "bridge_real_time_factor";

/// Install the global tracing subscriber
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true),
            )
            .try_init()
            .context("failed to install JSON tracing subscriber")?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true),
            )
            .try_init()
            .context("failed to install tracing subscriber")?;
    }

    Ok(())
}

/// Install the Prometheus exporter if a listen address is configured
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let Some(addr) = &config.metrics_addr else {
        return Ok(());
    };

    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid metrics address '{}'", addr))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install Prometheus exporter")?;

    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_disabled_without_address() {
        let config = ObservabilityConfig::default();
        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn test_invalid_metrics_address() {
        let config = ObservabilityConfig {
            metrics_addr: Some("not-an-address".to_string()),
            ..Default::default()
        };
        assert!(init_metrics(&config).is_err());
    }
}
