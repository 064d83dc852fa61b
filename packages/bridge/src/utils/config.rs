// packages/bridge/src/utils/config.rs
//! Bridge configuration
//!
//! Layered with the `config` crate: serde defaults, then an optional file
//! (`$BRIDGE_CONFIG`, or `bridge.{toml,yaml,json}` in the working directory),
//! then `BRIDGE_<SECTION>__<KEY>` environment variables.

use crate::runtime::readiness::ReadinessTimeout;
use crate::utils::errors::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub exercise: PeerConfig,
    pub gui: PeerConfig,
    pub readiness: ReadinessConfig,
    pub channel: ChannelConfig,
    pub cycle: CycleConfig,
    pub telemetry: TelemetryConfig,
    pub simulation: SimulationConfig,
    pub validator: ValidatorConfig,
    pub shutdown: ShutdownConfig,
    pub observability: ObservabilityConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            exercise: PeerConfig::exercise(),
            gui: PeerConfig::gui(),
            readiness: ReadinessConfig::default(),
            channel: ChannelConfig::default(),
            cycle: CycleConfig::default(),
            telemetry: TelemetryConfig::default(),
            simulation: SimulationConfig::default(),
            validator: ValidatorConfig::default(),
            shutdown: ShutdownConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from `$BRIDGE_CONFIG` (or `bridge.*`) and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var("BRIDGE_CONFIG").unwrap_or_else(|_| "bridge".to_string());
        Self::load_from(&path)
    }

    /// Load configuration from a specific file; a missing file is not an error
    pub fn load_from(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("BRIDGE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let mut config: Self = settings.try_deserialize()?;
        config.exercise.expand_paths();
        config.gui.expand_paths();
        Ok(config)
    }
}

/// One supervised peer (exercise or GUI server)
///
/// Defaults are layered underneath file and environment sources, so a single
/// `BRIDGE_GUI__COMMAND` override keeps the remaining GUI defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Shell command line that starts the peer
    pub command: String,

    /// File the peer writes its readiness marker to
    pub log_path: String,

    /// Exact first line that signals readiness
    pub ready_marker: String,

    /// WebSocket endpoint served by the peer
    pub url: String,

    /// Where the peer's stdout/stderr go (inherited when unset)
    #[serde(default)]
    pub output_path: Option<String>,
}

impl PeerConfig {
    pub fn exercise() -> Self {
        Self {
            command: "python3 exercise.py".to_string(),
            log_path: "~/ws_code.log".to_string(),
            ready_marker: "websocket_code=ready".to_string(),
            url: "ws://127.0.0.1:1905".to_string(),
            output_path: None,
        }
    }

    pub fn gui() -> Self {
        Self {
            command: "python3 gui.py".to_string(),
            log_path: "~/ws_gui.log".to_string(),
            ready_marker: "websocket_gui=ready".to_string(),
            url: "ws://127.0.0.1:2303".to_string(),
            output_path: None,
        }
    }

    fn expand_paths(&mut self) {
        self.log_path = expand_home(&self.log_path).to_string_lossy().into_owned();
        if let Some(output) = &self.output_path {
            self.output_path = Some(expand_home(output).to_string_lossy().into_owned());
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self::exercise()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Log file polling interval
    pub poll_interval_ms: u64,

    /// Give up after this many seconds; unset polls forever
    pub timeout_secs: Option<u64>,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            timeout_secs: None,
        }
    }
}

impl ReadinessConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> ReadinessTimeout {
        match self.timeout_secs {
            Some(secs) => ReadinessTimeout::Bounded(Duration::from_secs(secs)),
            None => ReadinessTimeout::Unbounded,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Fixed delay between reconnection attempts (no backoff)
    pub retry_interval_ms: u64,

    /// How long session launch waits for a channel to come up
    pub connect_timeout_secs: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 50,
            connect_timeout_secs: 10,
        }
    }
}

impl ChannelConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// GUI update loop pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Initial period until the browser negotiates a frequency
    pub target_period_ms: f64,

    /// Frequency measurement window
    pub measure_window_ms: u64,

    /// Simulator statistics command for the real-time factor
    pub rtf_command: Option<String>,

    pub rtf_interval_ms: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            target_period_ms: 50.0,
            measure_window_ms: 2000,
            rtf_command: Some("gz stats -p".to_string()),
            rtf_interval_ms: 2000,
        }
    }
}

impl CycleConfig {
    pub fn target_period(&self) -> Duration {
        Duration::from_nanos((self.target_period_ms.max(0.0) * 1e6).round() as u64)
    }

    pub fn measure_window(&self) -> Duration {
        Duration::from_millis(self.measure_window_ms)
    }

    pub fn rtf_interval(&self) -> Duration {
        Duration::from_millis(self.rtf_interval_ms)
    }
}

/// Frequencies the session reports to the exercise with `#freq`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub brain_frequency: f64,
    pub gui_frequency: f64,
    pub default_rtf: f64,
    pub broadcast_interval_ms: u64,
    pub rtf_command: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            brain_frequency: 20.0,
            gui_frequency: 10.0,
            default_rtf: 100.0,
            broadcast_interval_ms: 1000,
            rtf_command: None,
        }
    }
}

impl TelemetryConfig {
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub pause_command: String,
    pub resume_command: String,
    pub reset_command: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            pause_command: "rosservice call /gazebo/pause_physics".to_string(),
            resume_command: "rosservice call /gazebo/unpause_physics".to_string(),
            reset_command: "rosservice call /gazebo/reset_world".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Linter command; the source file path is appended. Unset accepts all code.
    pub command: Option<String>,

    /// Suffix for the temporary source file handed to the linter
    pub file_suffix: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            command: None,
            file_suffix: ".py".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time between SIGTERM and SIGKILL for a peer's process group
    pub grace_period_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 2000,
        }
    }
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Fallback filter when `RUST_LOG` is unset
    pub log_filter: String,

    pub json_logs: bool,

    /// Prometheus listen address, e.g. `127.0.0.1:9000`
    pub metrics_addr: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            json_logs: false,
            metrics_addr: None,
        }
    }
}

/// Expand a leading `~` to `$HOME`
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            let mut expanded = PathBuf::from(home);
            let rest = rest.trim_start_matches('/');
            if !rest.is_empty() {
                expanded.push(rest);
            }
            expanded
        }
        _ => PathBuf::from(path),
    }
}

/// Split a command line into program and arguments on whitespace
pub fn split_command(line: &str) -> Option<(String, Vec<String>)> {
    let mut parts = line.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    Some((program, parts.collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.exercise.ready_marker, "websocket_code=ready");
        assert_eq!(config.gui.ready_marker, "websocket_gui=ready");
        assert_eq!(config.gui.url, "ws://127.0.0.1:2303");
        assert_eq!(config.readiness.poll_interval(), Duration::from_millis(200));
        assert_eq!(config.readiness.timeout(), ReadinessTimeout::Unbounded);
        assert_eq!(config.cycle.measure_window(), Duration::from_secs(2));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[exercise]
command = "python3 my_exercise.py"
log_path = "/tmp/code.log"
ready_marker = "ready"
url = "ws://127.0.0.1:9999"

[readiness]
timeout_secs = 5

[cycle]
target_period_ms = 80.0
"#
        )
        .unwrap();

        let config = BridgeConfig::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(config.exercise.command, "python3 my_exercise.py");
        assert_eq!(config.exercise.url, "ws://127.0.0.1:9999");
        assert_eq!(
            config.readiness.timeout(),
            ReadinessTimeout::Bounded(Duration::from_secs(5))
        );
        assert_eq!(config.cycle.target_period_ms, 80.0);
        // Untouched sections keep their defaults
        assert_eq!(config.gui.ready_marker, "websocket_gui=ready");
        assert_eq!(config.channel.retry_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = BridgeConfig::load_from("/nonexistent/bridge-config").unwrap();
        assert_eq!(config.telemetry.brain_frequency, 20.0);
    }

    #[test]
    fn test_expand_home() {
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(expand_home("~/ws_code.log"), PathBuf::from(home).join("ws_code.log"));
        }
        assert_eq!(expand_home("/tmp/ws_gui.log"), PathBuf::from("/tmp/ws_gui.log"));
        assert_eq!(expand_home("~user/file"), PathBuf::from("~user/file"));
    }

    #[test]
    fn test_split_command() {
        let (program, args) = split_command("gz stats -p").unwrap();
        assert_eq!(program, "gz");
        assert_eq!(args, vec!["stats", "-p"]);
        assert!(split_command("   ").is_none());
    }
}
