// packages/bridge/src/runtime/process_manager.rs
//! Process supervisor for the exercise and GUI servers
//!
//! Each peer is spawned through `sh -c` as the leader of a fresh process
//! group. Readiness is declared from the peer's log file (see
//! [`readiness`](crate::runtime::readiness)), and termination signals the
//! whole group so helpers forked by the peer go down with it.

use crate::runtime::readiness::{ReadinessTimeout, ReadinessWatch};
use crate::utils::config::{PeerConfig, ReadinessConfig};
use crate::utils::errors::{BridgeError, Result};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything needed to start one peer and recognise it as ready
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Name used in logs and errors ("exercise", "gui")
    pub name: String,

    /// Shell command line
    pub command: String,

    /// File the peer writes its readiness marker to
    pub log_path: PathBuf,

    /// Exact first line that signals readiness
    pub ready_marker: String,

    /// Redirect target for stdout/stderr; inherited when unset
    pub output_path: Option<PathBuf>,

    pub poll_interval: Duration,

    pub timeout: ReadinessTimeout,
}

impl LaunchSpec {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        log_path: impl Into<PathBuf>,
        ready_marker: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            log_path: log_path.into(),
            ready_marker: ready_marker.into(),
            output_path: None,
            poll_interval: Duration::from_millis(200),
            timeout: ReadinessTimeout::Unbounded,
        }
    }

    /// Build a spec from peer and readiness configuration
    pub fn from_config(name: &str, peer: &PeerConfig, readiness: &ReadinessConfig) -> Self {
        Self {
            name: name.to_string(),
            command: peer.command.clone(),
            log_path: PathBuf::from(&peer.log_path),
            ready_marker: peer.ready_marker.clone(),
            output_path: peer.output_path.as_ref().map(PathBuf::from),
            poll_interval: readiness.poll_interval(),
            timeout: readiness.timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: ReadinessTimeout) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn timeout_duration(&self) -> Duration {
        match self.timeout {
            ReadinessTimeout::Bounded(limit) => limit,
            ReadinessTimeout::Unbounded => Duration::ZERO,
        }
    }
}

/// A spawned peer process and its process group
pub struct ManagedProcess {
    name: String,
    command: String,
    log_path: PathBuf,
    ready_marker: String,

    /// Leader of the process group; `None` once terminated
    child: Option<Child>,

    /// Process group id (equal to the leader's PID)
    pgid: i32,

    ready: bool,
}

impl ManagedProcess {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn ready_marker(&self) -> &str {
        &self.ready_marker
    }

    /// PID of the group leader, which is also the process group id
    pub fn pid(&self) -> i32 {
        self.pgid
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// True until the leader exits or the process is terminated
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("pgid", &self.pgid)
            .field("ready", &self.ready)
            .field("terminated", &self.child.is_none())
            .finish()
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        // Best-effort cleanup when terminate() was never called
        if self.child.is_some() {
            warn!(name = %self.name, pgid = self.pgid, "Dropping live process group, sending SIGKILL");
            let _ = killpg(Pid::from_raw(self.pgid), Signal::SIGKILL);
        }
    }
}

/// Launches peers, waits for readiness and tears down their process groups
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    /// Time between SIGTERM and SIGKILL
    grace_period: Duration,
}

impl ProcessSupervisor {
    pub fn new(grace_period: Duration) -> Self {
        Self { grace_period }
    }

    /// Spawn a peer and poll its log file until the readiness marker appears.
    ///
    /// With [`ReadinessTimeout::Unbounded`] this only returns once the peer is
    /// ready, has exited, or `shutdown` fires. On failure the process group is
    /// terminated before the error is returned.
    pub async fn launch(
        &self,
        spec: LaunchSpec,
        shutdown: &CancellationToken,
    ) -> Result<ManagedProcess> {
        remove_stale_log(&spec.log_path).await;

        let child = self.spawn(&spec)?;
        let pgid = child
            .id()
            .map(|pid| pid as i32)
            .ok_or_else(|| BridgeError::launch_failed(&spec.name, "process exited before it got a PID"))?;

        info!(name = %spec.name, pgid, command = %spec.command, "Spawned peer process");

        let mut process = ManagedProcess {
            name: spec.name.clone(),
            command: spec.command.clone(),
            log_path: spec.log_path.clone(),
            ready_marker: spec.ready_marker.clone(),
            child: Some(child),
            pgid,
            ready: false,
        };

        match self.wait_until_ready(&spec, &mut process, shutdown).await {
            Ok(()) => {
                process.ready = true;
                info!(name = %spec.name, pgid, marker = %spec.ready_marker, "Peer process ready");
                Ok(process)
            }
            Err(e) => {
                error!(name = %spec.name, pgid, "Peer process failed to become ready: {}", e);
                if let Err(term_err) = self.terminate(&mut process).await {
                    warn!(name = %spec.name, "Cleanup after failed launch: {}", term_err);
                }
                Err(e)
            }
        }
    }

    fn spawn(&self, spec: &LaunchSpec) -> Result<Child> {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&spec.command)
            .process_group(0)
            .stdin(Stdio::null());

        match &spec.output_path {
            Some(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| {
                        BridgeError::launch_failed(
                            &spec.name,
                            format!("cannot open output file {}: {}", path.display(), e),
                        )
                    })?;
                let stderr = file.try_clone()?;
                command.stdout(file).stderr(stderr);
            }
            None => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
        }

        command
            .spawn()
            .map_err(|e| BridgeError::launch_failed(&spec.name, format!("failed to spawn: {}", e)))
    }

    async fn wait_until_ready(
        &self,
        spec: &LaunchSpec,
        process: &mut ManagedProcess,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let watch = ReadinessWatch::new(&spec.log_path, &spec.ready_marker);
        let deadline = match spec.timeout {
            ReadinessTimeout::Bounded(limit) => Some(Instant::now() + limit),
            ReadinessTimeout::Unbounded => None,
        };

        let mut ticker = tokio::time::interval(spec.poll_interval.max(Duration::from_millis(1)));

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => {
                    return Err(BridgeError::launch_failed(
                        &spec.name,
                        "shutdown requested while waiting for readiness",
                    ));
                }
            }

            if watch.check().await {
                return Ok(());
            }

            let exited = match process.child.as_mut() {
                Some(child) => child.try_wait()?,
                None => None,
            };
            if let Some(status) = exited {
                // The marker may have been written right before exiting
                if watch.check().await {
                    return Ok(());
                }
                return Err(BridgeError::launch_failed(
                    &spec.name,
                    format!("exited with {} before signalling readiness", status),
                ));
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(BridgeError::launch_failed(
                        &spec.name,
                        format!(
                            "no '{}' in {} after {:?}",
                            spec.ready_marker,
                            spec.log_path.display(),
                            spec.timeout_duration()
                        ),
                    ));
                }
            }

            debug!(name = %spec.name, log = %watch.log_path().display(), "Waiting for readiness marker");
        }
    }

    /// Terminate a peer and every process in its group.
    ///
    /// Sends SIGTERM, waits up to the grace period, then SIGKILLs whatever is
    /// left of the group. A group that no longer exists is logged and treated
    /// as success, and terminating twice is a no-op.
    pub async fn terminate(&self, process: &mut ManagedProcess) -> Result<()> {
        let Some(mut child) = process.child.take() else {
            debug!(name = %process.name, "Process already terminated");
            return Ok(());
        };
        process.ready = false;

        let pgid = Pid::from_raw(process.pgid);

        match signal_group(pgid, Some(Signal::SIGTERM)) {
            Ok(()) => {}
            Err(BridgeError::ProcessAlreadyExited { pid }) => {
                warn!(name = %process.name, pid, "Wanted to stop process group but it is not running");
                let _ = child.try_wait();
                return Ok(());
            }
            Err(e) => {
                let _ = child.start_kill();
                return Err(e);
            }
        }

        if tokio::time::timeout(self.grace_period, child.wait()).await.is_err() {
            debug!(name = %process.name, "Leader still alive after {:?}", self.grace_period);
        }

        // Leader or descendants still around
        if signal_group(pgid, None).is_ok() {
            debug!(name = %process.name, pgid = process.pgid, "Sending SIGKILL to process group");
            match signal_group(pgid, Some(Signal::SIGKILL)) {
                Ok(()) | Err(BridgeError::ProcessAlreadyExited { .. }) => {}
                Err(e) => warn!(name = %process.name, "Failed to SIGKILL process group: {}", e),
            }
        }

        match tokio::time::timeout(self.grace_period, child.wait()).await {
            Ok(Ok(status)) => debug!(name = %process.name, "Leader exited with {}", status),
            Ok(Err(e)) => warn!(name = %process.name, "Error waiting for leader: {}", e),
            Err(_) => warn!(name = %process.name, "Leader was not reaped in time"),
        }

        info!(name = %process.name, pgid = process.pgid, "Process group terminated");
        Ok(())
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

fn signal_group(pgid: Pid, signal: Option<Signal>) -> Result<()> {
    match killpg(pgid, signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(BridgeError::ProcessAlreadyExited {
            pid: pgid.as_raw(),
        }),
        Err(e) => Err(BridgeError::Io(e.into())),
    }
}

/// A marker left by a previous run must not declare the new process ready
async fn remove_stale_log(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(log = %path.display(), "Removed stale readiness log"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(log = %path.display(), "Could not remove stale readiness log: {}", e),
    }
}
