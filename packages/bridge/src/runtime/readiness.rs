// packages/bridge/src/runtime/readiness.rs
//! Readiness detection through a side-channel log file
//!
//! A peer signals "bound and listening" by writing a sentinel, with no line
//! terminator, as the first line of a well-known file. The supervisor polls that file instead of
//! racing the peer's socket with connection attempts.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// How long launch waits for the readiness marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadinessTimeout {
    /// Poll until the marker shows up or the process exits
    #[default]
    Unbounded,

    /// Fail the launch once this much time has passed
    Bounded(Duration),
}

/// Returns true when the first line of `contents` is exactly `marker`.
///
/// The line is compared raw, terminator included, so the peer must write the
/// marker with no trailing newline or whitespace.
pub fn marker_matches(contents: &str, marker: &str) -> bool {
    let line = match contents.find('\n') {
        Some(end) => &contents[..=end],
        None => contents,
    };
    line == marker
}

/// Polls a log file for a readiness marker
#[derive(Debug, Clone)]
pub struct ReadinessWatch {
    log_path: PathBuf,
    marker: String,
}

impl ReadinessWatch {
    pub fn new(log_path: impl Into<PathBuf>, marker: impl Into<String>) -> Self {
        Self {
            log_path: log_path.into(),
            marker: marker.into(),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Check the file once. A missing or unreadable file is simply not ready.
    pub async fn check(&self) -> bool {
        match read_first_line(&self.log_path).await {
            Ok(Some(line)) => marker_matches(&line, &self.marker),
            Ok(None) | Err(_) => false,
        }
    }
}

/// Read the first line of a file, terminator kept
async fn read_first_line(path: &Path) -> io::Result<Option<String>> {
    let file = File::open(path).await?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();

    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}
