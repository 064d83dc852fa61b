// packages/bridge/src/session/validation.rs
//! User code validation
//!
//! A validator returns an empty string for acceptable code and the error text
//! otherwise. The text is surfaced to the user unchanged.

use crate::utils::config::{split_command, ValidatorConfig};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

pub trait CodeValidator: Send + Sync + 'static {
    fn validate(&self, source: &str) -> String;
}

/// Accepts every program
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl CodeValidator for AcceptAll {
    fn validate(&self, _source: &str) -> String {
        String::new()
    }
}

/// Runs a linter over a temporary copy of the source.
///
/// The file path is appended to the configured command line. A zero exit
/// status accepts the code; otherwise the linter's combined output is the
/// error text.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    command: String,
    file_suffix: String,
}

impl CommandValidator {
    pub fn new(command: impl Into<String>, file_suffix: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            file_suffix: file_suffix.into(),
        }
    }

    fn run(&self, source: &str) -> std::io::Result<String> {
        let (program, args) = split_command(&self.command).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty validator command")
        })?;

        let mut file = tempfile::Builder::new()
            .prefix("user_code_")
            .suffix(&self.file_suffix)
            .tempfile()?;
        file.write_all(source.as_bytes())?;
        file.flush()?;

        let output = Command::new(program)
            .args(args)
            .arg(file.path())
            .stdin(Stdio::null())
            .output()?;

        if output.status.success() {
            return Ok(String::new());
        }

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let text = text.trim().to_string();

        if text.is_empty() {
            Ok(format!("validator exited with {}", output.status))
        } else {
            Ok(text)
        }
    }
}

impl CodeValidator for CommandValidator {
    fn validate(&self, source: &str) -> String {
        match self.run(source) {
            Ok(errors) => {
                debug!(accepted = errors.is_empty(), "Code validated");
                errors
            }
            Err(e) => {
                warn!(command = %self.command, "Validator failed to run: {}", e);
                format!("code validator unavailable: {}", e)
            }
        }
    }
}

/// Validator for a config: the linter command when set, otherwise [`AcceptAll`]
pub fn from_config(config: &ValidatorConfig) -> Box<dyn CodeValidator> {
    match &config.command {
        Some(command) => Box::new(CommandValidator::new(command.clone(), config.file_suffix.clone())),
        None => Box::new(AcceptAll),
    }
}
