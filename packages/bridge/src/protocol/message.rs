// packages/bridge/src/protocol/message.rs
//! Tagged text messages exchanged with the peers
//!
//! Every frame starts with a `#` tag and the payload follows immediately:
//!
//! ```text
//! #ack            acknowledgment
//! #ack12.5        acknowledgment with a negotiated frequency (Hz)
//! #con<text>      console line from the GUI
//! #code <source>  user code for the exercise
//! #freq{...}      frequency report for the exercise
//! #gui{...}       state update from the GUI peer
//! #exc{...}       state update from the exercise peer
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use tracing::warn;

pub const TAG_ACK: &str = "#ack";
pub const TAG_CONSOLE: &str = "#con";
pub const TAG_CODE: &str = "#code ";
pub const TAG_FREQUENCY: &str = "#freq";
pub const TAG_GUI: &str = "#gui";
pub const TAG_EXERCISE: &str = "#exc";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message has no tag")]
    Untagged,

    #[error("unknown tag '{0}'")]
    UnknownTag(String),

    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// Which peer produced a state update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    Gui,
    Exercise,
}

impl UpdateSource {
    pub fn tag(&self) -> &'static str {
        match self {
            UpdateSource::Gui => TAG_GUI,
            UpdateSource::Exercise => TAG_EXERCISE,
        }
    }
}

/// `#freq` payload
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyReport {
    pub brain: f64,
    pub gui: f64,
    pub rtf: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `frequency` is set only for a positive, finite trailing value
    Ack { frequency: Option<f64> },
    Console(String),
    Code(String),
    Frequency(FrequencyReport),
    Update {
        source: UpdateSource,
        payload: Map<String, Value>,
    },
}

impl Message {
    /// Parse one inbound frame. Tags are matched by prefix, case-sensitively.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        if !text.starts_with('#') {
            return Err(ProtocolError::Untagged);
        }

        if let Some(rest) = text.strip_prefix(TAG_ACK) {
            return Ok(Message::Ack {
                frequency: parse_ack_frequency(rest),
            });
        }
        if let Some(rest) = text.strip_prefix(TAG_CODE) {
            return Ok(Message::Code(rest.to_string()));
        }
        if let Some(rest) = text.strip_prefix(TAG_CONSOLE) {
            return Ok(Message::Console(rest.to_string()));
        }
        if let Some(rest) = text.strip_prefix(TAG_FREQUENCY) {
            return Ok(Message::Frequency(serde_json::from_str(rest)?));
        }
        if let Some(rest) = text.strip_prefix(TAG_GUI) {
            return parse_update(UpdateSource::Gui, rest);
        }
        if let Some(rest) = text.strip_prefix(TAG_EXERCISE) {
            return parse_update(UpdateSource::Exercise, rest);
        }

        let tag: String = text
            .chars()
            .take_while(|c| *c == '#' || c.is_ascii_alphanumeric())
            .take(16)
            .collect();
        Err(ProtocolError::UnknownTag(tag))
    }

    pub fn ack() -> Self {
        Message::Ack { frequency: None }
    }

    pub fn code(source: impl Into<String>) -> Self {
        Message::Code(source.into())
    }

    pub fn update(source: UpdateSource, payload: Map<String, Value>) -> Self {
        Message::Update { source, payload }
    }
}

fn parse_ack_frequency(rest: &str) -> Option<f64> {
    let rest = rest.trim();
    if rest.is_empty() {
        return None;
    }

    match rest.parse::<f64>() {
        Ok(frequency) if frequency.is_finite() && frequency > 0.0 => Some(frequency),
        _ => {
            warn!(value = %rest, "Ignoring invalid acknowledgment frequency");
            None
        }
    }
}

fn parse_update(source: UpdateSource, rest: &str) -> Result<Message, ProtocolError> {
    match serde_json::from_str::<Value>(rest.trim_start())? {
        Value::Object(payload) => Ok(Message::Update { source, payload }),
        _ => Err(ProtocolError::NotAnObject),
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Ack { frequency: None } => f.write_str(TAG_ACK),
            Message::Ack {
                frequency: Some(frequency),
            } => write!(f, "{}{}", TAG_ACK, frequency),
            Message::Console(text) => write!(f, "{}{}", TAG_CONSOLE, text),
            Message::Code(source) => write!(f, "{}{}", TAG_CODE, source),
            Message::Frequency(report) => {
                let json = serde_json::to_string(report).map_err(|_| fmt::Error)?;
                write!(f, "{}{}", TAG_FREQUENCY, json)
            }
            Message::Update { source, payload } => {
                let json = serde_json::to_string(payload).map_err(|_| fmt::Error)?;
                write!(f, "{}{}", source.tag(), json)
            }
        }
    }
}
