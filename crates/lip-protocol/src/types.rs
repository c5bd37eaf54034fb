//! Common types used throughout the protocol

use serde::{Deserialize, Serialize};
use std::num::{ParseFloatError, ParseIntError};
use thiserror::Error;

/// Protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Read timeout")]
    Timeout,

    #[error("Line is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    #[error("Connection not established")]
    NotConnected,

    #[error("Connection closed by repeater")]
    ConnectionClosed,

    #[error("Login rejected by repeater")]
    LoginFailed,

    #[error("No keep-alive response within {0:?}")]
    KeepAliveTimeout(std::time::Duration),

    #[error("Unable to parse message {line:?}: {source}")]
    InvalidMessage {
        line: String,
        #[source]
        source: FieldError,
    },
}

/// Reasons a response line failed field extraction
#[derive(Error, Debug)]
pub enum FieldError {
    #[error("line does not match the response grammar")]
    NoMatch,

    #[error("missing {0} field")]
    Missing(&'static str),

    #[error("invalid integer in {field}: {source}")]
    Int {
        field: &'static str,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid number in {field}: {source}")]
    Float {
        field: &'static str,
        #[source]
        source: ParseFloatError,
    },
}

/// Operation prefix characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LipOperation {
    /// `#` - set or execute
    Execute,
    /// `?` - query
    Query,
    /// `~` - response or unsolicited push from the repeater
    Response,
}

impl LipOperation {
    #[must_use]
    pub fn prefix(self) -> char {
        match self {
            LipOperation::Execute => '#',
            LipOperation::Query => '?',
            LipOperation::Response => '~',
        }
    }

    #[must_use]
    pub fn from_prefix(c: char) -> Option<Self> {
        match c {
            '#' => Some(LipOperation::Execute),
            '?' => Some(LipOperation::Query),
            '~' => Some(LipOperation::Response),
            _ => None,
        }
    }
}

/// Message category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LipMode {
    Output,
    Device,
    Group,
    Sysvar,
    Monitoring,
    KeepAlive,
    Error,
    Unknown,
}

impl LipMode {
    /// Resolve a wire mode name. Matching is case-sensitive.
    #[must_use]
    pub fn from_wire(name: &str) -> Self {
        match name {
            "OUTPUT" => LipMode::Output,
            "DEVICE" => LipMode::Device,
            "GROUP" => LipMode::Group,
            "SYSVAR" => LipMode::Sysvar,
            "MONITORING" => LipMode::Monitoring,
            _ => LipMode::Unknown,
        }
    }
}

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LipConnectionState {
    #[default]
    NotConnected,
    Connecting,
    Connected,
}

/// Keypad LED state reported with `DeviceAction::LedState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LipLedState {
    Off = 0,
    On = 1,
    NormalFlash = 2,
    RapidFlash = 3,
}

impl TryFrom<i64> for LipLedState {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, i64> {
        match value {
            0 => Ok(LipLedState::Off),
            1 => Ok(LipLedState::On),
            2 => Ok(LipLedState::NormalFlash),
            3 => Ok(LipLedState::RapidFlash),
            _ => Err(value),
        }
    }
}

/// Occupancy group state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LipGroupState {
    Occupied = 3,
    Unoccupied = 4,
    #[default]
    Unknown = 255,
}

impl From<i64> for LipGroupState {
    fn from(value: i64) -> Self {
        match value {
            3 => LipGroupState::Occupied,
            4 => LipGroupState::Unoccupied,
            _ => LipGroupState::Unknown,
        }
    }
}
