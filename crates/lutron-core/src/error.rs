//! Error types for device control

use thiserror::Error;

/// Errors from the device layer
#[derive(Error, Debug)]
pub enum CoreError {
    /// Protocol or connection error
    #[error("Protocol error: {0}")]
    Protocol(#[from] lip_protocol::ProtocolError),

    /// No output with this integration ID
    #[error("Output not found: {0}")]
    OutputNotFound(u32),

    /// No keypad with this integration ID
    #[error("Keypad not found: {0}")]
    KeypadNotFound(u32),

    /// Level outside 0-100
    #[error("Invalid level: {0}")]
    InvalidLevel(f64),

    /// IO error (persistence)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
