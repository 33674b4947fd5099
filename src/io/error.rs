// src/io/error.rs
//
// Error type for port-level failures. These never cross the InputPort /
// OutputPort boundary: ports log them and report `false` instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    /// Device could not be opened or the link dropped
    #[error("[{device}] connection error: {message}")]
    Connection { device: String, message: String },

    /// Device spoke something we could not understand or encode
    #[error("[{device}] protocol error: {message}")]
    Protocol { device: String, message: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl IoError {
    pub fn connection(device: impl Into<String>, message: impl Into<String>) -> Self {
        IoError::Connection {
            device: device.into(),
            message: message.into(),
        }
    }

    pub fn protocol(device: impl Into<String>, message: impl Into<String>) -> Self {
        IoError::Protocol {
            device: device.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        IoError::Configuration(message.into())
    }
}
