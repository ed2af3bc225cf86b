// src/error.rs
//! Error types for the GL200 decoder host
//!
//! Frame decoding itself never fails with an error: a frame that cannot be
//! decoded simply yields no position. These errors cover the surfaces around
//! the decoder (configuration, sockets, output).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Error: {0}")]
    Other(String),
}

impl From<anyhow::Error> for TrackerError {
    fn from(error: anyhow::Error) -> Self {
        TrackerError::Other(error.to_string())
    }
}
