use std::net::SocketAddr;
use thiserror::Error;

/// Web UI errors
#[derive(Debug, Error)]
pub enum UiError {
    #[error("Invalid control: {0}")]
    InvalidControl(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Invalid source id: {0}")]
    InvalidSource(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Source is not active: {0}")]
    InactiveSource(String),

    #[error("Volume change failed for {0}")]
    VolumeFailed(String),

    #[error("Not an output device: {0}")]
    NotAnOutput(String),

    #[error("Failed to set default output {0}")]
    DefaultFailed(String),

    #[error("Malformed message: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Web server error: {0}")]
    Server(std::io::Error),
}

pub type Result<T> = std::result::Result<T, UiError>;
