//! WolfHA Error Types

use thiserror::Error;

/// Result type alias for WolfHA operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfHA error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Send to {address} failed: {reason}")]
    SendFailed { address: String, reason: String },

    // Protocol errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unknown message type: {0:#04x}")]
    UnknownMessageType(u8),

    #[error("Message checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    // Channel errors
    #[error("Outbound channel closed")]
    ChannelClosed,

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is transient (the next tick may succeed)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::SendFailed { .. }
        )
    }
}
