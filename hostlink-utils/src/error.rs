//! Error types for hostlink
//!
//! Provides a unified error type used across all hostlink crates.

use std::path::PathBuf;

/// Main error type for hostlink operations
#[derive(Debug, thiserror::Error)]
pub enum HostlinkError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    // === Connection Errors ===

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection timeout after {seconds}s")]
    ConnectionTimeout { seconds: u64 },

    #[error("Connection lost before a response arrived")]
    ConnectionLost,

    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Host error in {command}: {message}")]
    Host { command: String, message: String },

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HostlinkError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a host error from an error response
    pub fn host(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Host {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// A lost connection is retryable from the transport's point of view, but
    /// the request it carried has an unknown outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::Connection(_)
                | Self::ConnectionLost
        )
    }

    /// The host's error message, if this error came from an error response
    pub fn host_message(&self) -> Option<&str> {
        match self {
            Self::Host { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Result type alias using HostlinkError
pub type Result<T> = std::result::Result<T, HostlinkError>;
