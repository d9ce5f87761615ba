//! # Error Module
//!
//! This module provides the error type shared by every link operation.
//! It uses the `thiserror` crate for ergonomic error handling.

use thiserror::Error;

/// Result type alias for `embedpost` operations.
pub type Result<T> = std::result::Result<T, LinkError>;

/// Main error type for the link manager.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The device or address could not be opened.
    #[error("Failed to open '{target}': {reason}")]
    OpenFailed { target: String, reason: String },

    /// A write was attempted while no session is active.
    #[error("No active connection")]
    NotConnected,

    /// The active session is not the kind the caller asked for.
    #[error("Requested transport '{requested}' but the active connection is '{active}'")]
    WrongTransport { requested: String, active: String },

    /// The caller named a transport kind that does not exist.
    #[error("Unknown transport kind: {0}")]
    UnknownTransportKind(String),

    /// The transport rejected a write.
    #[error("Failed to write data: {0}")]
    WriteFailed(String),

    /// The transport reported an error while closing.
    #[error("Failed to close connection: {0}")]
    CloseFailed(String),

    /// Serial port enumeration is unsupported or failed.
    #[error("Failed to list serial ports: {0}")]
    EnumerationFailed(String),

    /// A connection profile could not be read or parsed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LinkError {
    /// Creates a new open error.
    #[must_use]
    pub fn open_failed(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::OpenFailed {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a new write error.
    #[must_use]
    pub fn write_failed(reason: impl ToString) -> Self {
        Self::WriteFailed(reason.to_string())
    }

    /// Creates a new close error.
    #[must_use]
    pub fn close_failed(reason: impl ToString) -> Self {
        Self::CloseFailed(reason.to_string())
    }

    /// Creates a new enumeration error.
    #[must_use]
    pub fn enumeration_failed(reason: impl ToString) -> Self {
        Self::EnumerationFailed(reason.to_string())
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl ToString) -> Self {
        Self::InvalidConfig(reason.to_string())
    }
}
