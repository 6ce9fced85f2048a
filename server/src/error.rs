//! Unified error handling for the server.

use std::io;

use crate::config::ConfigError;

/// Errors that end a session.
///
/// Anything that is not fatal to the connection is logged where it happens
/// and never becomes a `SessionError`.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("connection closed mid-frame")]
    Truncated,
}

/// Errors that stop the server from starting or running.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("dataset error: {0}")]
    Dataset(#[from] lodge_engine::Error),

    #[error("listener error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for session code.
pub type Result<T> = std::result::Result<T, SessionError>;
