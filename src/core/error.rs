//! Error types and handling for the adapter processes.
//!
//! Each layer owns its own error enum (`ExecError` for subprocesses,
//! `HttpError` for REST calls, `ToolError` for handlers). This module defines
//! the top-level error that can stop a process before or while serving.

use thiserror::Error;

use crate::core::transport::TransportError;

/// A specialized Result type for adapter startup and serving.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for process-level failures.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid startup configuration (CLI arguments, environment).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The MCP transport failed to start or terminated abnormally.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// REST client construction failed.
    #[error("HTTP client error: {0}")]
    Http(#[from] crate::core::http::HttpError),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
