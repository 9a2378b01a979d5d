//! Tool-specific error types.

use rmcp::ErrorData as McpError;
use rmcp::model::CallToolResult;
use thiserror::Error;

use super::definitions::common::error_result;
use crate::core::http::HttpError;
use crate::core::process::ExecError;
use crate::core::security::PathSecurityError;

/// Errors that can occur while handling one tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments passed schema validation but break a cross-field rule.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The security tool could not be started or reported failure.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// The remote API could not be reached or rejected the request.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// A referenced scan, target or file does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A local path was refused by the confinement rules.
    #[error(transparent)]
    Path(#[from] PathSecurityError),

    /// Local file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A report could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A remote answer lacked a field the next step depends on.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ToolError {
    /// Create a new "invalid arguments" error.
    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    /// Create a new "not found" error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a new "unexpected response" error.
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::UnexpectedResponse(msg.into())
    }

    /// Translate into what the caller sees.
    ///
    /// Argument problems are protocol errors (`invalid_params`); everything
    /// else is a tool result flagged `is_error` so the client can read the
    /// tool's own diagnostics.
    pub fn into_call_result(self, tool: &str) -> Result<CallToolResult, McpError> {
        match self {
            Self::InvalidArguments(msg) => Err(McpError::invalid_params(
                format!("Invalid arguments for {tool}: {msg}"),
                None,
            )),
            other => Ok(error_result(&format!("{tool} failed: {other}"))),
        }
    }
}
