//! Transport error types.

use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors that can occur in transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The MCP handshake over stdio failed.
    #[error("Server initialization error: {0}")]
    InitError(String),

    /// Service error from rmcp while serving.
    #[error("Service error: {0}")]
    ServiceError(String),
}

impl TransportError {
    /// Create an initialization error.
    pub fn init(msg: impl Into<String>) -> Self {
        Self::InitError(msg.into())
    }

    /// Create a service error.
    pub fn service(msg: impl Into<String>) -> Self {
        Self::ServiceError(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_cause() {
        assert_eq!(
            TransportError::init("connection closed").to_string(),
            "Server initialization error: connection closed"
        );
        assert_eq!(
            TransportError::service("task aborted").to_string(),
            "Service error: task aborted"
        );
    }
}
