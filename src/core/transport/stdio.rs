//! STDIO transport implementation.
//!
//! Every adapter speaks MCP over its own stdin/stdout; logs go to stderr.

use rmcp::ServiceExt;
use tracing::info;

use super::{TransportError, TransportResult};
use crate::core::McpServer;

/// STDIO transport handler.
pub struct StdioTransport;

impl StdioTransport {
    /// Serve `server` until the client closes the stream.
    pub async fn run(server: McpServer) -> TransportResult<()> {
        let adapter = server.name().to_string();
        info!(adapter = %adapter, "Ready - communicating via stdin/stdout");

        let service = server
            .serve(rmcp::transport::stdio())
            .await
            .map_err(|e| TransportError::init(e.to_string()))?;

        service
            .waiting()
            .await
            .map_err(|e| TransportError::service(e.to_string()))?;

        info!(adapter = %adapter, "STDIO transport finished");
        Ok(())
    }
}
