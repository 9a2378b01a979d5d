//! MCP server handler.
//!
//! One `McpServer` serves one adapter: its tool router is built from the CLI
//! subcommand at startup and only tools are advertised.

use std::sync::Arc;

use rmcp::{ServerHandler, handler::server::tool::ToolRouter, model::*, tool_handler};

use super::cli::AdapterCommand;
use super::config::Config;
use super::error;
use super::process::CommandRunner;
use crate::domains::tools::build_tool_router;

/// The main MCP server handler.
#[derive(Clone)]
pub struct McpServer {
    /// Server configuration.
    config: Arc<Config>,

    /// Name reported to the client: `MCP_SERVER_NAME` or the adapter name.
    name: String,

    /// Tool router for handling tool calls.
    tool_router: ToolRouter<Self>,
}

impl McpServer {
    /// Create the server for `adapter`.
    pub fn new(config: Config, adapter: &AdapterCommand) -> error::Result<Self> {
        let runner = Arc::new(CommandRunner::new(&config.execution));
        let tool_router = build_tool_router::<Self>(adapter, &config, runner)?;
        let name = config
            .server
            .name
            .clone()
            .unwrap_or_else(|| adapter.name().to_string());

        Ok(Self {
            config: Arc::new(config),
            name,
            tool_router,
        })
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the registered operations, in listing order.
    pub fn tool_names(&self) -> Vec<String> {
        self.tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect()
    }
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(format!(
                "Security tool adapter for {}. Call the listed tools; results are plain text.",
                self.name
            )),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: self.name.clone(),
                version: self.config.server.version.clone(),
                ..Implementation::from_build_env()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use rmcp::{ServiceError, ServiceExt};
    use serde_json::{Value, json};
    use tempfile::TempDir;

    /// A stand-in nmap that records that it was started.
    fn spy_binary(dir: &Path, marker: &Path) -> std::path::PathBuf {
        let path = dir.join("nmap");
        let script = format!(
            "#!/bin/sh\ntouch '{}'\necho \"Nmap scan report for $3\"\n",
            marker.display()
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn call(name: &'static str, arguments: Value) -> CallToolRequestParam {
        CallToolRequestParam {
            name: name.into(),
            arguments: arguments.as_object().cloned(),
        }
    }

    fn invalid_params(err: ServiceError) -> ErrorData {
        match err {
            ServiceError::McpError(e) if e.code == ErrorCode::INVALID_PARAMS => e,
            other => panic!("expected invalid params, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_over_mcp() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let binary = spy_binary(dir.path(), &marker);
        let server = McpServer::new(Config::default(), &AdapterCommand::Nmap { binary }).unwrap();

        let (server_io, client_io) = tokio::io::duplex(4096);
        let serving = tokio::spawn(async move {
            server.serve(server_io).await?.waiting().await?;
            anyhow::Ok(())
        });
        let client = ().serve(client_io).await.unwrap();

        let first = serde_json::to_string(&client.list_all_tools().await.unwrap()).unwrap();
        let second = serde_json::to_string(&client.list_all_tools().await.unwrap()).unwrap();
        assert_eq!(first, second);
        assert!(first.contains("\"nmap-scan\""));

        // Missing `target` is rejected before the binary is started.
        let err = client.call_tool(call("nmap-scan", json!({}))).await.unwrap_err();
        assert!(invalid_params(err).message.contains("Invalid arguments for nmap-scan"));
        assert!(!marker.exists());

        let err = client
            .call_tool(call("nmap-traceroute", json!({"target": "127.0.0.1"})))
            .await
            .unwrap_err();
        invalid_params(err);
        assert!(!marker.exists());

        let result = client
            .call_tool(call("nmap-scan", json!({"target": "127.0.0.1"})))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(false));
        assert!(marker.exists());

        client.cancel().await.unwrap();
        serving.abort();
    }

    #[test]
    fn test_name_defaults_to_adapter() {
        let server = McpServer::new(Config::default(), &AdapterCommand::Nessus).unwrap();
        assert_eq!(server.name(), "nessus");
        assert_eq!(server.tool_names().len(), 7);

        let info = server.get_info();
        assert!(info.capabilities.tools.is_some());
        assert!(info.capabilities.resources.is_none());
        assert_eq!(info.server_info.name, "nessus");
    }

    #[test]
    fn test_configured_name_wins() {
        let mut config = Config::default();
        config.server.name = Some("recon-nmap".to_string());
        let server = McpServer::new(
            config,
            &AdapterCommand::Nmap {
                binary: "/usr/bin/nmap".into(),
            },
        )
        .unwrap();
        assert_eq!(server.name(), "recon-nmap");
        assert_eq!(server.tool_names(), vec!["nmap-scan"]);
    }
}
