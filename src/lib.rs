//! Security tool MCP adapters.
//!
//! Each adapter exposes one command-line or REST security tool (nmap, trivy,
//! semgrep, Nessus, Acunetix, ...) as a set of Model Context Protocol tools
//! served over stdio.
//!
//! # Architecture
//!
//! - **core**: CLI, configuration, error handling, subprocess runner, REST
//!   client, path confinement, the MCP server and its transport
//! - **domains**: the adapters themselves
//!   - **tools**: one module per security tool under `definitions/`
//!
//! # Example
//!
//! ```rust,no_run
//! use security_mcp_adapters::core::{AdapterCommand, Config, McpServer, StdioTransport};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env();
//!     let server = McpServer::new(config, &AdapterCommand::Nessus)?;
//!     StdioTransport::run(server).await?;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod domains;

// Re-export commonly used types for convenience
pub use core::{Config, Error, McpServer, Result};
