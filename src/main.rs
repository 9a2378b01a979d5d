//! Adapter entry point.
//!
//! Parses the adapter subcommand, loads configuration, initializes logging on
//! stderr and serves the adapter's tools over stdio.

use anyhow::Result;
use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt};

use security_mcp_adapters::core::{Cli, Config, McpServer, StdioTransport};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Usage errors exit 1; --help and --version exit 0.
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    // Load configuration from environment (and .env)
    let config = Config::from_env();

    init_logging(&config.logging.level);

    let adapter = cli.adapter.name();
    info!(adapter, version = %config.server.version, "Starting security MCP adapter");

    let server = McpServer::new(config, &cli.adapter)?;

    info!(adapter, tools = server.tool_names().len(), "Server initialized");

    StdioTransport::run(server).await?;

    info!(adapter, "Server shutting down");

    Ok(())
}

/// Initialize the logging subsystem.
///
/// Logs always go to stderr; stdout carries the MCP protocol.
fn init_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
