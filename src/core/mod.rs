//! Core module containing shared infrastructure components.
//!
//! This module provides the building blocks every adapter relies on: the
//! command line, configuration, error handling, subprocess execution, REST
//! clients, path confinement, the MCP server handler and its transport.

pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod process;
pub mod security;
pub mod server;
pub mod transport;

pub use cli::{AdapterCommand, Cli};
pub use config::Config;
pub use error::{Error, Result};
pub use security::{PathSecurityError, confine_path};
pub use server::McpServer;
pub use transport::StdioTransport;
