//! Transport layer for the adapter processes.
//!
//! Adapters are launched by an MCP client as child processes, so the only
//! transport is STDIO: JSON-RPC on stdin/stdout, diagnostics on stderr.

mod error;
pub mod stdio;

pub use error::{TransportError, TransportResult};
pub use stdio::StdioTransport;
