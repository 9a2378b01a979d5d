//! Domains module containing business logic organized by bounded contexts.
//!
//! The adapters only expose MCP tools, so `tools` is the single domain.

pub mod tools;
