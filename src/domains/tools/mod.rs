//! Tools domain module.
//!
//! Every security tool adapter is a set of MCP tools.
//!
//! ## Architecture
//!
//! - `definitions/` - One module per adapter, plus shared result helpers
//! - `route.rs` - Typed route builder: schema, argument validation, error mapping
//! - `router.rs` - Builds the ToolRouter for the adapter selected on the CLI
//! - `error.rs` - Tool-specific error types
//!
//! ## Adding an Operation
//!
//! 1. Add a params struct and an async handler to the adapter's `*Tools` impl
//! 2. Add a `NAME` constant and a `with_route(tool_route(..))` line in its `router()`

pub mod definitions;
mod error;
pub mod route;
pub mod router;

pub use error::ToolError;
pub use router::build_tool_router;
