//! Typed tool routes.
//!
//! Every operation is an async method taking the adapter state and a
//! `Deserialize + JsonSchema` params struct. [`tool_route`] derives the input
//! schema from the struct, rejects malformed arguments before the handler
//! runs, and turns handler errors into MCP results.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use rmcp::{
    ErrorData as McpError,
    handler::server::tool::{ToolCallContext, ToolRoute, cached_schema_for_type},
    model::{CallToolResult, Tool},
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use super::ToolError;

/// Parameters for operations that take none.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct NoParams {}

/// Describe an operation for listing.
pub fn tool_descriptor<P>(name: &'static str, description: &'static str) -> Tool
where
    P: JsonSchema + 'static,
{
    Tool {
        name: name.into(),
        description: Some(description.into()),
        input_schema: cached_schema_for_type::<P>(),
        annotations: None,
        output_schema: None,
        icons: None,
        meta: None,
        title: None,
    }
}

/// Build a route whose handler receives the shared adapter state and the
/// validated params.
pub fn tool_route<S, C, P, F, Fut>(
    name: &'static str,
    description: &'static str,
    state: Arc<C>,
    handler: F,
) -> ToolRoute<S>
where
    S: Send + Sync + 'static,
    C: Send + Sync + 'static,
    P: DeserializeOwned + JsonSchema + Send + 'static,
    F: Fn(Arc<C>, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CallToolResult, ToolError>> + Send + 'static,
{
    let handler = Arc::new(handler);
    ToolRoute::new_dyn(
        tool_descriptor::<P>(name, description),
        move |ctx: ToolCallContext<'_, S>| {
            let args = ctx.arguments.clone().unwrap_or_default();
            let state = state.clone();
            let handler = handler.clone();
            async move {
                let params: P = serde_json::from_value(serde_json::Value::Object(args))
                    .map_err(|e| {
                        warn!(tool = name, "Rejected arguments: {}", e);
                        McpError::invalid_params(format!("Invalid arguments for {name}: {e}"), None)
                    })?;
                info!(tool = name, "Calling tool");
                match handler(state, params).await {
                    Ok(result) => Ok(result),
                    Err(err) => err.into_call_result(name),
                }
            }
            .boxed()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::definitions::common::success_result;
    use rmcp::handler::server::tool::ToolRouter;

    struct TestServer {}

    /// Example params exercising required, optional and defaulted fields.
    #[derive(Debug, Deserialize, JsonSchema)]
    struct LookupParams {
        /// Host to look up
        target: String,
        /// Optional port list
        ports: Option<Vec<u16>>,
        #[serde(default)]
        verbose: bool,
    }

    async fn lookup(_state: Arc<()>, params: LookupParams) -> Result<CallToolResult, ToolError> {
        Ok(success_result(format!(
            "{} {:?} {}",
            params.target, params.ports, params.verbose
        )))
    }

    async fn noop(_state: Arc<()>, _params: NoParams) -> Result<CallToolResult, ToolError> {
        Ok(success_result("ok".into()))
    }

    #[test]
    fn test_schema_marks_required_fields() {
        let tool = tool_descriptor::<LookupParams>("lookup", "Look up a host");
        let required = tool.input_schema.get("required").expect("required list");
        assert_eq!(required, &serde_json::json!(["target"]));
        let props = tool.input_schema.get("properties").unwrap();
        assert!(props.get("ports").is_some());
        assert!(props.get("verbose").is_some());
    }

    #[test]
    fn test_listing_is_stable() {
        let router: ToolRouter<TestServer> = ToolRouter::new()
            .with_route(tool_route("lookup", "Look up a host", Arc::new(()), lookup))
            .with_route(tool_route("noop", "Nothing", Arc::new(()), noop));
        let first = serde_json::to_string(&router.list_all()).unwrap();
        let second = serde_json::to_string(&router.list_all()).unwrap();
        assert_eq!(router.list_all().len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_params_accepts_empty_object() {
        let params: NoParams = serde_json::from_value(serde_json::json!({})).unwrap();
        let _ = params;
    }
}
