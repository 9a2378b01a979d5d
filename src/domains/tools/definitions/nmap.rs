//! Nmap adapter.
//!
//! A single operation that forwards caller-chosen nmap flags followed by the
//! target. Defaults to a quick scan (`-T4 -F`).

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::instrument;

use super::common::success_result;
use crate::core::process::{CommandRunner, ExternalTool, SuccessPolicy};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::tool_route;

// ============================================================================
// Tool Parameters
// ============================================================================

fn default_scan_args() -> Vec<String> {
    vec!["-T4".to_string(), "-F".to_string()]
}

/// Parameters for `nmap-scan`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct NmapScanParams {
    /// Target IP address, hostname, or CIDR range to scan
    pub target: String,

    /// Nmap arguments placed before the target. Defaults to a quick scan (-T4 -F).
    /// Common options: -sS (SYN), -sT (connect), -sU (UDP), -sV (versions),
    /// -sC (default scripts), -O (OS), -A (aggressive), -p <ports>,
    /// -T<0-5> (timing), --top-ports <n>, -Pn, -n, -v, -oX - (XML to stdout)
    #[serde(default = "default_scan_args")]
    pub args: Vec<String>,
}

// ============================================================================
// Tool Definition
// ============================================================================

/// Nmap network scanner.
pub struct NmapTools {
    nmap: ExternalTool,
}

impl NmapTools {
    pub const SCAN: &'static str = "nmap-scan";
    const SCAN_DESCRIPTION: &'static str = "Run Nmap network scan on the specified target. \
        Nmap is a powerful network discovery and security auditing tool.";

    pub fn new(binary: PathBuf, runner: Arc<CommandRunner>) -> Self {
        Self::with_tool(ExternalTool::new(binary, SuccessPolicy::ExitCodeZero, runner))
    }

    pub fn with_tool(nmap: ExternalTool) -> Self {
        Self { nmap }
    }

    #[instrument(skip_all, fields(target = %params.target))]
    pub async fn scan(
        self: Arc<Self>,
        params: NmapScanParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = params.args;
        args.push(params.target);

        let output = self.nmap.run(args).await?;
        let text = if output.stdout.is_empty() {
            "Scan completed with no output".to_string()
        } else {
            output.stdout.clone()
        };
        Ok(success_result(output.annotate(text)))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new().with_route(tool_route(
            Self::SCAN,
            Self::SCAN_DESCRIPTION,
            this,
            Self::scan,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process::testing::{echo_args_tool, fake_tool, missing_tool};
    use crate::domains::tools::definitions::common::result_text;

    fn params(json: serde_json::Value) -> NmapScanParams {
        serde_json::from_value(json).unwrap()
    }

    #[tokio::test]
    async fn test_default_args_precede_target() {
        let tools = Arc::new(NmapTools::with_tool(echo_args_tool(SuccessPolicy::ExitCodeZero)));
        let result = tools.scan(params(serde_json::json!({"target": "10.0.0.1"}))).await.unwrap();
        assert_eq!(result_text(&result), "-T4\n-F\n10.0.0.1\n");
    }

    #[tokio::test]
    async fn test_empty_output_message() {
        let tools = Arc::new(NmapTools::with_tool(fake_tool(
            "exit 0",
            SuccessPolicy::ExitCodeZero,
        )));
        let result = tools
            .scan(params(serde_json::json!({"target": "scanme.nmap.org", "args": ["-sV"]})))
            .await
            .unwrap();
        assert_eq!(result_text(&result), "Scan completed with no output");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_tool_failure() {
        let tools = Arc::new(NmapTools::with_tool(fake_tool(
            "echo 'Failed to resolve \"nohost\".' >&2; exit 1",
            SuccessPolicy::ExitCodeZero,
        )));
        let err = tools
            .scan(params(serde_json::json!({"target": "nohost"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited with code 1"));
        assert!(err.to_string().contains("Failed to resolve"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let tools = Arc::new(NmapTools::with_tool(missing_tool(SuccessPolicy::ExitCodeZero)));
        let err = tools
            .scan(params(serde_json::json!({"target": "10.0.0.1"})))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to start security-tool"));
    }

    #[test]
    fn test_target_is_required() {
        let err = serde_json::from_value::<NmapScanParams>(serde_json::json!({"args": ["-F"]}))
            .unwrap_err();
        assert!(err.to_string().contains("target"));
    }
}
