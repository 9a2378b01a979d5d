//! Cero adapter: subdomain discovery from TLS certificate names.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::instrument;

use super::common::{strip_ansi, success_result};
use crate::core::process::{CommandRunner, ExternalTool, SuccessPolicy};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::tool_route;

/// Parameters for `do-cero`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CeroParams {
    /// Host, IPv4/IPv6 address or CIDR range (e.g. 192.168.0.0/24)
    pub target: String,

    /// Maximum number of concurrent TLS connections
    pub concurrency: Option<u32>,

    /// TLS ports to connect to (default 443), e.g. ["443", "8443"]
    pub ports: Option<Vec<String>>,

    /// TLS handshake timeout in seconds (cero default 4)
    #[serde(rename = "timeOut")]
    pub time_out: Option<u32>,
}

impl CeroParams {
    fn to_args(&self) -> Vec<String> {
        let mut args = vec![self.target.clone()];
        if let Some(c) = self.concurrency.filter(|c| *c > 0) {
            args.extend(["-c".to_string(), c.to_string()]);
        }
        if let Some(ports) = self.ports.as_ref().filter(|p| !p.is_empty()) {
            args.extend(["-p".to_string(), ports.join(",")]);
        }
        if let Some(t) = self.time_out.filter(|t| *t > 0) {
            args.extend(["-t".to_string(), t.to_string()]);
        }
        args
    }
}

pub struct CeroTools {
    cero: ExternalTool,
}

impl CeroTools {
    pub const RUN: &'static str = "do-cero";
    const RUN_DESCRIPTION: &'static str =
        "Execute Cero, a certificate-based subdomain enumeration tool. \
        It connects to targets over TLS, extracts domain names from certificates (SAN fields) \
        and outputs discovered hostnames.";

    /// Exit 0, or no exit code at all (terminated by signal), counts as success.
    pub fn policy() -> SuccessPolicy {
        SuccessPolicy::custom(|output| matches!(output.exit_code, Some(0) | None))
    }

    pub fn new(binary: PathBuf, runner: Arc<CommandRunner>) -> Self {
        Self::with_tool(ExternalTool::new(binary, Self::policy(), runner))
    }

    pub fn with_tool(cero: ExternalTool) -> Self {
        Self { cero }
    }

    #[instrument(skip_all, fields(target = %params.target))]
    pub async fn run(self: Arc<Self>, params: CeroParams) -> Result<CallToolResult, ToolError> {
        let output = self.cero.run(params.to_args()).await?;
        Ok(success_result(output.annotate(strip_ansi(&output.combined()))))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        ToolRouter::new().with_route(tool_route(
            Self::RUN,
            Self::RUN_DESCRIPTION,
            Arc::new(self),
            Self::run,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process::testing::{echo_args_tool, fake_tool};
    use crate::domains::tools::definitions::common::result_text;

    #[test]
    fn test_args_from_params() {
        let params: CeroParams = serde_json::from_value(serde_json::json!({
            "target": "example.com",
            "concurrency": 50,
            "ports": ["443", "8443"],
            "timeOut": 6
        }))
        .unwrap();
        assert_eq!(
            params.to_args(),
            vec!["example.com", "-c", "50", "-p", "443,8443", "-t", "6"]
        );
    }

    #[tokio::test]
    async fn test_killed_by_signal_still_succeeds() {
        let tools = Arc::new(CeroTools::with_tool(fake_tool(
            "echo www.example.com; kill -9 $$",
            CeroTools::policy(),
        )));
        let result = tools
            .run(CeroParams {
                target: "example.com".into(),
                concurrency: None,
                ports: None,
                time_out: None,
            })
            .await
            .unwrap();
        assert_eq!(result_text(&result), "www.example.com\n");
    }

    #[tokio::test]
    async fn test_minimal_invocation() {
        let tools = Arc::new(CeroTools::with_tool(echo_args_tool(CeroTools::policy())));
        let result = tools
            .run(CeroParams {
                target: "10.0.0.0/30".into(),
                concurrency: None,
                ports: Some(vec![]),
                time_out: None,
            })
            .await
            .unwrap();
        assert_eq!(result_text(&result), "10.0.0.0/30\n");
    }
}
