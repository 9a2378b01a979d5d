//! Commix adapter (command injection exploitation detector).
//!
//! Commix is a Python script, so the adapter is started with the
//! interpreter and the script path; the script becomes the first argument.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::instrument;

use super::common::{require_http_url, strip_ansi, success_result};
use crate::core::process::{CommandRunner, ExternalTool, SuccessPolicy};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::tool_route;

/// Parameters for `do-commix`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CommixParams {
    /// Target URL to test for command injection
    pub url: String,
}

pub struct CommixTools {
    commix: ExternalTool,
}

impl CommixTools {
    pub const RUN: &'static str = "do-commix";
    const RUN_DESCRIPTION: &'static str =
        "Run commix against a URL to detect OS command injection vulnerabilities";

    pub fn new(python: PathBuf, script: PathBuf, runner: Arc<CommandRunner>) -> Self {
        let script = script.to_string_lossy().into_owned();
        Self::with_tool(
            ExternalTool::new(python, SuccessPolicy::ExitCodeZero, runner).with_base_args([script]),
        )
    }

    pub fn with_tool(commix: ExternalTool) -> Self {
        Self { commix }
    }

    #[instrument(skip_all, fields(url = %params.url))]
    pub async fn run(self: Arc<Self>, params: CommixParams) -> Result<CallToolResult, ToolError> {
        require_http_url("url", &params.url)?;

        // The URL is passed both to -u and as a trailing positional argument.
        let output = self
            .commix
            .run(["-u".to_string(), params.url.clone(), params.url])
            .await?;
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
    use crate::core::process::testing::fake_tool;
    use crate::domains::tools::definitions::common::result_text;

    #[tokio::test]
    async fn test_output_is_merged_and_cleaned() {
        let tool = fake_tool(
            r#"printf '\033[1;32m[info]\033[0m Testing %s\n' "$2"; echo 'warning: batch mode' >&2"#,
            SuccessPolicy::ExitCodeZero,
        );
        let tools = Arc::new(CommixTools::with_tool(tool));
        let result = tools
            .run(CommixParams {
                url: "http://target.test/?id=1".into(),
            })
            .await
            .unwrap();
        assert_eq!(
            result_text(&result),
            "[info] Testing http://target.test/?id=1\nwarning: batch mode\n"
        );
    }

    #[tokio::test]
    async fn test_invalid_url_never_spawns() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("spawned");
        let tool = fake_tool(
            &format!("touch {}", marker.display()),
            SuccessPolicy::ExitCodeZero,
        );
        let tools = Arc::new(CommixTools::with_tool(tool));
        let err = tools
            .run(CommixParams {
                url: "not a url".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(!marker.exists());
    }
}
