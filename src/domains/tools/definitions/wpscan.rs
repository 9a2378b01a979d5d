//! WPScan adapter: WordPress vulnerability scanning.

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

// ============================================================================
// Tool Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    Mixed,
    Passive,
    Aggressive,
}

impl DetectionMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Mixed => "mixed",
            Self::Passive => "passive",
            Self::Aggressive => "aggressive",
        }
    }
}

/// WordPress enumeration targets.
#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Enumeration {
    /// Vulnerable plugins
    Vp,
    /// All plugins
    Ap,
    /// Popular plugins
    P,
    /// Vulnerable themes
    Vt,
    /// All themes
    At,
    /// Popular themes
    T,
    /// Timthumbs
    Tt,
    /// Config backups
    Cb,
    /// Database exports
    Dbe,
}

impl Enumeration {
    fn as_str(self) -> &'static str {
        match self {
            Self::Vp => "vp",
            Self::Ap => "ap",
            Self::P => "p",
            Self::Vt => "vt",
            Self::At => "at",
            Self::T => "t",
            Self::Tt => "tt",
            Self::Cb => "cb",
            Self::Dbe => "dbe",
        }
    }
}

/// Parameters for `do-wpscan`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WpscanParams {
    /// Target WordPress URL (http:// or https://)
    pub url: String,

    /// mixed (default), passive or aggressive
    pub detection_mode: Option<DetectionMode>,

    /// Rotate a random user agent per request
    #[serde(default)]
    pub random_user_agent: bool,

    /// Maximum concurrent threads (wpscan default 5)
    pub max_threads: Option<u32>,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub disable_tls_checks: bool,

    /// Proxy, e.g. http://127.0.0.1:8080
    pub proxy: Option<String>,

    /// Cookies, e.g. "name1=value1; name2=value2"
    pub cookies: Option<String>,

    /// Skip WordPress detection and 403 checks
    #[serde(default)]
    pub force: bool,

    /// Enumeration options. Only one of vp/ap/p and one of vt/at/t may be used.
    pub enumerate: Vec<Enumeration>,
}

impl WpscanParams {
    fn to_args(&self) -> Vec<String> {
        let mut args = vec!["-u".to_string(), self.url.clone()];
        if let Some(mode) = self.detection_mode {
            args.extend(["--detection-mode".to_string(), mode.as_str().to_string()]);
        }
        if self.random_user_agent {
            args.push("--random-user-agent".to_string());
        }
        if let Some(threads) = self.max_threads.filter(|t| *t > 0) {
            args.extend(["-t".to_string(), threads.to_string()]);
        }
        if self.disable_tls_checks {
            args.push("--disable-tls-checks".to_string());
        }
        if let Some(proxy) = &self.proxy {
            args.extend(["--proxy".to_string(), proxy.clone()]);
        }
        if let Some(cookies) = &self.cookies {
            args.extend(["--cookie-string".to_string(), cookies.clone()]);
        }
        if self.force {
            args.push("--force".to_string());
        }
        if !self.enumerate.is_empty() {
            let list: Vec<_> = self.enumerate.iter().map(|e| e.as_str()).collect();
            args.extend(["-e".to_string(), list.join(",")]);
        }
        args
    }
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct WpscanTools {
    wpscan: ExternalTool,
}

impl WpscanTools {
    pub const RUN: &'static str = "do-wpscan";
    const RUN_DESCRIPTION: &'static str = "Run wpscan to analyze WordPress web sites";

    pub fn new(binary: PathBuf, runner: Arc<CommandRunner>) -> Self {
        Self::with_tool(ExternalTool::new(binary, SuccessPolicy::ExitCodeZero, runner))
    }

    pub fn with_tool(wpscan: ExternalTool) -> Self {
        Self { wpscan }
    }

    #[instrument(skip_all, fields(url = %params.url))]
    pub async fn run(self: Arc<Self>, params: WpscanParams) -> Result<CallToolResult, ToolError> {
        require_http_url("url", &params.url)?;

        let output = self.wpscan.run(params.to_args()).await?;
        let text = format!(
            "{}\n wpscan completed successfully",
            strip_ansi(&output.combined())
        );
        Ok(success_result(output.annotate(text)))
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
