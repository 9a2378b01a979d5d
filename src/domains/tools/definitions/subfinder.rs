//! Subfinder adapter: passive subdomain enumeration.
//!
//! Subfinder may exit non-zero after printing partial results (rate-limited
//! sources), so any stdout counts as success.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{instrument, warn};

use super::common::{non_empty_lines, parse_json_lines, pretty_json, raw_line, success_result};
use crate::core::process::{CommandRunner, ExternalTool, SuccessPolicy};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::{NoParams, tool_route};

// ============================================================================
// Tool Parameters
// ============================================================================

fn default_timeout() -> u32 {
    30
}

/// Parameters for `subfinder-enumerate`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct EnumerateParams {
    /// Target domain to enumerate (e.g., example.com)
    pub domain: String,

    /// Specific sources to use (see subfinder-sources)
    pub sources: Option<Vec<String>>,

    /// Use recursion to find more subdomains
    #[serde(default)]
    pub recursive: bool,

    /// Use all sources (slower but more comprehensive)
    #[serde(default)]
    pub all: bool,

    /// Timeout in seconds for each source
    #[serde(default = "default_timeout")]
    pub timeout: u32,
}

/// Parameters for `subfinder-enumerate-json`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct EnumerateJsonParams {
    /// Target domain to enumerate
    pub domain: String,

    /// Use all sources
    #[serde(default)]
    pub all: bool,
}

/// Parameters for `subfinder-multi-domain`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MultiDomainParams {
    /// List of domains to enumerate
    pub domains: Vec<String>,

    /// Use all sources
    #[serde(default)]
    pub all: bool,
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct SubfinderTools {
    subfinder: ExternalTool,
}

impl SubfinderTools {
    pub const ENUMERATE: &'static str = "subfinder-enumerate";
    pub const ENUMERATE_JSON: &'static str = "subfinder-enumerate-json";
    pub const MULTI_DOMAIN: &'static str = "subfinder-multi-domain";
    pub const SOURCES: &'static str = "subfinder-sources";

    pub fn new(binary: PathBuf, runner: Arc<CommandRunner>) -> Self {
        Self::with_tool(ExternalTool::new(binary, SuccessPolicy::AnyOutputOrExitZero, runner))
    }

    pub fn with_tool(subfinder: ExternalTool) -> Self {
        Self { subfinder }
    }

    #[instrument(skip_all, fields(domain = %params.domain))]
    pub async fn enumerate(
        self: Arc<Self>,
        params: EnumerateParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = vec!["-d".to_string(), params.domain.clone(), "-silent".to_string()];
        if let Some(sources) = params.sources.as_ref().filter(|s| !s.is_empty()) {
            args.extend(["-sources".to_string(), sources.join(",")]);
        }
        if params.recursive {
            args.push("-recursive".to_string());
        }
        if params.all {
            args.push("-all".to_string());
        }
        args.extend(["-timeout".to_string(), params.timeout.to_string()]);

        let output = self.subfinder.run(args).await?;
        let subdomains = non_empty_lines(&output.stdout);
        let text = format!(
            "Found {} subdomains for {}:\n\n{}",
            subdomains.len(),
            params.domain,
            subdomains.join("\n")
        );
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(domain = %params.domain))]
    pub async fn enumerate_json(
        self: Arc<Self>,
        params: EnumerateJsonParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = vec![
            "-d".to_string(),
            params.domain,
            "-silent".to_string(),
            "-json".to_string(),
        ];
        if params.all {
            args.push("-all".to_string());
        }

        let output = self.subfinder.run(args).await?;
        let results = parse_json_lines(&output.stdout, raw_line("host"));
        Ok(success_result(output.annotate(pretty_json(&Value::Array(results)))))
    }

    /// Domains run one after another; a failing domain contributes no subdomains.
    #[instrument(skip_all, fields(count = params.domains.len()))]
    pub async fn multi_domain(
        self: Arc<Self>,
        params: MultiDomainParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut results = Vec::with_capacity(params.domains.len());
        for domain in params.domains {
            let mut args = vec!["-d".to_string(), domain.clone(), "-silent".to_string()];
            if params.all {
                args.push("-all".to_string());
            }
            let result = match self.subfinder.run(args).await {
                Ok(output) => DomainResult {
                    subdomains: non_empty_lines(&output.stdout)
                        .into_iter()
                        .map(String::from)
                        .collect(),
                    notice: output.notice(),
                    domain,
                },
                Err(e) => {
                    warn!(domain = %domain, "Enumeration failed: {}", e);
                    DomainResult {
                        domain,
                        subdomains: Vec::new(),
                        notice: None,
                    }
                }
            };
            results.push(result);
        }

        Ok(success_result(format_multi_domain(&results)))
    }

    pub async fn sources(self: Arc<Self>, _params: NoParams) -> Result<CallToolResult, ToolError> {
        Ok(success_result(SOURCES_TEXT.to_string()))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::ENUMERATE,
                "Enumerate subdomains for a domain using passive sources",
                this.clone(),
                Self::enumerate,
            ))
            .with_route(tool_route(
                Self::ENUMERATE_JSON,
                "Enumerate subdomains with detailed JSON output",
                this.clone(),
                Self::enumerate_json,
            ))
            .with_route(tool_route(
                Self::MULTI_DOMAIN,
                "Enumerate subdomains for multiple domains",
                this.clone(),
                Self::multi_domain,
            ))
            .with_route(tool_route(
                Self::SOURCES,
                "List all available data sources for subfinder",
                this,
                Self::sources,
            ))
    }
}

/// One domain's share of a multi-domain run.
struct DomainResult {
    domain: String,
    subdomains: Vec<String>,
    /// Timeout or truncation marker for this domain's run.
    notice: Option<String>,
}

fn format_multi_domain(results: &[DomainResult]) -> String {
    let summary = results
        .iter()
        .map(|r| {
            let line = format!("{}: {} subdomains", r.domain, r.subdomains.len());
            match &r.notice {
                Some(notice) => format!("{line}\n{notice}"),
                None => line,
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    let full: Map<String, Value> = results
        .iter()
        .map(|r| (r.domain.clone(), Value::from(r.subdomains.clone())))
        .collect();
    format!("{}\n\n{}", summary, pretty_json(&Value::Object(full)))
}

const SOURCES_TEXT: &str = "Available Subfinder Sources:

FREE (No API Key):
  - alienvault      - AlienVault OTX
  - anubis          - AnubisDB
  - crtsh           - Certificate Transparency
  - hackertarget    - HackerTarget
  - rapiddns        - RapidDNS
  - threatcrowd     - ThreatCrowd
  - waybackarchive  - Wayback Machine
  - dnsdumpster     - DNSDumpster
  - urlscan         - URLScan.io

REQUIRES API KEY:
  - binaryedge      - BinaryEdge
  - bufferover      - BufferOver
  - censys          - Censys
  - chaos           - ProjectDiscovery Chaos
  - fofa            - FOFA
  - fullhunt        - FullHunt
  - github          - GitHub Code Search
  - hunter          - Hunter.io
  - intelx          - IntelligenceX
  - passivetotal    - RiskIQ PassiveTotal
  - securitytrails  - SecurityTrails
  - shodan          - Shodan
  - virustotal      - VirusTotal
  - zoomeye         - ZoomEye

Configure API keys in ~/.config/subfinder/provider-config.yaml";

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::core::process::testing::fake_tool;
    use crate::domains::tools::definitions::common::result_text;
    use pretty_assertions::assert_eq;

    fn tools(script: &str) -> Arc<SubfinderTools> {
        Arc::new(SubfinderTools::with_tool(fake_tool(
            script,
            SuccessPolicy::AnyOutputOrExitZero,
        )))
    }

    #[tokio::test]
    async fn test_enumerate_counts_lines() {
        let tools = tools("printf 'api.example.com\\n\\nwww.example.com\\n'; exit 1");
        let params: EnumerateParams =
            serde_json::from_value(serde_json::json!({"domain": "example.com"})).unwrap();
        let result = tools.enumerate(params).await.unwrap();
        assert_eq!(
            result_text(&result),
            "Found 2 subdomains for example.com:\n\napi.example.com\nwww.example.com"
        );
    }

    #[tokio::test]
    async fn test_enumerate_json_fallback_to_host() {
        let tools =
            tools(r#"echo '{"host":"a.example.com","source":"crtsh"}'; echo b.example.com"#);
        let result = tools
            .enumerate_json(EnumerateJsonParams {
                domain: "example.com".into(),
                all: false,
            })
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(result_text(&result)).unwrap();
        assert_eq!(parsed[0]["source"], "crtsh");
        assert_eq!(parsed[1], serde_json::json!({"host": "b.example.com"}));
    }

    #[tokio::test]
    async fn test_multi_domain_swallows_failures() {
        // "$2" is the domain passed after -d.
        let tools = tools(
            r#"if [ "$2" = "bad.test" ]; then echo 'no resolvers' >&2; exit 2; fi; echo "www.$2""#,
        );
        let result = tools
            .multi_domain(MultiDomainParams {
                domains: vec!["good.test".into(), "bad.test".into()],
                all: false,
            })
            .await
            .unwrap();
        let text = result_text(&result);
        assert!(text.starts_with("good.test: 1 subdomains\nbad.test: 0 subdomains\n\n"));
        assert!(text.contains("\"www.good.test\""));
        assert!(text.contains("\"bad.test\": []"));
    }

    #[tokio::test]
    async fn test_multi_domain_marks_timed_out_domain() {
        let tools = Arc::new(SubfinderTools::with_tool(
            fake_tool("echo www.$2; sleep 30", SuccessPolicy::AnyOutputOrExitZero)
                .with_timeout(Duration::from_millis(300)),
        ));
        let result = tools
            .multi_domain(MultiDomainParams {
                domains: vec!["example.com".into()],
                all: false,
            })
            .await
            .unwrap();
        let text = result_text(&result);
        assert!(text.starts_with("example.com: 1 subdomains\n[timed out after "));
        assert!(text.contains("\"www.example.com\""));
    }

    #[tokio::test]
    async fn test_failure_without_output_is_error() {
        let tools = tools("echo 'invalid domain' >&2; exit 1");
        let params: EnumerateParams =
            serde_json::from_value(serde_json::json!({"domain": "-"})).unwrap();
        let err = tools.enumerate(params).await.unwrap_err();
        assert!(err.to_string().contains("invalid domain"));
    }
}
