//! uncover adapter: host discovery through internet search engines
//! (Shodan, Censys, FOFA and others) using the keys uncover is configured with.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::{instrument, warn};

use super::common::{non_empty_lines, parse_json_lines, pretty_json, raw_line, success_result};
use crate::core::process::{CommandRunner, ExternalTool, ProcessOutput, SuccessPolicy};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::{NoParams, tool_route};

// ============================================================================
// Tool Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Shodan,
    Censys,
    Fofa,
    Hunter,
    Quake,
    Zoomeye,
    Netlas,
    Criminalip,
    Publicwww,
    Hunterhow,
}

impl Engine {
    fn as_str(self) -> &'static str {
        match self {
            Self::Shodan => "shodan",
            Self::Censys => "censys",
            Self::Fofa => "fofa",
            Self::Hunter => "hunter",
            Self::Quake => "quake",
            Self::Zoomeye => "zoomeye",
            Self::Netlas => "netlas",
            Self::Criminalip => "criminalip",
            Self::Publicwww => "publicwww",
            Self::Hunterhow => "hunterhow",
        }
    }
}

fn engine_args(engines: Option<&[Engine]>) -> Vec<String> {
    match engines {
        Some(list) if !list.is_empty() => {
            let names: Vec<_> = list.iter().map(|e| e.as_str()).collect();
            vec!["-e".to_string(), names.join(",")]
        }
        _ => Vec::new(),
    }
}

fn default_limit() -> u32 {
    100
}

fn default_json_limit() -> u32 {
    50
}

fn default_org_limit() -> u32 {
    200
}

fn default_timeout() -> u32 {
    30
}

/// Parameters for `uncover-search`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Search query (supports engine-specific syntax)
    pub query: String,

    /// Specific search engines to use (default: all configured)
    pub engines: Option<Vec<Engine>>,

    /// Maximum number of results per engine
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u32,
}

/// Parameters for `uncover-search-json`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchJsonParams {
    /// Search query
    pub query: String,

    /// Specific search engines to use
    pub engines: Option<Vec<Engine>>,

    /// Maximum results per engine
    #[serde(default = "default_json_limit")]
    pub limit: u32,
}

/// Parameters for `uncover-shodan` and `uncover-censys`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct EngineSearchParams {
    /// Search query in the engine's own syntax (e.g., 'apache country:US')
    pub query: String,

    /// Maximum number of results
    #[serde(default = "default_limit")]
    pub limit: u32,
}

/// Parameters for `uncover-org`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct OrgParams {
    /// Organization name to search for
    pub organization: String,

    /// Maximum results per engine
    #[serde(default = "default_org_limit")]
    pub limit: u32,
}

/// Per-engine organization queries.
fn org_queries(organization: &str) -> [(Engine, String); 2] {
    [
        (Engine::Shodan, format!("org:\"{organization}\"")),
        (Engine::Censys, format!("autonomous_system.name:{organization}")),
    ]
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct UncoverTools {
    uncover: ExternalTool,
}

impl UncoverTools {
    pub const SEARCH: &'static str = "uncover-search";
    pub const SEARCH_JSON: &'static str = "uncover-search-json";
    pub const SHODAN: &'static str = "uncover-shodan";
    pub const CENSYS: &'static str = "uncover-censys";
    pub const ORG: &'static str = "uncover-org";
    pub const ENGINES: &'static str = "uncover-engines";

    pub fn new(binary: PathBuf, runner: Arc<CommandRunner>) -> Self {
        Self::with_tool(ExternalTool::new(binary, SuccessPolicy::AnyOutputOrExitZero, runner))
    }

    pub fn with_tool(uncover: ExternalTool) -> Self {
        Self { uncover }
    }

    /// Hosts found by one engine, with the run that produced them.
    async fn engine_hosts(
        &self,
        engine: Engine,
        query: &str,
        limit: u32,
    ) -> Result<(Vec<String>, ProcessOutput), ToolError> {
        let args = [
            "-q".to_string(),
            query.to_string(),
            "-e".to_string(),
            engine.as_str().to_string(),
            "-silent".to_string(),
            "-limit".to_string(),
            limit.to_string(),
        ];
        let output = self.uncover.run(args).await?;
        let hosts = non_empty_lines(&output.stdout)
            .into_iter()
            .map(String::from)
            .collect();
        Ok((hosts, output))
    }

    #[instrument(skip_all, fields(query = %params.query))]
    pub async fn search(
        self: Arc<Self>,
        params: SearchParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = vec![
            "-q".to_string(),
            params.query.clone(),
            "-silent".to_string(),
            "-limit".to_string(),
            params.limit.to_string(),
            "-timeout".to_string(),
            params.timeout.to_string(),
        ];
        args.extend(engine_args(params.engines.as_deref()));

        let output = self.uncover.run(args).await?;
        let hosts = non_empty_lines(&output.stdout);
        let text = format!(
            "Uncover Search Results ({} hosts):\nQuery: {}\n\n{}",
            hosts.len(),
            params.query,
            hosts.join("\n")
        );
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(query = %params.query))]
    pub async fn search_json(
        self: Arc<Self>,
        params: SearchJsonParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = vec![
            "-q".to_string(),
            params.query,
            "-silent".to_string(),
            "-json".to_string(),
            "-limit".to_string(),
            params.limit.to_string(),
        ];
        args.extend(engine_args(params.engines.as_deref()));

        let output = self.uncover.run(args).await?;
        let results = parse_json_lines(&output.stdout, raw_line("raw"));
        Ok(success_result(output.annotate(pretty_json(&Value::Array(results)))))
    }

    #[instrument(skip_all, fields(query = %params.query))]
    pub async fn shodan(
        self: Arc<Self>,
        params: EngineSearchParams,
    ) -> Result<CallToolResult, ToolError> {
        let (hosts, output) = self
            .engine_hosts(Engine::Shodan, &params.query, params.limit)
            .await?;
        Ok(success_result(output.annotate(format!(
            "Shodan Results ({} hosts):\n\n{}",
            hosts.len(),
            hosts.join("\n")
        ))))
    }

    #[instrument(skip_all, fields(query = %params.query))]
    pub async fn censys(
        self: Arc<Self>,
        params: EngineSearchParams,
    ) -> Result<CallToolResult, ToolError> {
        let (hosts, output) = self
            .engine_hosts(Engine::Censys, &params.query, params.limit)
            .await?;
        Ok(success_result(output.annotate(format!(
            "Censys Results ({} hosts):\n\n{}",
            hosts.len(),
            hosts.join("\n")
        ))))
    }

    /// Engines are queried in turn; a failing engine is reported inline.
    #[instrument(skip_all, fields(organization = %params.organization))]
    pub async fn org(self: Arc<Self>, params: OrgParams) -> Result<CallToolResult, ToolError> {
        let mut sections = Vec::new();
        for (engine, query) in org_queries(&params.organization) {
            let body = match self.engine_hosts(engine, &query, params.limit).await {
                Ok((hosts, output)) => output.annotate(hosts.join("\n")),
                Err(e) => {
                    warn!(engine = engine.as_str(), "Organization search failed: {}", e);
                    "No results or error".to_string()
                }
            };
            sections.push(format!(
                "\n--- {} ---\n{}",
                engine.as_str().to_uppercase(),
                body
            ));
        }
        Ok(success_result(format!(
            "Organization Search: {}\n{}",
            params.organization,
            sections.join("\n")
        )))
    }

    pub async fn engines(self: Arc<Self>, _params: NoParams) -> Result<CallToolResult, ToolError> {
        Ok(success_result(ENGINES_TEXT.to_string()))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::SEARCH,
                "Search across multiple security search engines (Shodan, Censys, Fofa, Hunter, etc.)",
                this.clone(),
                Self::search,
            ))
            .with_route(tool_route(
                Self::SEARCH_JSON,
                "Search with detailed JSON output including metadata",
                this.clone(),
                Self::search_json,
            ))
            .with_route(tool_route(
                Self::SHODAN,
                "Search specifically using Shodan with common dorks",
                this.clone(),
                Self::shodan,
            ))
            .with_route(tool_route(
                Self::CENSYS,
                "Search specifically using Censys",
                this.clone(),
                Self::censys,
            ))
            .with_route(tool_route(
                Self::ORG,
                "Find assets belonging to an organization across all engines",
                this.clone(),
                Self::org,
            ))
            .with_route(tool_route(
                Self::ENGINES,
                "List available search engines and their configuration status",
                this,
                Self::engines,
            ))
    }
}

const ENGINES_TEXT: &str = r#"Available Uncover Search Engines:

GENERAL SEARCH ENGINES:
  - shodan        - Shodan (shodan.io) - Internet device search
  - censys        - Censys (censys.io) - Internet-wide scanning
  - fofa          - FOFA (fofa.info) - Chinese cyberspace search
  - zoomeye       - ZoomEye (zoomeye.org) - Cyberspace search
  - quake         - Quake (quake.360.cn) - 360 security search
  - hunter        - Hunter (hunter.io) - Email/domain intelligence
  - netlas        - Netlas (netlas.io) - Internet intelligence
  - criminalip    - Criminal IP - Threat intelligence
  - publicwww     - PublicWWW - Source code search
  - hunterhow     - Hunter.how - Asset search

Configure API keys in ~/.config/uncover/provider-config.yaml

Example config:
  shodan:
    - SHODAN_API_KEY
  censys:
    - CENSYS_API_ID
    - CENSYS_API_SECRET
  fofa:
    - FOFA_EMAIL
    - FOFA_KEY

Common Shodan Dorks:
  - port:22 country:US        - SSH servers in US
  - "Server: Apache"          - Apache web servers
  - ssl.cert.subject.CN:*.gov - Government SSL certs
  - http.title:"Dashboard"    - Web dashboards"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::core::process::testing::{echo_args_tool, fake_tool};
    use crate::domains::tools::definitions::common::result_text;

    #[tokio::test]
    async fn test_search_arguments_and_count() {
        let tools = Arc::new(UncoverTools::with_tool(echo_args_tool(
            SuccessPolicy::AnyOutputOrExitZero,
        )));
        let result = tools
            .search(SearchParams {
                query: "ssl:example.com".into(),
                engines: Some(vec![Engine::Shodan, Engine::Fofa]),
                limit: 10,
                timeout: 30,
            })
            .await
            .unwrap();
        assert_eq!(
            result_text(&result),
            "Uncover Search Results (9 hosts):\nQuery: ssl:example.com\n\n\
             -q\nssl:example.com\n-silent\n-limit\n10\n-timeout\n30\n-e\nshodan,fofa"
        );
    }

    #[tokio::test]
    async fn test_org_reports_engine_failures_inline() {
        // "$4" is the engine name after -e.
        let tools = Arc::new(UncoverTools::with_tool(fake_tool(
            r#"if [ "$4" = "censys" ]; then echo 'missing censys keys' >&2; exit 1; fi; echo 203.0.113.7:443"#,
            SuccessPolicy::AnyOutputOrExitZero,
        )));
        let result = tools
            .org(OrgParams {
                organization: "Example Corp".into(),
                limit: 200,
            })
            .await
            .unwrap();
        assert_eq!(
            result_text(&result),
            "Organization Search: Example Corp\n\n--- SHODAN ---\n203.0.113.7:443\n\n--- CENSYS ---\nNo results or error"
        );
    }

    #[tokio::test]
    async fn test_engine_search_keeps_partial_hosts_on_timeout() {
        let tools = Arc::new(UncoverTools::with_tool(
            fake_tool("echo 1.2.3.4:80; sleep 30", SuccessPolicy::AnyOutputOrExitZero)
                .with_timeout(Duration::from_millis(300)),
        ));
        let result = tools
            .shodan(EngineSearchParams {
                query: "port:80".into(),
                limit: 100,
            })
            .await
            .unwrap();
        let text = result_text(&result);
        assert!(text.starts_with("Shodan Results (1 hosts):\n\n1.2.3.4:80\n\n"));
        assert!(text.contains("timed out"));
    }

    #[test]
    fn test_org_query_syntax() {
        let [(shodan, sq), (censys, cq)] = org_queries("Acme");
        assert_eq!((shodan, sq.as_str()), (Engine::Shodan, "org:\"Acme\""));
        assert_eq!((censys, cq.as_str()), (Engine::Censys, "autonomous_system.name:Acme"));
    }
}
