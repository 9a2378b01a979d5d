//! dnsx adapter: bulk DNS resolution, brute forcing and reverse lookups.
//!
//! Host lists are fed to dnsx on stdin (`-l -`) rather than on the command line.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use super::common::{non_empty_lines, parse_json_lines, pretty_json, raw_line, success_result};
use crate::core::process::{CommandRunner, ExternalTool, SuccessPolicy};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::tool_route;

// ============================================================================
// Tool Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Mx,
    Ns,
    Txt,
    Soa,
    Ptr,
    Axfr,
}

impl RecordType {
    fn flag(self) -> &'static str {
        match self {
            Self::A => "-a",
            Self::Aaaa => "-aaaa",
            Self::Cname => "-cname",
            Self::Mx => "-mx",
            Self::Ns => "-ns",
            Self::Txt => "-txt",
            Self::Soa => "-soa",
            Self::Ptr => "-ptr",
            Self::Axfr => "-axfr",
        }
    }
}

/// Record-type flags, `-a` when none were requested.
fn record_flags(types: Option<&[RecordType]>) -> Vec<String> {
    match types {
        Some(types) if !types.is_empty() => types.iter().map(|t| t.flag().to_string()).collect(),
        _ => vec!["-a".to_string()],
    }
}

fn default_threads() -> u32 {
    100
}

fn default_retries() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

/// Parameters for `dnsx-resolve`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ResolveParams {
    /// List of hosts/domains to resolve
    pub hosts: Vec<String>,

    /// DNS record types to query (default: A)
    #[serde(rename = "recordTypes")]
    pub record_types: Option<Vec<RecordType>>,

    /// Custom DNS resolver (e.g., 8.8.8.8)
    pub resolver: Option<String>,

    /// Path to wordlist for subdomain bruteforce
    pub wordlist: Option<String>,

    /// Number of concurrent threads
    #[serde(default = "default_threads")]
    pub threads: u32,

    /// Number of retries for failed queries
    #[serde(default = "default_retries")]
    pub retries: u32,
}

/// Parameters for `dnsx-bruteforce`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct BruteforceParams {
    /// Target domain for subdomain bruteforce
    pub domain: String,

    /// Path to subdomain wordlist
    pub wordlist: String,

    /// Custom DNS resolver
    pub resolver: Option<String>,

    /// Number of concurrent threads
    #[serde(default = "default_threads")]
    pub threads: u32,

    /// Enable wildcard filtering
    #[serde(default = "default_true")]
    pub wildcard: bool,
}

/// Parameters for `dnsx-reverse`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReverseParams {
    /// List of IP addresses for reverse DNS lookup
    pub ips: Vec<String>,

    /// Number of concurrent threads
    #[serde(default = "default_threads")]
    pub threads: u32,
}

/// Parameters for `dnsx-json`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct JsonParams {
    /// List of hosts to resolve
    pub hosts: Vec<String>,

    /// DNS record types to query
    #[serde(rename = "recordTypes")]
    pub record_types: Option<Vec<RecordType>>,
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct DnsxTools {
    dnsx: ExternalTool,
}

impl DnsxTools {
    pub const RESOLVE: &'static str = "dnsx-resolve";
    pub const BRUTEFORCE: &'static str = "dnsx-bruteforce";
    pub const REVERSE: &'static str = "dnsx-reverse";
    pub const JSON: &'static str = "dnsx-json";

    pub fn new(binary: PathBuf, runner: Arc<CommandRunner>) -> Self {
        Self::with_tool(ExternalTool::new(binary, SuccessPolicy::AnyOutputOrExitZero, runner))
    }

    pub fn with_tool(dnsx: ExternalTool) -> Self {
        Self { dnsx }
    }

    #[instrument(skip_all, fields(hosts = params.hosts.len()))]
    pub async fn resolve(
        self: Arc<Self>,
        params: ResolveParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = vec!["-silent".to_string(), "-l".to_string(), "-".to_string()];
        args.extend(record_flags(params.record_types.as_deref()));
        if let Some(resolver) = &params.resolver {
            args.extend(["-r".to_string(), resolver.clone()]);
        }
        if let Some(wordlist) = &params.wordlist {
            args.extend(["-w".to_string(), wordlist.clone()]);
        }
        args.extend(["-t".to_string(), params.threads.to_string()]);
        args.extend(["-retry".to_string(), params.retries.to_string()]);

        let spec = self.dnsx.command(args).stdin(params.hosts.join("\n"));
        let output = self.dnsx.run_spec(spec).await?;
        let records = non_empty_lines(&output.stdout);
        let text = format!(
            "DNS Resolution Results ({} records):\n\n{}",
            records.len(),
            records.join("\n")
        );
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(domain = %params.domain))]
    pub async fn bruteforce(
        self: Arc<Self>,
        params: BruteforceParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = vec![
            "-d".to_string(),
            params.domain.clone(),
            "-w".to_string(),
            params.wordlist.clone(),
            "-silent".to_string(),
            "-a".to_string(),
        ];
        if let Some(resolver) = &params.resolver {
            args.extend(["-r".to_string(), resolver.clone()]);
        }
        args.extend(["-t".to_string(), params.threads.to_string()]);
        if params.wildcard {
            args.push("-wd".to_string());
        }

        let output = self.dnsx.run(args).await?;
        let subdomains = non_empty_lines(&output.stdout);
        let text = format!(
            "Found {} subdomains for {}:\n\n{}",
            subdomains.len(),
            params.domain,
            subdomains.join("\n")
        );
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(ips = params.ips.len()))]
    pub async fn reverse(
        self: Arc<Self>,
        params: ReverseParams,
    ) -> Result<CallToolResult, ToolError> {
        let args = [
            "-silent".to_string(),
            "-ptr".to_string(),
            "-resp".to_string(),
            "-t".to_string(),
            params.threads.to_string(),
        ];
        let spec = self.dnsx.command(args).stdin(params.ips.join("\n"));
        let output = self.dnsx.run_spec(spec).await?;
        let records = non_empty_lines(&output.stdout);
        let text = format!(
            "Reverse DNS Results ({} records):\n\n{}",
            records.len(),
            records.join("\n")
        );
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(hosts = params.hosts.len()))]
    pub async fn json(self: Arc<Self>, params: JsonParams) -> Result<CallToolResult, ToolError> {
        let mut args = vec!["-silent".to_string(), "-json".to_string(), "-resp".to_string()];
        args.extend(record_flags(params.record_types.as_deref()));

        let spec = self.dnsx.command(args).stdin(params.hosts.join("\n"));
        let output = self.dnsx.run_spec(spec).await?;
        let results = parse_json_lines(&output.stdout, raw_line("raw"));
        Ok(success_result(output.annotate(pretty_json(&Value::Array(results)))))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::RESOLVE,
                "Resolve DNS records for domains/subdomains with multiple DNS queries",
                this.clone(),
                Self::resolve,
            ))
            .with_route(tool_route(
                Self::BRUTEFORCE,
                "DNS bruteforce subdomains using wordlist",
                this.clone(),
                Self::bruteforce,
            ))
            .with_route(tool_route(
                Self::REVERSE,
                "Perform reverse DNS lookups on IP addresses",
                this.clone(),
                Self::reverse,
            ))
            .with_route(tool_route(
                Self::JSON,
                "Resolve DNS with detailed JSON output",
                this,
                Self::json,
            ))
    }
}
