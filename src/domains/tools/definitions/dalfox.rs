//! Dalfox adapter: reflected, DOM and stored XSS scanning.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{instrument, warn};

use super::common::{parse_json_lines, pretty_json, raw_line, success_result, value_at};
use crate::core::process::{CommandRunner, ExternalTool, SuccessPolicy};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::{NoParams, tool_route};

// ============================================================================
// Tool Parameters
// ============================================================================

fn default_timeout() -> u32 {
    10
}

fn default_workers() -> u32 {
    10
}

/// Parameters for `dalfox-url`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UrlParams {
    /// Target URL with parameters (e.g., https://example.com/search?q=test)
    pub url: String,

    /// Blind XSS callback URL (e.g., your-burp-collaborator.net)
    pub blind: Option<String>,

    /// Enable deep parameter analysis
    #[serde(default)]
    pub deep: bool,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u32,
}

/// Parameters for `dalfox-file`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FileParams {
    /// Path to file containing URLs (one per line)
    #[serde(rename = "filePath")]
    pub file_path: String,

    /// Number of concurrent workers
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Blind XSS callback URL
    pub blind: Option<String>,
}

/// Parameters for `dalfox-pipe`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PipeParams {
    /// List of URLs to scan
    pub urls: Vec<String>,
}

/// Parameters for `dalfox-sxss`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct StoredXssParams {
    /// Target URL with form
    pub url: String,

    /// POST data to submit (e.g., 'name=test&comment=test')
    pub data: String,

    /// URL where the stored XSS would trigger
    pub trigger: String,
}

// ============================================================================
// Report digests
// ============================================================================

/// A dalfox JSON line that reports a vulnerability rather than progress.
fn is_finding(entry: &Value) -> bool {
    entry.get("type").and_then(Value::as_str) == Some("vuln")
        || entry.get("poc").is_some_and(|poc| !poc.is_null())
}

fn findings_digest(url: &str, output: &str) -> Value {
    let findings: Vec<Value> = parse_json_lines(output, raw_line("raw"))
        .iter()
        .filter(|entry| is_finding(entry))
        .map(|v| {
            let poc = match v.get("poc") {
                Some(poc) if !poc.is_null() => poc.clone(),
                _ => value_at(v, "/evidence"),
            };
            let severity = match v.get("severity") {
                Some(severity) if !severity.is_null() => severity.clone(),
                _ => json!("Medium"),
            };
            json!({
                "type": value_at(v, "/type"),
                "parameter": value_at(v, "/param"),
                "payload": value_at(v, "/payload"),
                "poc": poc,
                "severity": severity,
            })
        })
        .collect();
    json!({
        "url": url,
        "total_findings": findings.len(),
        "findings": findings,
    })
}

/// Findings from one URL's output, each tagged with the URL. Non-JSON lines
/// are progress noise and skipped.
fn tagged_findings(url: &str, output: &str) -> Vec<Value> {
    output
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
        .filter(is_finding)
        .map(|finding| {
            let mut tagged = Map::new();
            tagged.insert("url".to_string(), Value::String(url.to_string()));
            if let Value::Object(fields) = finding {
                tagged.extend(fields);
            }
            Value::Object(tagged)
        })
        .collect()
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct DalfoxTools {
    dalfox: ExternalTool,
}

impl DalfoxTools {
    pub const URL: &'static str = "dalfox-url";
    pub const FILE: &'static str = "dalfox-file";
    pub const PIPE: &'static str = "dalfox-pipe";
    pub const SXSS: &'static str = "dalfox-sxss";
    pub const PAYLOADS: &'static str = "dalfox-payloads";

    pub fn new(binary: PathBuf, runner: Arc<CommandRunner>) -> Self {
        Self::with_tool(ExternalTool::new(binary, SuccessPolicy::AnyOutputOrExitZero, runner))
    }

    pub fn with_tool(dalfox: ExternalTool) -> Self {
        Self { dalfox }
    }

    #[instrument(skip_all, fields(url = %params.url))]
    pub async fn url(self: Arc<Self>, params: UrlParams) -> Result<CallToolResult, ToolError> {
        let mut args = vec![
            "url".to_string(),
            params.url.clone(),
            "--format".to_string(),
            "json".to_string(),
            "--timeout".to_string(),
            params.timeout.to_string(),
        ];
        if let Some(blind) = params.blind {
            args.extend(["--blind".to_string(), blind]);
        }
        if params.deep {
            args.push("--deep-domxss".to_string());
        }

        let output = self.dalfox.run(args).await?;
        let raw = output.stdout_or_stderr();
        let text = if raw.trim().is_empty() {
            "No XSS vulnerabilities found.".to_string()
        } else {
            pretty_json(&findings_digest(&params.url, raw))
        };
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(file = %params.file_path))]
    pub async fn file(self: Arc<Self>, params: FileParams) -> Result<CallToolResult, ToolError> {
        let mut args = vec![
            "file".to_string(),
            params.file_path,
            "--format".to_string(),
            "json".to_string(),
            "--worker".to_string(),
            params.workers.to_string(),
        ];
        if let Some(blind) = params.blind {
            args.extend(["--blind".to_string(), blind]);
        }

        let output = self.dalfox.run(args).await?;
        let raw = output.stdout_or_stderr();
        let text = if raw.trim().is_empty() {
            "No XSS vulnerabilities found.".to_string()
        } else {
            raw.to_string()
        };
        Ok(success_result(output.annotate(text)))
    }

    /// URLs are scanned one at a time; a URL whose scan fails is skipped.
    #[instrument(skip_all, fields(count = params.urls.len()))]
    pub async fn pipe(self: Arc<Self>, params: PipeParams) -> Result<CallToolResult, ToolError> {
        let mut findings = Vec::new();
        let mut notices = Vec::new();
        for url in &params.urls {
            let args = [
                "url".to_string(),
                url.clone(),
                "--format".to_string(),
                "json".to_string(),
                "--silence".to_string(),
            ];
            match self.dalfox.run(args).await {
                Ok(output) => {
                    findings.extend(tagged_findings(url, &output.stdout));
                    if let Some(notice) = output.notice() {
                        notices.push(format!("{url}: {notice}"));
                    }
                }
                Err(e) => warn!(url = %url, "Scan failed: {}", e),
            }
        }

        let mut text = if findings.is_empty() {
            "No XSS vulnerabilities found in any of the provided URLs.".to_string()
        } else {
            format!(
                "Found {} XSS vulnerabilities:\n\n{}",
                findings.len(),
                pretty_json(&Value::Array(findings))
            )
        };
        if !notices.is_empty() {
            text.push_str("\n\n");
            text.push_str(&notices.join("\n"));
        }
        Ok(success_result(text))
    }

    #[instrument(skip_all, fields(url = %params.url))]
    pub async fn sxss(
        self: Arc<Self>,
        params: StoredXssParams,
    ) -> Result<CallToolResult, ToolError> {
        let args = [
            "sxss".to_string(),
            params.url,
            "--data".to_string(),
            params.data,
            "--trigger".to_string(),
            params.trigger,
            "--format".to_string(),
            "json".to_string(),
        ];
        let output = self.dalfox.run(args).await?;
        let raw = output.stdout_or_stderr();
        let text = if raw.is_empty() {
            "Stored XSS scan completed. Check trigger URL for results.".to_string()
        } else {
            raw.to_string()
        };
        Ok(success_result(output.annotate(text)))
    }

    pub async fn payloads(self: Arc<Self>, _params: NoParams) -> Result<CallToolResult, ToolError> {
        Ok(success_result(PAYLOADS_TEXT.to_string()))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::URL,
                "Scan a single URL for XSS vulnerabilities",
                this.clone(),
                Self::url,
            ))
            .with_route(tool_route(
                Self::FILE,
                "Scan multiple URLs from a file for XSS vulnerabilities",
                this.clone(),
                Self::file,
            ))
            .with_route(tool_route(
                Self::PIPE,
                "Scan URLs provided as a list for XSS vulnerabilities",
                this.clone(),
                Self::pipe,
            ))
            .with_route(tool_route(
                Self::SXSS,
                "Scan for Stored XSS by testing form submissions",
                this.clone(),
                Self::sxss,
            ))
            .with_route(tool_route(
                Self::PAYLOADS,
                "List XSS payload categories and examples",
                this,
                Self::payloads,
            ))
    }
}

const PAYLOADS_TEXT: &str = "Dalfox XSS Payload Categories:

REFLECTED XSS:
  - Basic: <script>alert(1)</script>
  - Event handlers: <img src=x onerror=alert(1)>
  - SVG: <svg onload=alert(1)>
  - Body: <body onload=alert(1)>

DOM-BASED XSS:
  - document.write payloads
  - innerHTML manipulation
  - eval() exploitation
  - URL fragment (#) based

BLIND XSS:
  - External script loading
  - Image beacons
  - Fetch/XHR callbacks
  - WebSocket exfiltration

FILTER BYPASS:
  - Case variation: <ScRiPt>
  - Encoding: &#x3c;script&#x3e;
  - Null bytes: <scr%00ipt>
  - Double encoding
  - Unicode normalization

Dalfox automatically tests multiple payloads and bypass techniques.

Usage Tips:
  - Use --blind for callback-based detection
  - Use --deep-domxss for JavaScript analysis";
