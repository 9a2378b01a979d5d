//! Next.js React Server Components RCE detector
//! (CVE-2025-66478 / CVE-2025-55182).
//!
//! - `version`: release-line classification
//! - `payload`: multipart server-action payloads
//! - `scanner`: HTTP probing, redirect handling and batch runs

pub mod payload;
pub mod scanner;
pub mod version;

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::{CallToolResult, Content};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use payload::{Payload, PayloadKind};
use scanner::{DEFAULT_TIMEOUT_MS, MAX_REDIRECTS, ScanOptions, ScanResult, Scanner};
use version::NextVersion;

use super::common::{pretty_json, success_result, truncate_chars};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::{NoParams, tool_route};

const PAYLOAD_PREVIEW_CHARS: usize = 2000;

// ============================================================================
// Tool Parameters
// ============================================================================

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    10
}

/// Parameters for `nextjs-scan`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ScanParams {
    /// Target URL to scan (e.g., https://example.com)
    pub url: String,

    /// Use safe check mode - detects vulnerability via error patterns without executing code
    #[serde(default)]
    pub safe_check: bool,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Follow same-origin redirects
    #[serde(default = "default_true")]
    pub follow_redirects: bool,
}

/// Parameters for `nextjs-batch-scan`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct BatchScanParams {
    /// List of URLs to scan
    pub urls: Vec<String>,

    /// Number of concurrent scans
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Use safe check mode for all scans
    #[serde(default)]
    pub safe_check: bool,

    /// Request timeout in milliseconds per URL
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Parameters for `nextjs-version-check`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct VersionCheckParams {
    /// Next.js version to check (e.g., 15.0.1, 16.0.6, 14.3.0-canary.77)
    pub version: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PayloadType {
    /// Proof-of-concept that reflects 41*271 in the action redirect
    #[default]
    Detection,
    /// Invalid action that triggers the error page
    Safe,
}

/// Parameters for `nextjs-generate-payload`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GeneratePayloadParams {
    /// Type of payload: 'detection' for RCE PoC, 'safe' for error-based detection
    #[serde(default)]
    pub payload_type: PayloadType,
}

// ============================================================================
// Report formatting
// ============================================================================

fn status_line(vulnerable: bool) -> &'static str {
    if vulnerable {
        "🚨 VULNERABLE"
    } else {
        "✅ Not Vulnerable"
    }
}

pub fn format_scan(result: &ScanResult) -> String {
    let mut out = String::from("🔍 Next.js CVE-2025-66478 Scan Result\n");
    out.push_str(&"━".repeat(38));
    let _ = writeln!(out, "\nTarget:     {}", result.url);
    let _ = writeln!(out, "Status:     {}", status_line(result.vulnerable));
    let _ = writeln!(out, "Confidence: {}", result.confidence.label());
    let _ = writeln!(out, "Method:     {}", result.method);
    let _ = writeln!(out, "Details:    {}", result.details);

    if let Some(version) = &result.version {
        let _ = write!(out, "\nVersion:    {version}");
        if let Some(check) = &result.version_check {
            let verdict = if check.vulnerable {
                "⚠️ Version is vulnerable"
            } else {
                "✅ Version not affected"
            };
            let _ = write!(out, "\nVuln Check: {verdict}\n            {}", check.reason);
        }
    }
    if let Some(status) = result.status_code {
        let _ = write!(out, "\n\nHTTP Status: {status}");
    }
    if !result.redirect_chain.is_empty() {
        let _ = write!(
            out,
            "\nRedirects:   {} → {}",
            result.redirect_chain.join(" → "),
            result.final_url.as_deref().unwrap_or(&result.url)
        );
    }
    if let Some(error) = &result.error {
        let _ = write!(out, "\n\n⚠️ Error: {error}");
    }
    let _ = write!(out, "\n\nTimestamp: {}", result.timestamp);
    out
}

fn box_row(label: &str, value: impl ToString) -> String {
    format!("║  {label:<18}{:<46}║\n", value.to_string())
}

pub fn format_batch_report(results: &[ScanResult]) -> String {
    let vulnerable: Vec<_> = results.iter().filter(|r| r.vulnerable).collect();
    let errors: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();

    let mut out = String::new();
    out.push_str("╔══════════════════════════════════════════════════════════════════╗\n");
    out.push_str("║     Next.js CVE-2025-66478 / CVE-2025-55182 Scan Report          ║\n");
    out.push_str("╠══════════════════════════════════════════════════════════════════╣\n");
    out.push_str(&box_row("Total Scanned:", results.len()));
    out.push_str(&box_row("Vulnerable:", vulnerable.len()));
    out.push_str(&box_row("Errors:", errors.len()));
    out.push_str(&box_row(
        "Scan Time:",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    ));
    out.push_str("╚══════════════════════════════════════════════════════════════════╝\n");

    if !vulnerable.is_empty() {
        out.push_str("\n🚨 VULNERABLE TARGETS:\n");
        out.push_str(&"─".repeat(70));
        out.push('\n');
        for result in &vulnerable {
            let _ = writeln!(out, "\n  URL:        {}", result.url);
            let _ = writeln!(out, "  Confidence: {}", result.confidence.label());
            let _ = writeln!(out, "  Method:     {}", result.method);
            let _ = writeln!(out, "  Details:    {}", result.details);
            if let Some(version) = &result.version {
                let _ = writeln!(out, "  Version:    {version}");
            }
        }
    }
    if !errors.is_empty() {
        out.push_str("\n⚠️  SCAN ERRORS:\n");
        out.push_str(&"─".repeat(70));
        out.push('\n');
        for result in &errors {
            let _ = writeln!(
                out,
                "  {}: {}",
                result.url,
                result.error.as_deref().unwrap_or_default()
            );
        }
    }
    out
}

fn batch_json(results: &[ScanResult]) -> serde_json::Value {
    json!({
        "summary": {
            "total": results.len(),
            "vulnerable": results.iter().filter(|r| r.vulnerable).count(),
            "errors": results.iter().filter(|r| r.error.is_some()).count(),
        },
        "results": results.iter().map(|r| json!({
            "url": r.url,
            "vulnerable": r.vulnerable,
            "confidence": r.confidence,
            "details": r.details,
            "version": r.version,
            "error": r.error,
        })).collect::<Vec<_>>(),
    })
}

fn format_version_check(version: &str) -> String {
    let verdict = version::check(version);
    let mut out = format!("🔍 Next.js Version Check: {version}\n");
    out.push_str(&"━".repeat(38));
    let _ = writeln!(out, "\nStatus:  {}", status_line(verdict.vulnerable));
    let _ = writeln!(out, "Reason:  {}", verdict.reason);

    if let Some(parsed) = NextVersion::parse(version) {
        let _ = write!(
            out,
            "\nParsed Version:\n  Major:      {}\n  Minor:      {}\n  Patch:      {}",
            parsed.major, parsed.minor, parsed.patch
        );
        if let Some(tag) = &parsed.prerelease {
            let _ = write!(out, "\n  Prerelease: {tag}");
            if let Some(n) = parsed.prerelease_num {
                let _ = write!(out, ".{n}");
            }
        }
    }
    out
}

const VULN_INFO_INTRO: &str = "\
🛡️ Next.js React Server Components RCE Vulnerabilities
━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

📋 CVE IDs:
  • CVE-2025-66478
  • CVE-2025-55182

📝 Description:
These vulnerabilities affect Next.js applications using React Server Components (RSC).
Attackers can achieve Remote Code Execution (RCE) through crafted multipart POST
requests that exploit prototype pollution in server action handling.

🎯 Attack Vector:
1. Attacker sends a specially crafted multipart/form-data POST request
2. The payload contains prototype pollution via __proto__ manipulation
3. Server-side JavaScript execution is triggered during request parsing
4. Arbitrary code execution is achieved on the target server
";

const VULN_INFO_OUTRO: &str = "\
🔧 Remediation:
1. Upgrade to a patched Next.js version immediately
2. If upgrade is not possible, implement WAF rules to block multipart requests
   with suspicious patterns ($$ACTION, __proto__, constructor.prototype)
3. Review application for any custom server action handlers

📚 References:
  • https://nextjs.org/blog/CVE-2025-66478
  • https://github.com/assetnote/react2shell-scanner
";

fn format_payload(kind: PayloadType, payload: &Payload) -> String {
    let kind_name = match kind {
        PayloadType::Detection => "detection",
        PayloadType::Safe => "safe",
    };
    let mut out = String::from("🔧 Next.js CVE Payload Generator\n");
    out.push_str(&"━".repeat(32));
    out.push_str("\n⚠️ FOR AUTHORIZED TESTING ONLY\n\n");
    let _ = writeln!(out, "Payload Type: {kind_name}\n");

    out.push_str("📤 HTTP Headers:\n");
    for (name, value) in payload.headers() {
        let _ = writeln!(out, "  {name}: {value}");
    }

    out.push_str("\n📦 Request Body:\n");
    out.push_str(&"─".repeat(33));
    out.push('\n');
    out.push_str(&truncate_chars(&payload.body, PAYLOAD_PREVIEW_CHARS));
    if payload.body.chars().count() > PAYLOAD_PREVIEW_CHARS {
        out.push_str("\n... (truncated)");
    }
    out.push('\n');
    out.push_str(&"─".repeat(33));

    let _ = write!(
        out,
        "\n\n🎯 Expected Result:\nIf vulnerable, look for \"{}\" in:\n  \
         • X-Action-Redirect header (e.g., /login?a=11111)\n  \
         • Response body\n\n",
        payload.expected()
    );
    let _ = write!(
        out,
        "📋 cURL Command:\n\
         curl -X POST \"TARGET_URL\" \\\n  \
         -H \"Content-Type: {}\" \\\n  \
         -H \"Accept: text/x-component\" \\\n  \
         -H \"Next-Action: $$ACTION_1\" \\\n  \
         -H \"RSC: 1\" \\\n  \
         --data-binary @payload.txt\n",
        payload.content_type()
    );
    out
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct NextjsTools {
    scanner: Scanner,
}

impl NextjsTools {
    pub const SCAN: &'static str = "nextjs-scan";
    pub const BATCH_SCAN: &'static str = "nextjs-batch-scan";
    pub const VERSION_CHECK: &'static str = "nextjs-version-check";
    pub const VULN_INFO: &'static str = "nextjs-vuln-info";
    pub const GENERATE_PAYLOAD: &'static str = "nextjs-generate-payload";

    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            scanner: Scanner::new()?,
        })
    }

    #[instrument(skip_all, fields(url = %params.url, safe = params.safe_check))]
    pub async fn scan(self: Arc<Self>, params: ScanParams) -> Result<CallToolResult, ToolError> {
        let options = ScanOptions {
            timeout: Duration::from_millis(params.timeout),
            follow_redirects: params.follow_redirects,
            max_redirects: MAX_REDIRECTS,
            safe_check: params.safe_check,
        };
        let result = self.scanner.scan(&params.url, options).await;
        Ok(success_result(format_scan(&result)))
    }

    #[instrument(skip_all, fields(urls = params.urls.len(), concurrency = params.concurrency))]
    pub async fn batch_scan(
        self: Arc<Self>,
        params: BatchScanParams,
    ) -> Result<CallToolResult, ToolError> {
        if params.urls.is_empty() {
            return Err(ToolError::invalid_arguments("urls must not be empty"));
        }
        let options = ScanOptions {
            timeout: Duration::from_millis(params.timeout),
            safe_check: params.safe_check,
            ..ScanOptions::default()
        };
        let results = self
            .scanner
            .batch(&params.urls, params.concurrency, options)
            .await;
        Ok(CallToolResult::success(vec![
            Content::text(format_batch_report(&results)),
            Content::text(format!(
                "\n📊 JSON Results:\n{}",
                pretty_json(&batch_json(&results))
            )),
        ]))
    }

    #[instrument(skip_all, fields(version = %params.version))]
    pub async fn version_check(
        self: Arc<Self>,
        params: VersionCheckParams,
    ) -> Result<CallToolResult, ToolError> {
        Ok(success_result(format_version_check(params.version.trim())))
    }

    pub async fn vuln_info(self: Arc<Self>, _: NoParams) -> Result<CallToolResult, ToolError> {
        Ok(success_result(format!(
            "{VULN_INFO_INTRO}\n{}\n\n{VULN_INFO_OUTRO}",
            version::summary()
        )))
    }

    pub async fn generate_payload(
        self: Arc<Self>,
        params: GeneratePayloadParams,
    ) -> Result<CallToolResult, ToolError> {
        let payload = Payload::new(match params.payload_type {
            PayloadType::Detection => PayloadKind::Detection,
            PayloadType::Safe => PayloadKind::SafeCheck,
        });
        Ok(success_result(format_payload(params.payload_type, &payload)))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::SCAN,
                "Scan a single URL for the Next.js React Server Components RCE \
                 (CVE-2025-66478 / CVE-2025-55182). Sends a proof-of-concept payload that \
                 computes 41*271=11111; a vulnerable server reflects it in X-Action-Redirect.",
                this.clone(),
                Self::scan,
            ))
            .with_route(tool_route(
                Self::BATCH_SCAN,
                "Batch scan multiple URLs for the Next.js RSC RCE with configurable concurrency. \
                 Returns a report of vulnerable and failed targets plus JSON results.",
                this.clone(),
                Self::batch_scan,
            ))
            .with_route(tool_route(
                Self::VERSION_CHECK,
                "Check whether a Next.js version (e.g. 15.0.1, 16.0.6, 14.3.0-canary.77) is \
                 vulnerable to CVE-2025-66478 / CVE-2025-55182",
                this.clone(),
                Self::version_check,
            ))
            .with_route(tool_route(
                Self::VULN_INFO,
                "Get detailed information about CVE-2025-66478 and CVE-2025-55182",
                this.clone(),
                Self::vuln_info,
            ))
            .with_route(tool_route(
                Self::GENERATE_PAYLOAD,
                "Generate detection payloads for manual testing (authorized penetration testing only)",
                this,
                Self::generate_payload,
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::scanner::Confidence;
    use super::*;
    use crate::domains::tools::definitions::common::result_text;
    use rmcp::model::RawContent;

    fn tools() -> Arc<NextjsTools> {
        Arc::new(NextjsTools::new().unwrap())
    }

    fn sample(url: &str, vulnerable: bool, error: Option<&str>) -> ScanResult {
        ScanResult {
            url: url.into(),
            vulnerable,
            confidence: if vulnerable { Confidence::High } else { Confidence::Unknown },
            method: "rce-poc",
            details: "details".into(),
            version: vulnerable.then(|| "15.0.1".to_string()),
            version_check: None,
            status_code: None,
            headers: Default::default(),
            redirect_chain: vec![],
            final_url: None,
            error: error.map(str::to_string),
            timestamp: "2025-12-05T10:00:00.000Z".into(),
        }
    }

    #[test]
    fn test_batch_report_sections() {
        let results = vec![
            sample("https://a.example", true, None),
            sample("https://b.example", false, Some("connection refused")),
            sample("https://c.example", false, None),
        ];
        let report = format_batch_report(&results);
        assert!(report.contains(&format!("║  Total Scanned:    {:<46}║", 3)));
        assert!(report.contains("🚨 VULNERABLE TARGETS:"));
        assert!(report.contains("  URL:        https://a.example\n  Confidence: HIGH\n"));
        assert!(report.contains("  https://b.example: connection refused\n"));

        let json = batch_json(&results);
        assert_eq!(json["summary"]["vulnerable"], 1);
        assert_eq!(json["summary"]["errors"], 1);
        assert_eq!(json["results"][0]["confidence"], "high");
    }

    #[tokio::test]
    async fn test_version_check_output() {
        let result = tools()
            .version_check(VersionCheckParams {
                version: "14.3.0-canary.77".into(),
            })
            .await
            .unwrap();
        let text = result_text(&result);
        assert!(text.contains("Status:  🚨 VULNERABLE"));
        assert!(text.contains("  Prerelease: canary.77"));
    }

    #[tokio::test]
    async fn test_generated_safe_payload() {
        let result = tools()
            .generate_payload(GeneratePayloadParams {
                payload_type: PayloadType::Safe,
            })
            .await
            .unwrap();
        let text = result_text(&result);
        assert!(text.contains("Payload Type: safe"));
        assert!(text.contains("  Next-Action: $$ACTION_1\n"));
        assert!(text.contains("$$ACTION_INVALID_TEST"));
        assert!(!text.contains("(truncated)"));
    }

    #[tokio::test]
    async fn test_vuln_info_lists_patched_releases() {
        let result = tools().vuln_info(NoParams {}).await.unwrap();
        let text = result_text(&result);
        assert!(
            text.contains("- Next.js 15.x (except: 15.0.5, 15.1.9, 15.2.6, 15.3.6, 15.4.8, 15.5.7)")
        );
        assert!(text.contains("📚 References:"));
    }

    #[tokio::test]
    async fn test_batch_scan_returns_two_blocks() {
        let result = tools()
            .batch_scan(BatchScanParams {
                urls: vec!["http://127.0.0.1:1".into()],
                concurrency: 10,
                safe_check: false,
                timeout: 2_000,
            })
            .await
            .unwrap();
        assert_eq!(result.content.len(), 2);
        let json_block = match &result.content[1].raw {
            RawContent::Text(text) => &text.text,
            _ => panic!("Expected text content"),
        };
        assert!(json_block.starts_with("\n📊 JSON Results:\n"));
        assert!(json_block.contains("\"errors\": 1"));
    }
}
