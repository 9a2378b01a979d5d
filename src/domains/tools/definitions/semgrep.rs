//! Semgrep adapter: static analysis with registry rule packs.
//!
//! Semgrep exits non-zero when it reports findings, so a run only fails when
//! it produced no stdout, exited non-zero and complained on stderr.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use super::common::{array_at, pretty_json, success_result, value_at};
use crate::core::process::{CommandRunner, ExternalTool, ProcessOutput, SuccessPolicy};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::{NoParams, tool_route};

// ============================================================================
// Tool Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
pub enum Severity {
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "ERROR")]
    Error,
    #[default]
    #[serde(rename = "all")]
    All,
}

impl Severity {
    fn as_flag_value(self) -> Option<&'static str> {
        match self {
            Self::Info => Some("INFO"),
            Self::Warning => Some("WARNING"),
            Self::Error => Some("ERROR"),
            Self::All => None,
        }
    }
}

fn default_config() -> String {
    "auto".to_string()
}

fn default_true() -> bool {
    true
}

/// Parameters for `semgrep-scan`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ScanParams {
    /// Path to file or directory to scan
    pub target: String,

    /// Semgrep configuration: auto, a registry pack such as p/security-audit,
    /// p/owasp-top-ten or p/secrets, or a path to custom rules
    #[serde(default = "default_config")]
    pub config: String,

    /// Minimum severity to report
    #[serde(default)]
    pub severity: Severity,

    /// Output results in JSON format
    #[serde(default = "default_true")]
    pub json: bool,
}

/// Parameters for `semgrep-ci`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CiParams {
    /// Path to repository to scan
    pub target: String,

    /// Git ref to compare against (e.g., main, HEAD~1)
    pub baseline: Option<String>,
}

/// Parameters for `semgrep-supply-chain`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SupplyChainParams {
    /// Path to project directory
    pub target: String,
}

/// Condensed view of a `--json` report.
fn findings_digest(report: &Value) -> Value {
    let results: Vec<Value> = array_at(report, "/results")
        .iter()
        .map(|r| {
            json!({
                "rule": value_at(r, "/check_id"),
                "severity": value_at(r, "/extra/severity"),
                "message": value_at(r, "/extra/message"),
                "file": value_at(r, "/path"),
                "line": value_at(r, "/start/line"),
                "code": value_at(r, "/extra/lines"),
            })
        })
        .collect();
    json!({
        "findings": results.len(),
        "errors": array_at(report, "/errors").len(),
        "results": results,
    })
}

/// stdout, or "No findings" for a quiet successful run.
fn report_text(output: &ProcessOutput) -> String {
    if output.stdout.is_empty() {
        "No findings".to_string()
    } else {
        output.stdout.clone()
    }
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct SemgrepTools {
    semgrep: ExternalTool,
}

impl SemgrepTools {
    pub const SCAN: &'static str = "semgrep-scan";
    pub const CI: &'static str = "semgrep-ci";
    pub const RULES: &'static str = "semgrep-rules";
    pub const SUPPLY_CHAIN: &'static str = "semgrep-supply-chain";

    pub fn policy() -> SuccessPolicy {
        SuccessPolicy::custom(|output| {
            !output.stdout.is_empty() || output.exit_code == Some(0) || output.stderr.is_empty()
        })
    }

    pub fn new(binary: PathBuf, runner: Arc<CommandRunner>) -> Self {
        Self::with_tool(ExternalTool::new(binary, Self::policy(), runner))
    }

    pub fn with_tool(semgrep: ExternalTool) -> Self {
        Self { semgrep }
    }

    #[instrument(skip_all, fields(target = %params.target, config = %params.config))]
    pub async fn scan(self: Arc<Self>, params: ScanParams) -> Result<CallToolResult, ToolError> {
        let mut args = vec!["--config".to_string(), params.config, params.target];
        if params.json {
            args.push("--json".to_string());
        }
        if let Some(severity) = params.severity.as_flag_value() {
            args.extend(["--severity".to_string(), severity.to_string()]);
        }
        args.push("--no-git-ignore".to_string());

        let output = self.semgrep.run(args).await?;
        let raw = report_text(&output);
        let text = match params.json.then(|| serde_json::from_str::<Value>(&raw)) {
            Some(Ok(report)) => pretty_json(&findings_digest(&report)),
            _ => raw,
        };
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(target = %params.target))]
    pub async fn ci(self: Arc<Self>, params: CiParams) -> Result<CallToolResult, ToolError> {
        let mut args = vec!["ci".to_string(), "--json".to_string()];
        if let Some(baseline) = params.baseline {
            args.extend(["--baseline-commit".to_string(), baseline]);
        }
        args.push(params.target);

        let output = self.semgrep.run(args).await?;
        Ok(success_result(output.annotate(report_text(&output))))
    }

    pub async fn rules(self: Arc<Self>, _params: NoParams) -> Result<CallToolResult, ToolError> {
        Ok(success_result(RULE_PACKS_TEXT.to_string()))
    }

    #[instrument(skip_all, fields(target = %params.target))]
    pub async fn supply_chain(
        self: Arc<Self>,
        params: SupplyChainParams,
    ) -> Result<CallToolResult, ToolError> {
        let args = [
            "--config".to_string(),
            "p/supply-chain".to_string(),
            "--json".to_string(),
            params.target,
        ];
        let output = self.semgrep.run(args).await?;
        Ok(success_result(output.annotate(report_text(&output))))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::SCAN,
                "Run Semgrep static analysis scan on code",
                this.clone(),
                Self::scan,
            ))
            .with_route(tool_route(
                Self::CI,
                "Run Semgrep in CI mode for pull request scanning",
                this.clone(),
                Self::ci,
            ))
            .with_route(tool_route(
                Self::RULES,
                "List available Semgrep rule packs",
                this.clone(),
                Self::rules,
            ))
            .with_route(tool_route(
                Self::SUPPLY_CHAIN,
                "Scan dependencies for known vulnerabilities",
                this,
                Self::supply_chain,
            ))
    }
}

const RULE_PACKS_TEXT: &str = "Available Semgrep Rule Packs:

SECURITY:
  p/security-audit     - Comprehensive security audit
  p/owasp-top-ten      - OWASP Top 10 vulnerabilities
  p/r2c-security-audit - R2C security rules
  p/secrets            - Secret/credential detection
  p/supply-chain       - Supply chain security
  p/cwe-top-25         - CWE Top 25 weaknesses

LANGUAGE-SPECIFIC:
  p/javascript         - JavaScript best practices
  p/typescript         - TypeScript rules
  p/python             - Python security & quality
  p/java               - Java security rules
  p/go                 - Go security rules
  p/ruby               - Ruby security rules
  p/php                - PHP security rules
  p/c                  - C/C++ security rules
  p/rust               - Rust rules

FRAMEWORKS:
  p/react              - React security rules
  p/nextjs             - Next.js rules
  p/nodejs             - Node.js security
  p/django             - Django security
  p/flask              - Flask security
  p/express            - Express.js rules
  p/rails              - Ruby on Rails

SPECIALIZED:
  p/jwt                - JWT security issues
  p/sql-injection      - SQL injection detection
  p/xss                - XSS vulnerabilities
  p/command-injection  - Command injection
  p/path-traversal     - Path traversal attacks
  p/ssrf               - SSRF vulnerabilities
  p/insecure-transport - Insecure communications

Usage: semgrep --config <pack-name> <target>";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process::testing::fake_tool;
    use crate::domains::tools::definitions::common::result_text;

    fn tools(script: &str) -> Arc<SemgrepTools> {
        Arc::new(SemgrepTools::with_tool(fake_tool(script, SemgrepTools::policy())))
    }

    fn scan_params(target: &str) -> ScanParams {
        serde_json::from_value(json!({ "target": target })).unwrap()
    }

    #[tokio::test]
    async fn test_findings_exit_code_is_not_failure() {
        let report = r#"{"results":[{"check_id":"python.lang.security.audit.eval-detected","path":"app.py","start":{"line":7},"extra":{"severity":"WARNING","message":"eval() detected","lines":"eval(x)"}}],"errors":[]}"#;
        let tools = tools(&format!("echo '{report}'; echo 'Ran 120 rules' >&2; exit 1"));
        let result = tools.scan(scan_params("./src")).await.unwrap();
        let digest: Value = serde_json::from_str(result_text(&result)).unwrap();
        assert_eq!(digest["findings"], 1);
        assert_eq!(digest["errors"], 0);
        assert_eq!(digest["results"][0]["rule"], "python.lang.security.audit.eval-detected");
        assert_eq!(digest["results"][0]["line"], 7);
    }

    #[tokio::test]
    async fn test_quiet_run_reports_no_findings() {
        let result = tools("exit 0").scan(scan_params("./src")).await.unwrap();
        assert_eq!(result_text(&result), "No findings");
    }

    #[tokio::test]
    async fn test_stderr_without_stdout_fails() {
        let err = tools("echo 'invalid config p/nope' >&2; exit 7")
            .scan(scan_params("./src"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid config p/nope"));
    }

    #[tokio::test]
    async fn test_scan_argument_order() {
        let tools = Arc::new(SemgrepTools::with_tool(
            crate::core::process::testing::echo_args_tool(SemgrepTools::policy()),
        ));
        let params: ScanParams = serde_json::from_value(json!({
            "target": "./src",
            "config": "p/secrets",
            "severity": "ERROR",
            "json": false
        }))
        .unwrap();
        let result = tools.scan(params).await.unwrap();
        assert_eq!(
            result_text(&result),
            "--config\np/secrets\n./src\n--severity\nERROR\n--no-git-ignore\n"
        );
    }
}
