//! Gitleaks adapter: secret detection in directories and git history.
//!
//! Gitleaks exits 1 when it finds leaks, so both 0 and 1 are successful runs.
//! Reports go to `/dev/stdout` as a single JSON array.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use super::common::{count_by, pretty_json, success_result, truncate_chars};
use crate::core::process::{CommandRunner, ExternalTool, SuccessPolicy};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::{NoParams, tool_route};

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for `gitleaks-detect`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DetectParams {
    /// Path to directory or git repository to scan
    pub path: String,

    /// Scan directory without git history (faster for non-git directories)
    #[serde(default, rename = "noGit")]
    pub no_git: bool,

    /// Enable verbose output
    #[serde(default)]
    pub verbose: bool,
}

/// Parameters for `gitleaks-protect`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ProtectParams {
    /// Path to git repository
    pub path: String,
}

/// Parameters for `gitleaks-git-log`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GitLogParams {
    /// Path to git repository
    pub path: String,

    /// Git commit range (e.g., 'HEAD~10..HEAD', 'abc123..def456')
    #[serde(rename = "commitRange")]
    pub commit_range: Option<String>,

    /// Scan commits since date (e.g., '2024-01-01')
    pub since: Option<String>,
}

// ============================================================================
// Report digests
// ============================================================================

/// One raw gitleaks finding; only the fields the digests use.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Finding {
    #[serde(rename = "RuleID")]
    rule_id: Option<String>,
    description: Option<String>,
    file: Option<String>,
    start_line: Option<u64>,
    commit: Option<String>,
    author: Option<String>,
    date: Option<String>,
    secret: Option<String>,
}

impl Finding {
    fn short_commit(&self) -> Option<String> {
        self.commit.as_deref().map(|c| truncate_chars(c, 8))
    }

    fn masked_secret(&self) -> String {
        match self.secret.as_deref() {
            Some(secret) if !secret.is_empty() => format!("{}...", truncate_chars(secret, 10)),
            _ => "redacted".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct FindingSummary {
    rule: Option<String>,
    description: Option<String>,
    file: Option<String>,
    line: Option<u64>,
    commit: Option<String>,
    author: Option<String>,
    date: Option<String>,
    secret: String,
}

#[derive(Debug, Serialize)]
struct DetectSummary {
    total_secrets: usize,
    by_rule: BTreeMap<String, usize>,
    findings: Vec<FindingSummary>,
}

#[derive(Debug, Serialize)]
struct CommitSecret {
    rule: Option<String>,
    file: Option<String>,
    line: Option<u64>,
}

#[derive(Debug, Serialize)]
struct CommitGroup {
    author: Option<String>,
    date: Option<String>,
    secrets: Vec<CommitSecret>,
}

/// True for the "nothing found" report forms.
fn is_empty_report(output: &str) -> bool {
    let trimmed = output.trim();
    trimmed.is_empty() || trimmed == "[]"
}

fn summarize(findings: &[Finding]) -> DetectSummary {
    DetectSummary {
        total_secrets: findings.len(),
        by_rule: count_by(findings.iter().map(|f| f.rule_id.as_deref())),
        findings: findings
            .iter()
            .map(|f| FindingSummary {
                rule: f.rule_id.clone(),
                description: f.description.clone(),
                file: f.file.clone(),
                line: f.start_line,
                commit: f.short_commit(),
                author: f.author.clone(),
                date: f.date.clone(),
                secret: f.masked_secret(),
            })
            .collect(),
    }
}

fn group_by_commit(findings: &[Finding]) -> BTreeMap<String, CommitGroup> {
    let mut groups: BTreeMap<String, CommitGroup> = BTreeMap::new();
    for f in findings {
        let key = f
            .short_commit()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        groups
            .entry(key)
            .or_insert_with(|| CommitGroup {
                author: f.author.clone(),
                date: f.date.clone(),
                secrets: Vec::new(),
            })
            .secrets
            .push(CommitSecret {
                rule: f.rule_id.clone(),
                file: f.file.clone(),
                line: f.start_line,
            });
    }
    groups
}

fn parse_findings(output: &str) -> Result<Vec<Finding>, ToolError> {
    serde_json::from_str(output.trim())
        .map_err(|e| ToolError::unexpected(format!("unreadable gitleaks report: {e}")))
}

fn report_args(command: &str, path: &str) -> Vec<String> {
    [
        command,
        "--source",
        path,
        "--report-format",
        "json",
        "--report-path",
        "/dev/stdout",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct GitleaksTools {
    gitleaks: ExternalTool,
}

impl GitleaksTools {
    pub const DETECT: &'static str = "gitleaks-detect";
    pub const PROTECT: &'static str = "gitleaks-protect";
    pub const GIT_LOG: &'static str = "gitleaks-git-log";
    pub const RULES: &'static str = "gitleaks-rules";

    pub fn new(binary: PathBuf, runner: Arc<CommandRunner>) -> Self {
        Self::with_tool(ExternalTool::new(binary, SuccessPolicy::ExitCodeZeroOrOne, runner))
    }

    pub fn with_tool(gitleaks: ExternalTool) -> Self {
        Self { gitleaks }
    }

    #[instrument(skip_all, fields(path = %params.path))]
    pub async fn detect(
        self: Arc<Self>,
        params: DetectParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = report_args("detect", &params.path);
        if params.no_git {
            args.push("--no-git".to_string());
        }
        if params.verbose {
            args.push("--verbose".to_string());
        }

        let output = self.gitleaks.run(args).await?;
        let report = output.stdout_or_stderr();
        if is_empty_report(report) {
            return Ok(success_result(output.annotate("No secrets detected.".to_string())));
        }

        // A report that is not a findings array is passed through untouched.
        let text = match serde_json::from_str::<Vec<Finding>>(report.trim()) {
            Ok(findings) => pretty_json(&serde_json::to_value(summarize(&findings))?),
            Err(_) => report.to_string(),
        };
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(path = %params.path))]
    pub async fn protect(
        self: Arc<Self>,
        params: ProtectParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = report_args("protect", &params.path);
        args.push("--staged".to_string());

        let output = self.gitleaks.run(args).await?;
        let report = output.stdout_or_stderr();
        if is_empty_report(report) {
            return Ok(success_result(output.annotate(
                "No secrets detected in staged changes. Safe to commit.".to_string(),
            )));
        }

        let findings: Value = serde_json::from_str(report.trim())
            .map_err(|e| ToolError::unexpected(format!("unreadable gitleaks report: {e}")))?;
        let count = findings.as_array().map_or(0, Vec::len);
        let text = format!(
            "WARNING: {} secret(s) found in staged changes!\n\n{}",
            count,
            pretty_json(&findings)
        );
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(path = %params.path))]
    pub async fn git_log(
        self: Arc<Self>,
        params: GitLogParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = report_args("detect", &params.path);
        if let Some(range) = &params.commit_range {
            args.extend(["--log-opts".to_string(), range.clone()]);
        }
        if let Some(since) = &params.since {
            args.extend(["--log-opts".to_string(), format!("--since={since}")]);
        }

        let output = self.gitleaks.run(args).await?;
        let report = output.stdout_or_stderr();
        if is_empty_report(report) {
            return Ok(success_result(
                output.annotate("No secrets detected in git history.".to_string()),
            ));
        }

        let findings = parse_findings(report)?;
        let groups = group_by_commit(&findings);
        let text = format!(
            "Found {} secrets across {} commits:\n\n{}",
            findings.len(),
            groups.len(),
            pretty_json(&serde_json::to_value(&groups)?)
        );
        Ok(success_result(output.annotate(text)))
    }

    pub async fn rules(self: Arc<Self>, _params: NoParams) -> Result<CallToolResult, ToolError> {
        Ok(success_result(RULES_TEXT.to_string()))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::DETECT,
                "Scan a directory or git repository for secrets and credentials",
                this.clone(),
                Self::detect,
            ))
            .with_route(tool_route(
                Self::PROTECT,
                "Scan staged changes in a git repository (pre-commit hook style)",
                this.clone(),
                Self::protect,
            ))
            .with_route(tool_route(
                Self::GIT_LOG,
                "Scan git history for secrets (specific commits or range)",
                this.clone(),
                Self::git_log,
            ))
            .with_route(tool_route(
                Self::RULES,
                "List all detection rules supported by Gitleaks",
                this,
                Self::rules,
            ))
    }
}

const RULES_TEXT: &str = "Gitleaks Detection Rules (Common):

API KEYS & TOKENS:
  - aws-access-key         - AWS Access Key ID
  - aws-secret-key         - AWS Secret Access Key
  - gcp-api-key            - Google Cloud API Key
  - azure-storage-key      - Azure Storage Account Key
  - github-pat             - GitHub Personal Access Token
  - gitlab-pat             - GitLab Personal Access Token
  - slack-token            - Slack API Token
  - stripe-api-key         - Stripe API Key
  - twilio-api-key         - Twilio API Key
  - sendgrid-api-key       - SendGrid API Key
  - mailchimp-api-key      - Mailchimp API Key

CLOUD PROVIDERS:
  - aws-*                  - Various AWS credentials
  - gcp-*                  - Various GCP credentials
  - azure-*                - Various Azure credentials
  - digitalocean-*         - DigitalOcean tokens
  - heroku-api-key         - Heroku API Key

DATABASE & INFRASTRUCTURE:
  - postgres-password      - PostgreSQL connection strings
  - mysql-password         - MySQL connection strings
  - mongodb-connection     - MongoDB connection strings
  - redis-password         - Redis passwords

PRIVATE KEYS:
  - private-key            - Generic private keys
  - rsa-private-key        - RSA private keys
  - ssh-private-key        - SSH private keys
  - pgp-private-key        - PGP private keys

OTHER:
  - jwt                    - JSON Web Tokens
  - generic-api-key        - Generic API keys
  - password-in-url        - Passwords in URLs
  - bearer-token           - Bearer tokens

Use custom config with --config flag for additional rules.";
