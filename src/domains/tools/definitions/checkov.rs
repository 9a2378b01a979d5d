//! Checkov adapter: infrastructure-as-code misconfiguration scanning.
//!
//! Checkov exits non-zero whenever a check fails, so every exit status is
//! accepted and only a spawn failure is an error.

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
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Terraform,
    Cloudformation,
    Kubernetes,
    Dockerfile,
    Helm,
    Arm,
    Bicep,
    Serverless,
    Ansible,
    #[default]
    All,
}

impl Framework {
    fn as_str(self) -> &'static str {
        match self {
            Self::Terraform => "terraform",
            Self::Cloudformation => "cloudformation",
            Self::Kubernetes => "kubernetes",
            Self::Dockerfile => "dockerfile",
            Self::Helm => "helm",
            Self::Arm => "arm",
            Self::Bicep => "bicep",
            Self::Serverless => "serverless",
            Self::Ansible => "ansible",
            Self::All => "all",
        }
    }

    /// `--framework` arguments; none for all.
    fn args(self) -> Vec<String> {
        match self {
            Self::All => Vec::new(),
            other => vec!["--framework".to_string(), other.as_str().to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
pub enum Severity {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "CRITICAL")]
    Critical,
    #[default]
    #[serde(rename = "all")]
    All,
}

impl Severity {
    fn as_flag_value(self) -> Option<&'static str> {
        match self {
            Self::Low => Some("LOW"),
            Self::Medium => Some("MEDIUM"),
            Self::High => Some("HIGH"),
            Self::Critical => Some("CRITICAL"),
            Self::All => None,
        }
    }
}

fn default_branch() -> String {
    "main".to_string()
}

/// Parameters for `checkov-scan`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ScanParams {
    /// Path to IaC files or directory
    pub path: String,

    /// IaC framework to scan
    #[serde(default)]
    pub framework: Framework,

    /// Specific check IDs to run (e.g., CKV_AWS_1)
    pub check: Option<Vec<String>>,

    /// Check IDs to skip
    #[serde(rename = "skipCheck")]
    pub skip_check: Option<Vec<String>>,

    /// Minimum severity to report
    #[serde(default)]
    pub severity: Severity,
}

/// Parameters for `checkov-terraform`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TerraformParams {
    /// Path to Terraform files
    pub path: String,

    /// Path to terraform.tfvars file
    #[serde(rename = "varFile")]
    pub var_file: Option<String>,

    /// Download external modules for scanning
    #[serde(default, rename = "externalModulesDownload")]
    pub external_modules_download: bool,
}

/// Parameters for `checkov-kubernetes`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct KubernetesParams {
    /// Path to Kubernetes YAML files
    pub path: String,

    /// Kubernetes namespace to scan
    pub namespace: Option<String>,
}

/// Parameters for `checkov-dockerfile`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DockerfileParams {
    /// Path to Dockerfile or directory containing Dockerfiles
    pub path: String,
}

/// Parameters for `checkov-repo`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RepoParams {
    /// Git repository URL
    pub repo: String,

    /// Branch to scan
    #[serde(default = "default_branch")]
    pub branch: String,
}

/// Parameters for `checkov-list-checks`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListChecksParams {
    /// Framework to list checks for
    #[serde(default)]
    pub framework: Framework,
}

// ============================================================================
// Report digests
// ============================================================================

fn summary_count(report: &Value, field: &str) -> Value {
    report
        .pointer(&format!("/summary/{field}"))
        .filter(|v| !v.is_null())
        .cloned()
        .unwrap_or(json!(0))
}

/// Pass/fail counters plus the first twenty failed checks.
fn scan_digest(report: &Value) -> Value {
    let failed: Vec<Value> = array_at(report, "/results/failed_checks")
        .iter()
        .take(20)
        .map(|c| {
            json!({
                "check_id": value_at(c, "/check_id"),
                "check_name": value_at(c, "/check/name"),
                "severity": value_at(c, "/severity"),
                "file": value_at(c, "/file_path"),
                "resource": value_at(c, "/resource"),
                "guideline": value_at(c, "/guideline"),
            })
        })
        .collect();
    json!({
        "passed": summary_count(report, "passed"),
        "failed": summary_count(report, "failed"),
        "skipped": summary_count(report, "skipped"),
        "parsing_errors": summary_count(report, "parsing_errors"),
        "failed_checks": failed,
    })
}

/// stdout, else stderr, else a note with the exit status.
fn output_text(output: &ProcessOutput) -> String {
    if !output.stdout.is_empty() {
        output.stdout.clone()
    } else if !output.stderr.is_empty() {
        output.stderr.clone()
    } else {
        let code = output
            .exit_code
            .map_or_else(|| "none".to_string(), |c| c.to_string());
        format!("Checkov completed with code {code}")
    }
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct CheckovTools {
    checkov: ExternalTool,
}

impl CheckovTools {
    pub const SCAN: &'static str = "checkov-scan";
    pub const TERRAFORM: &'static str = "checkov-terraform";
    pub const KUBERNETES: &'static str = "checkov-kubernetes";
    pub const DOCKERFILE: &'static str = "checkov-dockerfile";
    pub const REPO: &'static str = "checkov-repo";
    pub const LIST_CHECKS: &'static str = "checkov-list-checks";
    pub const CATEGORIES: &'static str = "checkov-categories";

    pub fn new(binary: PathBuf, runner: Arc<CommandRunner>) -> Self {
        Self::with_tool(ExternalTool::new(binary, SuccessPolicy::always(), runner))
    }

    pub fn with_tool(checkov: ExternalTool) -> Self {
        Self { checkov }
    }

    async fn run_text(&self, args: Vec<String>) -> Result<CallToolResult, ToolError> {
        let output = self.checkov.run(args).await?;
        Ok(success_result(output.annotate(output_text(&output))))
    }

    #[instrument(skip_all, fields(path = %params.path))]
    pub async fn scan(self: Arc<Self>, params: ScanParams) -> Result<CallToolResult, ToolError> {
        let mut args = vec![
            "-d".to_string(),
            params.path,
            "-o".to_string(),
            "json".to_string(),
        ];
        args.extend(params.framework.args());
        if let Some(checks) = params.check.filter(|c| !c.is_empty()) {
            args.extend(["--check".to_string(), checks.join(",")]);
        }
        if let Some(skips) = params.skip_check.filter(|c| !c.is_empty()) {
            args.extend(["--skip-check".to_string(), skips.join(",")]);
        }
        if let Some(severity) = params.severity.as_flag_value() {
            args.extend(["--severity".to_string(), severity.to_string()]);
        }

        let output = self.checkov.run(args).await?;
        let raw = output_text(&output);
        let text = match serde_json::from_str::<Value>(&raw) {
            Ok(report) => pretty_json(&scan_digest(&report)),
            Err(_) => raw,
        };
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(path = %params.path))]
    pub async fn terraform(
        self: Arc<Self>,
        params: TerraformParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = vec![
            "-d".to_string(),
            params.path,
            "--framework".to_string(),
            "terraform".to_string(),
            "-o".to_string(),
            "json".to_string(),
        ];
        if let Some(var_file) = params.var_file {
            args.extend(["--var-file".to_string(), var_file]);
        }
        if params.external_modules_download {
            args.extend(["--download-external-modules".to_string(), "true".to_string()]);
        }
        self.run_text(args).await
    }

    /// The namespace is accepted for symmetry with other Kubernetes tools;
    /// checkov scans manifests, not live namespaces.
    #[instrument(skip_all, fields(path = %params.path))]
    pub async fn kubernetes(
        self: Arc<Self>,
        params: KubernetesParams,
    ) -> Result<CallToolResult, ToolError> {
        let args = vec![
            "-d".to_string(),
            params.path,
            "--framework".to_string(),
            "kubernetes".to_string(),
            "-o".to_string(),
            "json".to_string(),
        ];
        self.run_text(args).await
    }

    #[instrument(skip_all, fields(path = %params.path))]
    pub async fn dockerfile(
        self: Arc<Self>,
        params: DockerfileParams,
    ) -> Result<CallToolResult, ToolError> {
        let args = vec![
            "-f".to_string(),
            params.path,
            "--framework".to_string(),
            "dockerfile".to_string(),
            "-o".to_string(),
            "json".to_string(),
        ];
        self.run_text(args).await
    }

    #[instrument(skip_all, fields(repo = %params.repo))]
    pub async fn repo(self: Arc<Self>, params: RepoParams) -> Result<CallToolResult, ToolError> {
        let args = vec![
            "--repo-url".to_string(),
            params.repo,
            "--branch".to_string(),
            params.branch,
            "-o".to_string(),
            "json".to_string(),
        ];
        self.run_text(args).await
    }

    pub async fn list_checks(
        self: Arc<Self>,
        params: ListChecksParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = vec!["--list".to_string()];
        args.extend(params.framework.args());
        self.run_text(args).await
    }

    pub async fn categories(
        self: Arc<Self>,
        _params: NoParams,
    ) -> Result<CallToolResult, ToolError> {
        Ok(success_result(CATEGORIES_TEXT.to_string()))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::SCAN,
                "Scan infrastructure as code files for security misconfigurations",
                this.clone(),
                Self::scan,
            ))
            .with_route(tool_route(
                Self::TERRAFORM,
                "Scan Terraform files specifically",
                this.clone(),
                Self::terraform,
            ))
            .with_route(tool_route(
                Self::KUBERNETES,
                "Scan Kubernetes manifests",
                this.clone(),
                Self::kubernetes,
            ))
            .with_route(tool_route(
                Self::DOCKERFILE,
                "Scan Dockerfiles for security issues",
                this.clone(),
                Self::dockerfile,
            ))
            .with_route(tool_route(
                Self::REPO,
                "Scan a git repository for IaC security issues",
                this.clone(),
                Self::repo,
            ))
            .with_route(tool_route(
                Self::LIST_CHECKS,
                "List available security checks",
                this.clone(),
                Self::list_checks,
            ))
            .with_route(tool_route(
                Self::CATEGORIES,
                "Show check categories and common issues",
                this,
                Self::categories,
            ))
    }
}

const CATEGORIES_TEXT: &str = "Checkov Security Check Categories:

AWS (CKV_AWS_*):
  - IAM policies and roles
  - S3 bucket configurations
  - Security groups and NACLs
  - Encryption settings
  - Logging and monitoring
  - VPC configurations

AZURE (CKV_AZURE_*):
  - Storage account security
  - Network security groups
  - Key Vault configurations
  - App Service security
  - SQL database settings

GCP (CKV_GCP_*):
  - IAM bindings
  - Storage bucket ACLs
  - Compute engine security
  - Cloud SQL settings
  - GKE cluster configurations

KUBERNETES (CKV_K8S_*):
  - Pod security contexts
  - Resource limits
  - Network policies
  - RBAC configurations
  - Service account settings

DOCKER (CKV_DOCKER_*):
  - Base image security
  - USER instructions
  - HEALTHCHECK presence
  - Secret handling
  - Package manager updates

COMMON CHECKS:
  CKV_AWS_1   - S3 Bucket has versioning enabled
  CKV_AWS_18  - S3 Bucket logging enabled
  CKV_AWS_19  - S3 Bucket encryption enabled
  CKV_AWS_21  - S3 Bucket public access blocked
  CKV_AWS_23  - Security group has description
  CKV_AWS_24  - Security group allows all traffic
  CKV_K8S_1   - Container CPU limits set
  CKV_K8S_9   - Readiness probe configured
  CKV_K8S_21  - Default namespace not used
  CKV_K8S_28  - Pod runs as non-root

Use --list to see all available checks.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process::testing::{echo_args_tool, fake_tool};
    use crate::domains::tools::definitions::common::result_text;

    fn tools(script: &str) -> Arc<CheckovTools> {
        Arc::new(CheckovTools::with_tool(fake_tool(script, SuccessPolicy::always())))
    }

    #[test]
    fn test_scan_digest() {
        let report = json!({
            "summary": {"passed": 14, "failed": 2, "skipped": 0, "parsing_errors": 0},
            "results": {"failed_checks": [
                {"check_id": "CKV_AWS_19", "check": {"name": "Ensure S3 bucket encryption"},
                 "severity": "HIGH", "file_path": "/main.tf", "resource": "aws_s3_bucket.logs",
                 "guideline": "https://docs.example/CKV_AWS_19"}
            ]}
        });
        let digest = scan_digest(&report);
        assert_eq!(digest["passed"], 14);
        assert_eq!(digest["failed"], 2);
        assert_eq!(digest["failed_checks"][0]["check_name"], "Ensure S3 bucket encryption");
        assert_eq!(digest["failed_checks"][0]["resource"], "aws_s3_bucket.logs");
    }

    #[test]
    fn test_scan_digest_defaults_missing_counts() {
        let digest = scan_digest(&json!({"summary": {"passed": 3}}));
        assert_eq!(digest["failed"], 0);
        assert_eq!(digest["failed_checks"], json!([]));
    }

    #[tokio::test]
    async fn test_failed_checks_exit_code_is_accepted() {
        let result = tools(r#"echo '{"summary":{"passed":1,"failed":1}}'; exit 1"#)
            .scan(serde_json::from_value(json!({"path": "./infra"})).unwrap())
            .await
            .unwrap();
        let digest: Value = serde_json::from_str(result_text(&result)).unwrap();
        assert_eq!(digest["failed"], 1);
    }

    #[tokio::test]
    async fn test_silent_run_reports_exit_code() {
        let result = tools("exit 3")
            .dockerfile(DockerfileParams {
                path: "./Dockerfile".into(),
            })
            .await
            .unwrap();
        assert_eq!(result_text(&result), "Checkov completed with code 3");
    }

    #[tokio::test]
    async fn test_scan_arguments() {
        let tools = Arc::new(CheckovTools::with_tool(echo_args_tool(SuccessPolicy::always())));
        let params: ScanParams = serde_json::from_value(json!({
            "path": "./infra",
            "framework": "terraform",
            "check": ["CKV_AWS_1", "CKV_AWS_19"],
            "skipCheck": [],
            "severity": "HIGH"
        }))
        .unwrap();
        let result = tools.scan(params).await.unwrap();
        assert_eq!(
            result_text(&result),
            "-d\n./infra\n-o\njson\n--framework\nterraform\n--check\nCKV_AWS_1,CKV_AWS_19\n--severity\nHIGH\n"
        );
    }
}
