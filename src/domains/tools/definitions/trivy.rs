//! Trivy adapter: vulnerability, misconfiguration and SBOM scanning for
//! images, filesystems, repositories and Kubernetes clusters.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use super::common::{array_at, pretty_json, success_result, truncate_chars, value_at};
use crate::core::process::{CommandRunner, ExternalTool, SuccessPolicy};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::tool_route;

// ============================================================================
// Tool Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
    #[default]
    All,
}

impl Severity {
    /// `--severity` arguments; none for ALL.
    fn args(self) -> Vec<String> {
        let level = match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Unknown => "UNKNOWN",
            Self::All => return Vec::new(),
        };
        vec!["--severity".to_string(), level.to_string()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Scanner {
    Vuln,
    Misconfig,
    Secret,
    License,
}

impl Scanner {
    fn as_str(self) -> &'static str {
        match self {
            Self::Vuln => "vuln",
            Self::Misconfig => "misconfig",
            Self::Secret => "secret",
            Self::License => "license",
        }
    }
}

fn scanner_list(scanners: &[Scanner]) -> String {
    scanners
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, Copy, Default, Deserialize, JsonSchema)]
pub enum SbomFormat {
    #[default]
    #[serde(rename = "cyclonedx")]
    CycloneDx,
    #[serde(rename = "spdx")]
    Spdx,
    #[serde(rename = "spdx-json")]
    SpdxJson,
}

impl SbomFormat {
    fn as_str(self) -> &'static str {
        match self {
            Self::CycloneDx => "cyclonedx",
            Self::Spdx => "spdx",
            Self::SpdxJson => "spdx-json",
        }
    }
}

fn default_fs_scanners() -> Vec<Scanner> {
    vec![Scanner::Vuln, Scanner::Misconfig, Scanner::Secret]
}

fn default_k8s_scanners() -> Vec<Scanner> {
    vec![Scanner::Vuln, Scanner::Misconfig]
}

fn default_branch() -> String {
    "main".to_string()
}

/// Parameters for `trivy-image`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ImageParams {
    /// Container image to scan (e.g., nginx:latest, alpine:3.14)
    pub image: String,

    /// Minimum severity to report
    #[serde(default)]
    pub severity: Severity,

    /// Ignore vulnerabilities without fixes
    #[serde(default, rename = "ignoreUnfixed")]
    pub ignore_unfixed: bool,
}

/// Parameters for `trivy-fs`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FsParams {
    /// Path to directory to scan
    pub path: String,

    /// Types of issues to scan for
    #[serde(default = "default_fs_scanners")]
    pub scanners: Vec<Scanner>,

    /// Minimum severity to report
    #[serde(default)]
    pub severity: Severity,
}

/// Parameters for `trivy-repo`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RepoParams {
    /// Git repository URL to scan
    pub repo: String,

    /// Branch to scan
    #[serde(default = "default_branch")]
    pub branch: String,
}

/// Parameters for `trivy-config`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ConfigParams {
    /// Path to IaC files
    pub path: String,

    /// Minimum severity to report
    #[serde(default)]
    pub severity: Severity,
}

/// Parameters for `trivy-sbom`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SbomParams {
    /// Image or directory to generate SBOM for
    pub target: String,

    /// SBOM format
    #[serde(default)]
    pub format: SbomFormat,
}

/// Parameters for `trivy-k8s`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct K8sParams {
    /// Kubernetes context to use
    pub context: Option<String>,

    /// Namespace to scan (default: all)
    pub namespace: Option<String>,

    /// Types of issues to scan for
    #[serde(default = "default_k8s_scanners")]
    pub scanners: Vec<Scanner>,
}

// ============================================================================
// Report digests
// ============================================================================

fn count_severity(vulns: &[Value], severity: &str) -> usize {
    vulns
        .iter()
        .filter(|v| v.get("Severity").and_then(Value::as_str) == Some(severity))
        .count()
}

/// Per-target vulnerability counts with the first ten findings.
fn vulnerability_digest(image: &str, report: &Value) -> Value {
    let results: Vec<Value> = array_at(report, "/Results")
        .iter()
        .map(|r| {
            let vulns = array_at(r, "/Vulnerabilities");
            let top: Vec<Value> = vulns
                .iter()
                .take(10)
                .map(|v| {
                    json!({
                        "id": value_at(v, "/VulnerabilityID"),
                        "pkg": value_at(v, "/PkgName"),
                        "severity": value_at(v, "/Severity"),
                        "title": value_at(v, "/Title"),
                        "fixed_version": value_at(v, "/FixedVersion"),
                    })
                })
                .collect();
            json!({
                "target": value_at(r, "/Target"),
                "type": value_at(r, "/Type"),
                "vulnerabilities": vulns.len(),
                "critical": count_severity(vulns, "CRITICAL"),
                "high": count_severity(vulns, "HIGH"),
                "medium": count_severity(vulns, "MEDIUM"),
                "low": count_severity(vulns, "LOW"),
                "top_vulns": top,
            })
        })
        .collect();
    json!({ "image": image, "results": results })
}

/// Per-target misconfiguration list with shortened descriptions.
fn misconfig_digest(path: &str, report: &Value) -> Value {
    let results: Vec<Value> = array_at(report, "/Results")
        .iter()
        .map(|r| {
            let misconfigs = array_at(r, "/Misconfigurations");
            let issues: Vec<Value> = misconfigs
                .iter()
                .map(|m| {
                    let description = m
                        .get("Description")
                        .and_then(Value::as_str)
                        .map(|d| Value::String(truncate_chars(d, 200)))
                        .unwrap_or(Value::Null);
                    json!({
                        "id": value_at(m, "/ID"),
                        "title": value_at(m, "/Title"),
                        "severity": value_at(m, "/Severity"),
                        "description": description,
                        "resolution": value_at(m, "/Resolution"),
                    })
                })
                .collect();
            json!({
                "target": value_at(r, "/Target"),
                "type": value_at(r, "/Type"),
                "misconfigurations": misconfigs.len(),
                "issues": issues,
            })
        })
        .collect();
    json!({ "path": path, "results": results })
}

/// Render a JSON report through `digest`, or return the raw text when
/// trivy did not produce JSON.
fn render_report<F>(raw: &str, digest: F) -> String
where
    F: FnOnce(&Value) -> Value,
{
    match serde_json::from_str::<Value>(raw) {
        Ok(report) => pretty_json(&digest(&report)),
        Err(_) => raw.to_string(),
    }
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct TrivyTools {
    trivy: ExternalTool,
}

impl TrivyTools {
    pub const IMAGE: &'static str = "trivy-image";
    pub const FS: &'static str = "trivy-fs";
    pub const REPO: &'static str = "trivy-repo";
    pub const CONFIG: &'static str = "trivy-config";
    pub const SBOM: &'static str = "trivy-sbom";
    pub const K8S: &'static str = "trivy-k8s";

    pub fn new(binary: PathBuf, runner: Arc<CommandRunner>) -> Self {
        Self::with_tool(ExternalTool::new(binary, SuccessPolicy::AnyOutputOrExitZero, runner))
    }

    pub fn with_tool(trivy: ExternalTool) -> Self {
        Self { trivy }
    }

    #[instrument(skip_all, fields(image = %params.image))]
    pub async fn image(self: Arc<Self>, params: ImageParams) -> Result<CallToolResult, ToolError> {
        let mut args = vec!["image".to_string(), "--format".to_string(), "json".to_string()];
        args.extend(params.severity.args());
        if params.ignore_unfixed {
            args.push("--ignore-unfixed".to_string());
        }
        args.push(params.image.clone());

        let output = self.trivy.run(args).await?;
        let text = render_report(output.stdout_or_stderr(), |report| {
            vulnerability_digest(&params.image, report)
        });
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(path = %params.path))]
    pub async fn fs(self: Arc<Self>, params: FsParams) -> Result<CallToolResult, ToolError> {
        let mut args = vec![
            "fs".to_string(),
            "--format".to_string(),
            "json".to_string(),
            "--scanners".to_string(),
            scanner_list(&params.scanners),
        ];
        args.extend(params.severity.args());
        args.push(params.path);

        let output = self.trivy.run(args).await?;
        let text = render_report(output.stdout_or_stderr(), Value::clone);
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(repo = %params.repo))]
    pub async fn repo(self: Arc<Self>, params: RepoParams) -> Result<CallToolResult, ToolError> {
        let args = [
            "repo".to_string(),
            "--format".to_string(),
            "json".to_string(),
            "--branch".to_string(),
            params.branch,
            params.repo,
        ];
        let output = self.trivy.run(args).await?;
        let text = render_report(output.stdout_or_stderr(), Value::clone);
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(path = %params.path))]
    pub async fn config(
        self: Arc<Self>,
        params: ConfigParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = vec!["config".to_string(), "--format".to_string(), "json".to_string()];
        args.extend(params.severity.args());
        args.push(params.path.clone());

        let output = self.trivy.run(args).await?;
        let text = render_report(output.stdout_or_stderr(), |report| {
            misconfig_digest(&params.path, report)
        });
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(target = %params.target))]
    pub async fn sbom(self: Arc<Self>, params: SbomParams) -> Result<CallToolResult, ToolError> {
        let args = [
            "image".to_string(),
            "--format".to_string(),
            params.format.as_str().to_string(),
            params.target,
        ];
        let output = self.trivy.run(args).await?;
        Ok(success_result(output.annotate(output.stdout_or_stderr().to_string())))
    }

    #[instrument(skip_all, fields(namespace = ?params.namespace))]
    pub async fn k8s(self: Arc<Self>, params: K8sParams) -> Result<CallToolResult, ToolError> {
        let mut args = vec!["k8s".to_string(), "--format".to_string(), "json".to_string()];
        if let Some(context) = &params.context {
            args.extend(["--context".to_string(), context.clone()]);
        }
        match &params.namespace {
            Some(ns) => args.extend(["-n".to_string(), ns.clone()]),
            None => args.push("--all-namespaces".to_string()),
        }
        args.extend(["--scanners".to_string(), scanner_list(&params.scanners)]);
        args.push("cluster".to_string());

        let output = self.trivy.run(args).await?;
        let text = render_report(output.stdout_or_stderr(), Value::clone);
        Ok(success_result(output.annotate(text)))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::IMAGE,
                "Scan a container image for vulnerabilities",
                this.clone(),
                Self::image,
            ))
            .with_route(tool_route(
                Self::FS,
                "Scan a filesystem/directory for vulnerabilities and misconfigurations",
                this.clone(),
                Self::fs,
            ))
            .with_route(tool_route(
                Self::REPO,
                "Scan a git repository for vulnerabilities",
                this.clone(),
                Self::repo,
            ))
            .with_route(tool_route(
                Self::CONFIG,
                "Scan IaC files for misconfigurations (Terraform, CloudFormation, Kubernetes, etc.)",
                this.clone(),
                Self::config,
            ))
            .with_route(tool_route(
                Self::SBOM,
                "Generate a Software Bill of Materials (SBOM)",
                this.clone(),
                Self::sbom,
            ))
            .with_route(tool_route(
                Self::K8S,
                "Scan Kubernetes cluster for vulnerabilities and misconfigurations",
                this,
                Self::k8s,
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process::testing::{echo_args_tool, fake_tool};
    use crate::domains::tools::definitions::common::result_text;
    use pretty_assertions::assert_eq;

    fn echo_tools() -> Arc<TrivyTools> {
        Arc::new(TrivyTools::with_tool(echo_args_tool(
            SuccessPolicy::AnyOutputOrExitZero,
        )))
    }

    #[test]
    fn test_vulnerability_digest() {
        let report = json!({
            "Results": [{
                "Target": "alpine:3.14 (alpine 3.14.2)",
                "Type": "alpine",
                "Vulnerabilities": [
                    {"VulnerabilityID": "CVE-2021-36159", "PkgName": "apk-tools",
                     "Severity": "CRITICAL", "Title": "libfetch OOB read",
                     "FixedVersion": "2.12.6-r0"},
                    {"VulnerabilityID": "CVE-2021-3711", "PkgName": "libcrypto1.1",
                     "Severity": "CRITICAL"},
                    {"VulnerabilityID": "CVE-2021-3712", "PkgName": "libssl1.1", "Severity": "HIGH"}
                ]
            }, {
                "Target": "app/package-lock.json",
                "Type": "npm"
            }]
        });
        let digest = vulnerability_digest("alpine:3.14", &report);
        assert_eq!(digest["image"], "alpine:3.14");
        assert_eq!(digest["results"][0]["vulnerabilities"], 3);
        assert_eq!(digest["results"][0]["critical"], 2);
        assert_eq!(digest["results"][0]["high"], 1);
        assert_eq!(digest["results"][0]["top_vulns"][0]["fixed_version"], "2.12.6-r0");
        assert_eq!(digest["results"][0]["top_vulns"][1]["fixed_version"], Value::Null);
        assert_eq!(digest["results"][1]["vulnerabilities"], 0);
    }

    #[test]
    fn test_misconfig_digest_shortens_descriptions() {
        let long = "x".repeat(500);
        let report = json!({
            "Results": [{
                "Target": "main.tf",
                "Type": "terraform",
                "Misconfigurations": [{"ID": "AVD-AWS-0086", "Severity": "HIGH", "Description": long}]
            }]
        });
        let digest = misconfig_digest("./infra", &report);
        assert_eq!(digest["results"][0]["misconfigurations"], 1);
        assert_eq!(
            digest["results"][0]["issues"][0]["description"].as_str().unwrap().len(),
            200
        );
    }

    #[tokio::test]
    async fn test_image_arguments_skip_severity_for_all() {
        let result = echo_tools()
            .image(ImageParams {
                image: "nginx:latest".into(),
                severity: Severity::All,
                ignore_unfixed: true,
            })
            .await
            .unwrap();
        assert_eq!(
            result_text(&result),
            "image\n--format\njson\n--ignore-unfixed\nnginx:latest\n"
        );
    }

    #[tokio::test]
    async fn test_k8s_defaults_to_all_namespaces() {
        let params: K8sParams = serde_json::from_value(json!({})).unwrap();
        let result = echo_tools().k8s(params).await.unwrap();
        assert_eq!(
            result_text(&result),
            "k8s\n--format\njson\n--all-namespaces\n--scanners\nvuln,misconfig\ncluster\n"
        );
    }

    #[tokio::test]
    async fn test_fs_severity_and_scanners() {
        let params: FsParams = serde_json::from_value(json!({
            "path": "/src",
            "severity": "HIGH"
        }))
        .unwrap();
        let result = echo_tools().fs(params).await.unwrap();
        assert_eq!(
            result_text(&result),
            "fs\n--format\njson\n--scanners\nvuln,misconfig,secret\n--severity\nHIGH\n/src\n"
        );
    }

    #[tokio::test]
    async fn test_failure_without_output() {
        let tools = Arc::new(TrivyTools::with_tool(fake_tool(
            "echo 'FATAL unable to find the specified image' >&2; exit 1",
            SuccessPolicy::AnyOutputOrExitZero,
        )));
        let err = tools
            .image(ImageParams {
                image: "nope:latest".into(),
                severity: Severity::All,
                ignore_unfixed: false,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unable to find the specified image"));
    }
}
