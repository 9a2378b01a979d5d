//! Prowler adapter: cloud security posture assessment for AWS, Azure and GCP.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use super::common::{count_by, pretty_json, success_result, value_at};
use crate::core::process::{CommandRunner, ExternalTool, SuccessPolicy};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::tool_route;

// ============================================================================
// Tool Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Informational,
    #[default]
    All,
}

impl Severity {
    fn args(self) -> Vec<String> {
        let level = match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Informational => "informational",
            Self::All => return Vec::new(),
        };
        vec!["--severity".to_string(), level.to_string()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
pub enum Compliance {
    #[serde(rename = "cis_1.4")]
    Cis14,
    #[serde(rename = "cis_1.5")]
    Cis15,
    #[serde(rename = "cis_2.0")]
    Cis20,
    #[serde(rename = "aws_foundational")]
    AwsFoundational,
    #[serde(rename = "pci_dss")]
    PciDss,
    #[serde(rename = "hipaa")]
    Hipaa,
    #[serde(rename = "gdpr")]
    Gdpr,
    #[serde(rename = "soc2")]
    Soc2,
}

impl Compliance {
    fn as_str(self) -> &'static str {
        match self {
            Self::Cis14 => "cis_1.4",
            Self::Cis15 => "cis_1.5",
            Self::Cis20 => "cis_2.0",
            Self::AwsFoundational => "aws_foundational",
            Self::PciDss => "pci_dss",
            Self::Hipaa => "hipaa",
            Self::Gdpr => "gdpr",
            Self::Soc2 => "soc2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Azure,
    Gcp,
}

impl Provider {
    fn as_str(self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Gcp => "gcp",
        }
    }
}

/// Parameters for `prowler-aws`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AwsParams {
    /// AWS profile to use
    pub profile: Option<String>,

    /// AWS region (default: all regions)
    pub region: Option<String>,

    /// Specific AWS services to audit (e.g., ec2, s3, iam)
    pub services: Option<Vec<String>>,

    /// Minimum severity to report
    #[serde(default)]
    pub severity: Severity,

    /// Compliance framework to use
    pub compliance: Option<Compliance>,
}

/// Parameters for `prowler-azure`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AzureParams {
    /// Azure subscription ID
    #[serde(rename = "subscriptionId")]
    pub subscription_id: Option<String>,

    /// Specific Azure services to audit
    pub services: Option<Vec<String>>,

    /// Minimum severity to report
    #[serde(default)]
    pub severity: Severity,
}

/// Parameters for `prowler-gcp`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GcpParams {
    /// GCP project ID
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,

    /// Specific GCP services to audit
    pub services: Option<Vec<String>>,

    /// Minimum severity to report
    #[serde(default)]
    pub severity: Severity,
}

/// Parameters for `prowler-list-checks`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListChecksParams {
    /// Cloud provider
    pub provider: Provider,

    /// Filter by service name
    pub service: Option<String>,
}

/// Parameters for `prowler-compliance` and `prowler-services`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ProviderParams {
    /// Cloud provider
    pub provider: Provider,
}

fn service_args(services: Option<&Vec<String>>) -> Vec<String> {
    match services {
        Some(list) if !list.is_empty() => vec!["-s".to_string(), list.join(",")],
        _ => Vec::new(),
    }
}

/// Severity and status tallies over the JSON lines of an assessment, with
/// up to ten failing critical checks. `None` when a line is not valid JSON.
fn assessment_digest(output: &str) -> Option<Value> {
    let findings = output
        .trim()
        .lines()
        .filter(|line| line.starts_with('{'))
        .map(serde_json::from_str::<Value>)
        .collect::<Result<Vec<_>, _>>()
        .ok()?;

    let critical: Vec<Value> = findings
        .iter()
        .filter(|f| {
            f.get("Severity").and_then(Value::as_str) == Some("critical")
                && f.get("Status").and_then(Value::as_str) == Some("FAIL")
        })
        .take(10)
        .map(|f| {
            json!({
                "check": value_at(f, "/CheckID"),
                "service": value_at(f, "/ServiceName"),
                "resource": value_at(f, "/ResourceId"),
                "description": value_at(f, "/StatusExtended"),
            })
        })
        .collect();

    Some(json!({
        "total": findings.len(),
        "by_severity": count_by(findings.iter().map(|f| f.get("Severity").and_then(Value::as_str))),
        "by_status": count_by(findings.iter().map(|f| f.get("Status").and_then(Value::as_str))),
        "critical_findings": critical,
    }))
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct ProwlerTools {
    prowler: ExternalTool,
}

impl ProwlerTools {
    pub const AWS: &'static str = "prowler-aws";
    pub const AZURE: &'static str = "prowler-azure";
    pub const GCP: &'static str = "prowler-gcp";
    pub const LIST_CHECKS: &'static str = "prowler-list-checks";
    pub const COMPLIANCE: &'static str = "prowler-compliance";
    pub const SERVICES: &'static str = "prowler-services";

    pub fn new(binary: PathBuf, runner: Arc<CommandRunner>) -> Self {
        Self::with_tool(ExternalTool::new(binary, SuccessPolicy::AnyOutputOrExitZero, runner))
    }

    pub fn with_tool(prowler: ExternalTool) -> Self {
        Self { prowler }
    }

    async fn run_text(&self, args: Vec<String>) -> Result<CallToolResult, ToolError> {
        let output = self.prowler.run(args).await?;
        Ok(success_result(output.annotate(output.stdout_or_stderr().to_string())))
    }

    #[instrument(skip_all, fields(profile = ?params.profile, region = ?params.region))]
    pub async fn aws(self: Arc<Self>, params: AwsParams) -> Result<CallToolResult, ToolError> {
        let mut args = vec!["aws".to_string(), "-M".to_string(), "json".to_string()];
        if let Some(profile) = &params.profile {
            args.extend(["-p".to_string(), profile.clone()]);
        }
        if let Some(region) = &params.region {
            args.extend(["-f".to_string(), region.clone()]);
        }
        args.extend(service_args(params.services.as_ref()));
        args.extend(params.severity.args());
        if let Some(compliance) = params.compliance {
            args.extend(["-c".to_string(), compliance.as_str().to_string()]);
        }

        let output = self.prowler.run(args).await?;
        let raw = output.stdout_or_stderr();
        let text = match assessment_digest(raw) {
            Some(digest) => pretty_json(&digest),
            None => raw.to_string(),
        };
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(subscription = ?params.subscription_id))]
    pub async fn azure(self: Arc<Self>, params: AzureParams) -> Result<CallToolResult, ToolError> {
        let mut args = vec!["azure".to_string(), "-M".to_string(), "json".to_string()];
        if let Some(id) = &params.subscription_id {
            args.extend(["--subscription-ids".to_string(), id.clone()]);
        }
        args.extend(service_args(params.services.as_ref()));
        args.extend(params.severity.args());
        self.run_text(args).await
    }

    #[instrument(skip_all, fields(project = ?params.project_id))]
    pub async fn gcp(self: Arc<Self>, params: GcpParams) -> Result<CallToolResult, ToolError> {
        let mut args = vec!["gcp".to_string(), "-M".to_string(), "json".to_string()];
        if let Some(id) = &params.project_id {
            args.extend(["--project-ids".to_string(), id.clone()]);
        }
        args.extend(service_args(params.services.as_ref()));
        args.extend(params.severity.args());
        self.run_text(args).await
    }

    pub async fn list_checks(
        self: Arc<Self>,
        params: ListChecksParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = vec![params.provider.as_str().to_string(), "--list-checks".to_string()];
        if let Some(service) = params.service {
            args.extend(["-s".to_string(), service]);
        }
        self.run_text(args).await
    }

    pub async fn compliance(
        self: Arc<Self>,
        params: ProviderParams,
    ) -> Result<CallToolResult, ToolError> {
        self.run_text(vec![
            params.provider.as_str().to_string(),
            "--list-compliance".to_string(),
        ])
        .await
    }

    pub async fn services(
        self: Arc<Self>,
        params: ProviderParams,
    ) -> Result<CallToolResult, ToolError> {
        self.run_text(vec![
            params.provider.as_str().to_string(),
            "--list-services".to_string(),
        ])
        .await
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::AWS,
                "Run AWS security assessment with Prowler",
                this.clone(),
                Self::aws,
            ))
            .with_route(tool_route(
                Self::AZURE,
                "Run Azure security assessment with Prowler",
                this.clone(),
                Self::azure,
            ))
            .with_route(tool_route(
                Self::GCP,
                "Run GCP security assessment with Prowler",
                this.clone(),
                Self::gcp,
            ))
            .with_route(tool_route(
                Self::LIST_CHECKS,
                "List available security checks",
                this.clone(),
                Self::list_checks,
            ))
            .with_route(tool_route(
                Self::COMPLIANCE,
                "List available compliance frameworks",
                this.clone(),
                Self::compliance,
            ))
            .with_route(tool_route(
                Self::SERVICES,
                "List available services for auditing",
                this,
                Self::services,
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process::testing::{echo_args_tool, fake_tool};
    use crate::domains::tools::definitions::common::result_text;

    #[test]
    fn test_assessment_digest() {
        let output = concat!(
            "Prowler 3.11 starting\n",
            r#"{"CheckID":"iam_root_mfa_enabled","ServiceName":"iam","ResourceId":"root","Severity":"critical","Status":"FAIL","StatusExtended":"MFA is not enabled for root account."}"#,
            "\n",
            r#"{"CheckID":"s3_bucket_default_encryption","ServiceName":"s3","ResourceId":"logs","Severity":"medium","Status":"PASS"}"#,
            "\n",
            r#"{"CheckID":"ec2_ebs_public_snapshot","ServiceName":"ec2","Severity":"critical","Status":"PASS"}"#,
        );
        let digest = assessment_digest(output).unwrap();
        assert_eq!(digest["total"], 3);
        assert_eq!(digest["by_severity"]["critical"], 2);
        assert_eq!(digest["by_status"]["FAIL"], 1);
        assert_eq!(digest["critical_findings"].as_array().unwrap().len(), 1);
        assert_eq!(digest["critical_findings"][0]["check"], "iam_root_mfa_enabled");
    }

    #[test]
    fn test_assessment_digest_rejects_broken_json() {
        assert!(assessment_digest("{not json").is_none());
    }

    #[tokio::test]
    async fn test_aws_arguments() {
        let tools = Arc::new(ProwlerTools::with_tool(echo_args_tool(
            SuccessPolicy::AnyOutputOrExitZero,
        )));
        let params: AwsParams = serde_json::from_value(json!({
            "profile": "audit",
            "region": "eu-west-1",
            "services": ["s3", "iam"],
            "severity": "high",
            "compliance": "cis_2.0"
        }))
        .unwrap();
        let result = tools.aws(params).await.unwrap();
        let digest: Value = serde_json::from_str(result_text(&result)).unwrap();
        // No JSON lines in the echoed argv, so the digest is empty.
        assert_eq!(digest["total"], 0);

        let tools = Arc::new(ProwlerTools::with_tool(echo_args_tool(
            SuccessPolicy::AnyOutputOrExitZero,
        )));
        let result = tools
            .list_checks(ListChecksParams {
                provider: Provider::Gcp,
                service: Some("compute".into()),
            })
            .await
            .unwrap();
        assert_eq!(result_text(&result), "gcp\n--list-checks\n-s\ncompute\n");
    }

    #[tokio::test]
    async fn test_azure_falls_back_to_stderr() {
        let tools = Arc::new(ProwlerTools::with_tool(fake_tool(
            "echo 'Listing Azure services' >&2",
            SuccessPolicy::AnyOutputOrExitZero,
        )));
        let result = tools
            .services(ProviderParams {
                provider: Provider::Azure,
            })
            .await
            .unwrap();
        assert_eq!(result_text(&result), "Listing Azure services\n");
    }
}
