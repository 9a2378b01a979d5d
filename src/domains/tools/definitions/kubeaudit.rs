//! kubeaudit adapter: Kubernetes workload security audits.
//!
//! Each auditor is a kubeaudit subcommand; all operations share the
//! namespace selection (`-n NS`, or `-A` for every namespace).

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::instrument;

use super::common::success_result;
use crate::core::process::{CommandRunner, ExternalTool, SuccessPolicy};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::{NoParams, tool_route};

// ============================================================================
// Tool Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Pretty,
    Json,
    Logrus,
}

impl Format {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
            Self::Logrus => "logrus",
        }
    }
}

/// pretty or json; logrus is only offered by `kubeaudit-all`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Pretty,
    Json,
}

impl From<ReportFormat> for Format {
    fn from(format: ReportFormat) -> Self {
        match format {
            ReportFormat::Pretty => Format::Pretty,
            ReportFormat::Json => Format::Json,
        }
    }
}

/// Parameters for `kubeaudit-all`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AllParams {
    /// Specific namespace to audit (default: all namespaces)
    pub namespace: Option<String>,

    /// Output format
    #[serde(default)]
    pub format: Format,

    /// Path to kubeconfig file
    pub kubeconfig: Option<String>,
}

/// Parameters for `kubeaudit-privileged`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PrivilegedParams {
    /// Namespace to audit
    pub namespace: Option<String>,

    /// Output format
    #[serde(default)]
    pub format: ReportFormat,
}

/// Parameters for the single-auditor checks.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct NamespaceParams {
    /// Namespace to audit
    pub namespace: Option<String>,
}

/// Parameters for `kubeaudit-manifest`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ManifestParams {
    /// Path to YAML manifest file or directory
    #[serde(rename = "manifestPath")]
    pub manifest_path: String,

    /// Output format
    #[serde(default)]
    pub format: ReportFormat,
}

fn auditor_args(auditor: &str, format: Format, namespace: Option<&str>) -> Vec<String> {
    let mut args = vec![
        auditor.to_string(),
        "-f".to_string(),
        format.as_str().to_string(),
    ];
    match namespace {
        Some(ns) => args.extend(["-n".to_string(), ns.to_string()]),
        None => args.push("-A".to_string()),
    }
    args
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct KubeauditTools {
    kubeaudit: ExternalTool,
}

impl KubeauditTools {
    pub const ALL: &'static str = "kubeaudit-all";
    pub const PRIVILEGED: &'static str = "kubeaudit-privileged";
    pub const ROOTFS: &'static str = "kubeaudit-rootfs";
    pub const CAPABILITIES: &'static str = "kubeaudit-capabilities";
    pub const LIMITS: &'static str = "kubeaudit-limits";
    pub const NONROOT: &'static str = "kubeaudit-nonroot";
    pub const HOSTNS: &'static str = "kubeaudit-hostns";
    pub const IMAGE: &'static str = "kubeaudit-image";
    pub const MANIFEST: &'static str = "kubeaudit-manifest";
    pub const CHECKS: &'static str = "kubeaudit-checks";

    pub fn new(binary: PathBuf, runner: Arc<CommandRunner>) -> Self {
        Self::with_tool(ExternalTool::new(binary, SuccessPolicy::always(), runner))
    }

    pub fn with_tool(kubeaudit: ExternalTool) -> Self {
        Self { kubeaudit }
    }

    async fn audit(&self, header: &str, args: Vec<String>) -> Result<CallToolResult, ToolError> {
        let output = self.kubeaudit.run(args).await?;
        let text = format!("{}\n\n{}", header, output.combined());
        Ok(success_result(output.annotate(text)))
    }

    /// One auditor in pretty format.
    async fn single(
        &self,
        auditor: &str,
        header: &str,
        params: NamespaceParams,
    ) -> Result<CallToolResult, ToolError> {
        let args = auditor_args(auditor, Format::Pretty, params.namespace.as_deref());
        self.audit(header, args).await
    }

    #[instrument(skip_all, fields(namespace = ?params.namespace))]
    pub async fn all(self: Arc<Self>, params: AllParams) -> Result<CallToolResult, ToolError> {
        let mut args = auditor_args("all", params.format, params.namespace.as_deref());
        if let Some(kubeconfig) = params.kubeconfig {
            args.extend(["--kubeconfig".to_string(), kubeconfig]);
        }
        let header = format!(
            "Kubeaudit Full Security Scan:\nNamespace: {}",
            params.namespace.as_deref().unwrap_or("all")
        );
        self.audit(&header, args).await
    }

    #[instrument(skip_all, fields(namespace = ?params.namespace))]
    pub async fn privileged(
        self: Arc<Self>,
        params: PrivilegedParams,
    ) -> Result<CallToolResult, ToolError> {
        let args = auditor_args(
            "privileged",
            params.format.into(),
            params.namespace.as_deref(),
        );
        self.audit("Privileged Container Check:", args).await
    }

    pub async fn rootfs(
        self: Arc<Self>,
        params: NamespaceParams,
    ) -> Result<CallToolResult, ToolError> {
        self.single("rootfs", "Read-Only Root Filesystem Check:", params)
            .await
    }

    pub async fn capabilities(
        self: Arc<Self>,
        params: NamespaceParams,
    ) -> Result<CallToolResult, ToolError> {
        self.single("capabilities", "Capabilities Check:", params).await
    }

    pub async fn limits(
        self: Arc<Self>,
        params: NamespaceParams,
    ) -> Result<CallToolResult, ToolError> {
        self.single("limits", "Resource Limits Check:", params).await
    }

    pub async fn nonroot(
        self: Arc<Self>,
        params: NamespaceParams,
    ) -> Result<CallToolResult, ToolError> {
        self.single("nonroot", "Non-Root User Check:", params).await
    }

    pub async fn hostns(
        self: Arc<Self>,
        params: NamespaceParams,
    ) -> Result<CallToolResult, ToolError> {
        self.single("hostns", "Host Namespace Check:", params).await
    }

    pub async fn image(
        self: Arc<Self>,
        params: NamespaceParams,
    ) -> Result<CallToolResult, ToolError> {
        self.single("image", "Image Security Check:", params).await
    }

    #[instrument(skip_all, fields(manifest = %params.manifest_path))]
    pub async fn manifest(
        self: Arc<Self>,
        params: ManifestParams,
    ) -> Result<CallToolResult, ToolError> {
        let format: Format = params.format.into();
        let args = vec![
            "all".to_string(),
            "-f".to_string(),
            format.as_str().to_string(),
            "--manifest".to_string(),
            params.manifest_path.clone(),
        ];
        let header = format!("Manifest Audit:\nFile: {}", params.manifest_path);
        self.audit(&header, args).await
    }

    pub async fn checks(self: Arc<Self>, _params: NoParams) -> Result<CallToolResult, ToolError> {
        Ok(success_result(CHECKS_TEXT.to_string()))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::ALL,
                "Run all kubeaudit security checks on a cluster",
                this.clone(),
                Self::all,
            ))
            .with_route(tool_route(
                Self::PRIVILEGED,
                "Check for privileged containers",
                this.clone(),
                Self::privileged,
            ))
            .with_route(tool_route(
                Self::ROOTFS,
                "Check for containers without read-only root filesystem",
                this.clone(),
                Self::rootfs,
            ))
            .with_route(tool_route(
                Self::CAPABILITIES,
                "Check for containers with dangerous capabilities",
                this.clone(),
                Self::capabilities,
            ))
            .with_route(tool_route(
                Self::LIMITS,
                "Check for containers without resource limits",
                this.clone(),
                Self::limits,
            ))
            .with_route(tool_route(
                Self::NONROOT,
                "Check for containers running as root",
                this.clone(),
                Self::nonroot,
            ))
            .with_route(tool_route(
                Self::HOSTNS,
                "Check for containers with host namespace access",
                this.clone(),
                Self::hostns,
            ))
            .with_route(tool_route(
                Self::IMAGE,
                "Check for image security issues (tags, registry)",
                this.clone(),
                Self::image,
            ))
            .with_route(tool_route(
                Self::MANIFEST,
                "Audit Kubernetes manifest files before deployment",
                this.clone(),
                Self::manifest,
            ))
            .with_route(tool_route(
                Self::CHECKS,
                "List all available kubeaudit security checks",
                this,
                Self::checks,
            ))
    }
}

const CHECKS_TEXT: &str = "Kubeaudit Security Checks:

CONTAINER SECURITY:
  privileged      - Containers running in privileged mode
  rootfs          - Containers without read-only root filesystem
  nonroot         - Containers running as root user
  runAsNonRoot    - Missing runAsNonRoot security context

CAPABILITIES:
  capabilities    - Containers with dangerous capabilities
  allowPrivilegeEscalation - Privilege escalation allowed

RESOURCE LIMITS:
  limits          - Containers without CPU/memory limits

HOST ISOLATION:
  hostns          - Containers with hostPID, hostIPC, or hostNetwork
  hostpath        - Containers with host path mounts

IMAGE SECURITY:
  image           - Missing image tags (using :latest)
  imagePullPolicy - Not using Always pull policy

SERVICE ACCOUNTS:
  asat            - Auto-mounted service account tokens

NETWORK:
  netpols         - Missing network policies

MISCELLANEOUS:
  seccomp         - Missing Seccomp profiles
  apparmor        - Missing AppArmor profiles

SEVERITY LEVELS:
  error   - High severity, immediate action required
  warning - Medium severity, should be addressed
  info    - Low severity, best practice recommendations

Usage Examples:
  kubeaudit all -n production              # Audit production namespace
  kubeaudit privileged -A                  # Check all privileged pods
  kubeaudit all --manifest ./deployment.yaml  # Audit manifest file";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process::testing::{echo_args_tool, fake_tool};
    use crate::domains::tools::definitions::common::result_text;

    fn echo_tools() -> Arc<KubeauditTools> {
        Arc::new(KubeauditTools::with_tool(echo_args_tool(SuccessPolicy::always())))
    }

    #[test]
    fn test_namespace_selection() {
        assert_eq!(
            auditor_args("limits", Format::Pretty, None),
            vec!["limits", "-f", "pretty", "-A"]
        );
        assert_eq!(
            auditor_args("limits", Format::Json, Some("prod")),
            vec!["limits", "-f", "json", "-n", "prod"]
        );
    }

    #[tokio::test]
    async fn test_all_header_and_kubeconfig() {
        let result = echo_tools()
            .all(AllParams {
                namespace: None,
                format: Format::Logrus,
                kubeconfig: Some("/home/ops/.kube/config".into()),
            })
            .await
            .unwrap();
        assert_eq!(
            result_text(&result),
            "Kubeaudit Full Security Scan:\nNamespace: all\n\nall\n-f\nlogrus\n-A\n--kubeconfig\n/home/ops/.kube/config\n"
        );
    }

    #[tokio::test]
    async fn test_manifest_arguments() {
        let result = echo_tools()
            .manifest(ManifestParams {
                manifest_path: "./deploy.yaml".into(),
                format: ReportFormat::Json,
            })
            .await
            .unwrap();
        assert_eq!(
            result_text(&result),
            "Manifest Audit:\nFile: ./deploy.yaml\n\nall\n-f\njson\n--manifest\n./deploy.yaml\n"
        );
    }

    #[tokio::test]
    async fn test_findings_exit_code_is_accepted() {
        let tools = Arc::new(KubeauditTools::with_tool(fake_tool(
            "echo 'ERRO PrivilegedTrue container=nginx'; exit 2",
            SuccessPolicy::always(),
        )));
        let result = tools
            .privileged(PrivilegedParams {
                namespace: Some("default".into()),
                format: ReportFormat::Pretty,
            })
            .await
            .unwrap();
        assert_eq!(
            result_text(&result),
            "Privileged Container Check:\n\nERRO PrivilegedTrue container=nginx\n"
        );
    }

    #[test]
    fn test_logrus_only_for_all() {
        let logrus = serde_json::json!({"format": "logrus"});
        assert!(serde_json::from_value::<PrivilegedParams>(logrus.clone()).is_err());
        assert!(serde_json::from_value::<AllParams>(logrus).is_ok());
    }
}
