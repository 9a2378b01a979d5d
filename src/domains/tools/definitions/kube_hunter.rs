//! kube-hunter adapter: hunting for weaknesses in Kubernetes clusters.
//!
//! kube-hunter is often installed as a Python module, so the adapter takes a
//! whole command line (`python3 -m kube_hunter`) rather than a single binary.

use std::sync::Arc;
use std::time::Duration;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use super::common::{pretty_json, success_result};
use crate::core::process::{CommandRunner, ExternalTool, SuccessPolicy};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::{NoParams, tool_route};

const SCAN_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const NETWORK_SCAN_TIMEOUT: Duration = Duration::from_secs(15 * 60);

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for `kubehunter-remote`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RemoteParams {
    /// Remote target IP, hostname, or CIDR range
    pub target: String,

    /// Enable network interface scanning
    #[serde(default)]
    pub interface: bool,

    /// Quick scan (skip some checks)
    #[serde(default)]
    pub quick: bool,

    /// CIDR range to scan (e.g., '10.0.0.0/24')
    pub cidr: Option<String>,

    /// Enable active hunting (may affect cluster)
    #[serde(default)]
    pub active: bool,
}

/// Parameters for `kubehunter-pod`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PodParams {
    /// Enable active hunting
    #[serde(default)]
    pub active: bool,

    /// Quick scan mode
    #[serde(default)]
    pub quick: bool,
}

/// Parameters for `kubehunter-json`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct JsonParams {
    /// Remote target (omit for internal scan)
    pub target: Option<String>,

    /// Enable active hunting
    #[serde(default)]
    pub active: bool,
}

/// Parameters for `kubehunter-network`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct NetworkParams {
    /// CIDR range to scan (e.g., '192.168.1.0/24')
    pub cidr: String,

    /// Enable active hunting
    #[serde(default)]
    pub active: bool,
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct KubeHunterTools {
    kube_hunter: ExternalTool,
}

impl KubeHunterTools {
    pub const REMOTE: &'static str = "kubehunter-remote";
    pub const POD: &'static str = "kubehunter-pod";
    pub const JSON: &'static str = "kubehunter-json";
    pub const NETWORK: &'static str = "kubehunter-network";
    pub const VULNERABILITIES: &'static str = "kubehunter-vulnerabilities";

    /// `command` is split on whitespace into the program and leading arguments.
    pub fn new(command: &str, runner: Arc<CommandRunner>) -> Self {
        Self::with_tool(ExternalTool::from_command_line(
            command,
            SuccessPolicy::always(),
            runner,
        ))
    }

    pub fn with_tool(kube_hunter: ExternalTool) -> Self {
        Self {
            kube_hunter: kube_hunter.with_timeout(SCAN_TIMEOUT),
        }
    }

    #[instrument(skip_all, fields(target = %params.target, active = params.active))]
    pub async fn remote(
        self: Arc<Self>,
        params: RemoteParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = vec!["--remote".to_string(), params.target.clone()];
        if params.interface {
            args.push("--interface".to_string());
        }
        if params.quick {
            args.push("--quick".to_string());
        }
        if params.active {
            args.push("--active".to_string());
        }
        if let Some(cidr) = params.cidr {
            args.extend(["--cidr".to_string(), cidr]);
        }
        args.extend(["--report".to_string(), "plain".to_string()]);

        let output = self.kube_hunter.run(args).await?;
        let text = format!(
            "Kube-Hunter Remote Scan Results:\nTarget: {}\nActive Mode: {}\n\n{}",
            params.target,
            params.active,
            output.combined()
        );
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(active = params.active))]
    pub async fn pod(self: Arc<Self>, params: PodParams) -> Result<CallToolResult, ToolError> {
        let mut args = vec!["--pod".to_string()];
        if params.active {
            args.push("--active".to_string());
        }
        if params.quick {
            args.push("--quick".to_string());
        }
        args.extend(["--report".to_string(), "plain".to_string()]);

        let output = self.kube_hunter.run(args).await?;
        let text = format!("Kube-Hunter Internal Pod Scan:\n\n{}", output.combined());
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(target = ?params.target, active = params.active))]
    pub async fn json(self: Arc<Self>, params: JsonParams) -> Result<CallToolResult, ToolError> {
        let mut args = match params.target {
            Some(target) => vec!["--remote".to_string(), target],
            None => vec!["--pod".to_string()],
        };
        if params.active {
            args.push("--active".to_string());
        }
        args.extend(["--report".to_string(), "json".to_string()]);

        let output = self.kube_hunter.run(args).await?;
        let text = match serde_json::from_str::<Value>(output.stdout.trim()) {
            Ok(report) => pretty_json(&report),
            Err(_) => output.combined(),
        };
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(cidr = %params.cidr, active = params.active))]
    pub async fn network(
        self: Arc<Self>,
        params: NetworkParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = vec!["--cidr".to_string(), params.cidr.clone()];
        if params.active {
            args.push("--active".to_string());
        }
        args.extend(["--report".to_string(), "plain".to_string()]);

        let spec = self.kube_hunter.command(args).timeout(NETWORK_SCAN_TIMEOUT);
        let output = self.kube_hunter.run_spec(spec).await?;
        let text = format!(
            "Kube-Hunter Network Scan:\nCIDR: {}\n\n{}",
            params.cidr,
            output.combined()
        );
        Ok(success_result(output.annotate(text)))
    }

    pub async fn vulnerabilities(
        self: Arc<Self>,
        _params: NoParams,
    ) -> Result<CallToolResult, ToolError> {
        Ok(success_result(VULNERABILITIES_TEXT.to_string()))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::REMOTE,
                "Hunt for security weaknesses in remote Kubernetes clusters",
                this.clone(),
                Self::remote,
            ))
            .with_route(tool_route(
                Self::POD,
                "Run kube-hunter from within a pod (internal scan)",
                this.clone(),
                Self::pod,
            ))
            .with_route(tool_route(
                Self::JSON,
                "Run scan and return results in JSON format",
                this.clone(),
                Self::json,
            ))
            .with_route(tool_route(
                Self::NETWORK,
                "Scan internal network for Kubernetes API servers",
                this.clone(),
                Self::network,
            ))
            .with_route(tool_route(
                Self::VULNERABILITIES,
                "List known Kubernetes vulnerabilities that kube-hunter checks",
                this,
                Self::vulnerabilities,
            ))
    }
}

const VULNERABILITIES_TEXT: &str = "Kube-Hunter Vulnerability Checks:

DISCOVERY:
  - API Server Detection
  - Kubelet API Detection
  - etcd Detection
  - Dashboard Detection
  - Proxy Detection

INFORMATION DISCLOSURE:
  - Anonymous API Access
  - Exposed Sensitive Endpoints
  - Instance Metadata Access
  - Server Version Disclosure
  - Exposed Pods Information
  - Service Account Token Exposure

REMOTE CODE EXECUTION:
  - Kubelet RCE via /exec endpoint
  - Privileged Container Escape
  - Host Path Mount Exploitation
  - CVE-2018-1002105 (API Server)
  - CVE-2019-11247 (API Server)
  - CVE-2019-11249 (kubectl cp)

ACCESS CONTROL:
  - Anonymous Authentication Enabled
  - Insecure Port Enabled
  - No Network Policies
  - Default Service Account Used
  - Privileged Pods Allowed
  - hostPID/hostNetwork Allowed

CREDENTIAL EXPOSURE:
  - Exposed Kubeconfig
  - Service Account Tokens
  - Secrets in Environment Variables
  - Cloud Provider Credentials

DENIAL OF SERVICE:
  - Resource Exhaustion
  - etcd DoS

SCAN MODES:
  - Passive: Safe information gathering (default)
  - Active: Attempts exploitation (--active flag)

Best Practices:
  - Run from inside a pod for internal threats
  - Run remotely for external attack surface
  - Use --active only in test environments";
