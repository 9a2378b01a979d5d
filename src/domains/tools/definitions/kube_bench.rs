//! kube-bench adapter: CIS Kubernetes Benchmark checks.
//!
//! kube-bench exits non-zero when checks fail; every exit status is accepted
//! and results are stdout followed by stderr.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use super::common::{array_at, pretty_json, success_result};
use crate::core::process::{CommandRunner, ExternalTool, ProcessOutput, SuccessPolicy};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::{NoParams, tool_route};

// ============================================================================
// Tool Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Master,
    Node,
    Etcd,
    Policies,
    Controlplane,
    Managedservices,
}

impl Target {
    fn as_str(self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Node => "node",
            Self::Etcd => "etcd",
            Self::Policies => "policies",
            Self::Controlplane => "controlplane",
            Self::Managedservices => "managedservices",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Junit,
    Asff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ManagedProvider {
    Eks,
    Gke,
    Aks,
    Ack,
}

impl ManagedProvider {
    fn benchmark(self) -> &'static str {
        match self {
            Self::Eks => "eks-1.0",
            Self::Gke => "gke-1.0",
            Self::Aks => "aks-1.0",
            Self::Ack => "ack-1.0",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Eks => "EKS",
            Self::Gke => "GKE",
            Self::Aks => "AKS",
            Self::Ack => "ACK",
        }
    }
}

/// Parameters for `kubebench-run`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RunParams {
    /// Specific target to check (default: auto-detect)
    pub target: Option<Target>,

    /// Specific benchmark version (e.g., 'cis-1.6', 'gke-1.0')
    pub benchmark: Option<String>,

    /// Run specific check by ID (e.g., '1.1.1')
    #[serde(rename = "checkId")]
    pub check_id: Option<String>,

    /// Output format (default: plain text). kube-bench only emits JSON
    /// besides plain text, so any value selects `--json`.
    pub format: Option<OutputFormat>,
}

/// Parameters for `kubebench-master` and `kubebench-node`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct BenchmarkParams {
    /// Specific benchmark version
    pub benchmark: Option<String>,
}

/// Parameters for `kubebench-json`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct JsonParams {
    /// Specific target to check
    pub target: Option<Target>,
}

/// Parameters for `kubebench-managed`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ManagedParams {
    /// Cloud provider
    pub provider: ManagedProvider,
}

// ============================================================================
// Report digests
// ============================================================================

#[derive(Debug, Default, PartialEq, Eq)]
struct Tally {
    pass: usize,
    fail: usize,
    warn: usize,
    info: usize,
}

impl Tally {
    fn total(&self) -> usize {
        self.pass + self.fail + self.warn + self.info
    }

    /// Pass percentage with one decimal, "0" when nothing ran.
    fn pass_rate(&self) -> String {
        match self.total() {
            0 => "0".to_string(),
            total => format!("{:.1}", self.pass as f64 / total as f64 * 100.0),
        }
    }
}

fn tally(report: &Value) -> Tally {
    let mut tally = Tally::default();
    for control in array_at(report, "/Controls") {
        for test in array_at(control, "/tests") {
            for result in array_at(test, "/results") {
                match result.get("status").and_then(Value::as_str) {
                    Some("PASS") => tally.pass += 1,
                    Some("FAIL") => tally.fail += 1,
                    Some("WARN") => tally.warn += 1,
                    Some("INFO") => tally.info += 1,
                    _ => {}
                }
            }
        }
    }
    tally
}

fn format_summary(tally: &Tally) -> String {
    let rate = tally.pass_rate();
    format!(
        "CIS Benchmark Summary:\n\nTotal Checks: {}\n✅ PASS: {} ({}%)\n❌ FAIL: {}\n⚠️  WARN: {}\nℹ️  INFO: {}\n\nCompliance Rate: {}%",
        tally.total(),
        tally.pass,
        rate,
        tally.fail,
        tally.warn,
        tally.info,
        rate
    )
}

/// The JSON report on stdout, if kube-bench produced one.
fn json_report(output: &ProcessOutput) -> Option<Value> {
    serde_json::from_str(output.stdout.trim()).ok()
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct KubeBenchTools {
    kube_bench: ExternalTool,
}

impl KubeBenchTools {
    pub const RUN: &'static str = "kubebench-run";
    pub const MASTER: &'static str = "kubebench-master";
    pub const NODE: &'static str = "kubebench-node";
    pub const ETCD: &'static str = "kubebench-etcd";
    pub const POLICIES: &'static str = "kubebench-policies";
    pub const JSON: &'static str = "kubebench-json";
    pub const MANAGED: &'static str = "kubebench-managed";
    pub const SUMMARY: &'static str = "kubebench-summary";
    pub const CHECKS: &'static str = "kubebench-checks";

    pub fn new(binary: PathBuf, runner: Arc<CommandRunner>) -> Self {
        Self::with_tool(ExternalTool::new(binary, SuccessPolicy::always(), runner))
    }

    pub fn with_tool(kube_bench: ExternalTool) -> Self {
        Self { kube_bench }
    }

    /// Run with `args` and prefix the combined output with `header`.
    async fn run_with_header(
        &self,
        header: String,
        args: Vec<String>,
    ) -> Result<CallToolResult, ToolError> {
        let output = self.kube_bench.run(args).await?;
        let text = format!("{}\n\n{}", header, output.combined());
        Ok(success_result(output.annotate(text)))
    }

    fn target_args(target: &str, benchmark: Option<String>) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--targets".to_string(), target.to_string()];
        if let Some(benchmark) = benchmark {
            args.extend(["--benchmark".to_string(), benchmark]);
        }
        args
    }

    #[instrument(skip_all, fields(target = ?params.target))]
    pub async fn run(self: Arc<Self>, params: RunParams) -> Result<CallToolResult, ToolError> {
        let mut args = vec!["run".to_string()];
        if let Some(target) = params.target {
            args.extend(["--targets".to_string(), target.as_str().to_string()]);
        }
        if let Some(benchmark) = params.benchmark {
            args.extend(["--benchmark".to_string(), benchmark]);
        }
        if let Some(check) = params.check_id {
            args.extend(["--check".to_string(), check]);
        }
        if params.format.is_some() {
            args.push("--json".to_string());
        }

        let target = params.target.map_or("auto-detect", Target::as_str);
        self.run_with_header(
            format!("Kube-Bench CIS Benchmark Results:\nTarget: {target}"),
            args,
        )
        .await
    }

    pub async fn master(
        self: Arc<Self>,
        params: BenchmarkParams,
    ) -> Result<CallToolResult, ToolError> {
        self.run_with_header(
            "Master Node CIS Benchmark:".to_string(),
            Self::target_args("master", params.benchmark),
        )
        .await
    }

    pub async fn node(
        self: Arc<Self>,
        params: BenchmarkParams,
    ) -> Result<CallToolResult, ToolError> {
        self.run_with_header(
            "Worker Node CIS Benchmark:".to_string(),
            Self::target_args("node", params.benchmark),
        )
        .await
    }

    pub async fn etcd(self: Arc<Self>, _params: NoParams) -> Result<CallToolResult, ToolError> {
        self.run_with_header(
            "etcd CIS Benchmark:".to_string(),
            Self::target_args("etcd", None),
        )
        .await
    }

    pub async fn policies(self: Arc<Self>, _params: NoParams) -> Result<CallToolResult, ToolError> {
        self.run_with_header(
            "Kubernetes Policies CIS Benchmark:".to_string(),
            Self::target_args("policies", None),
        )
        .await
    }

    #[instrument(skip_all, fields(target = ?params.target))]
    pub async fn json(self: Arc<Self>, params: JsonParams) -> Result<CallToolResult, ToolError> {
        let mut args = vec!["run".to_string(), "--json".to_string()];
        if let Some(target) = params.target {
            args.extend(["--targets".to_string(), target.as_str().to_string()]);
        }

        let output = self.kube_bench.run(args).await?;
        let text = match json_report(&output) {
            Some(report) => pretty_json(&report),
            None => output.combined(),
        };
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(provider = ?params.provider))]
    pub async fn managed(
        self: Arc<Self>,
        params: ManagedParams,
    ) -> Result<CallToolResult, ToolError> {
        let args = vec![
            "run".to_string(),
            "--benchmark".to_string(),
            params.provider.benchmark().to_string(),
        ];
        self.run_with_header(
            format!("{} Managed Kubernetes Benchmark:", params.provider.label()),
            args,
        )
        .await
    }

    pub async fn summary(self: Arc<Self>, _params: NoParams) -> Result<CallToolResult, ToolError> {
        let output = self
            .kube_bench
            .run(["run".to_string(), "--json".to_string()])
            .await?;
        let text = match json_report(&output) {
            Some(report) => format_summary(&tally(&report)),
            None => output.combined(),
        };
        Ok(success_result(output.annotate(text)))
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
                Self::RUN,
                "Run CIS Kubernetes Benchmark checks",
                this.clone(),
                Self::run,
            ))
            .with_route(tool_route(
                Self::MASTER,
                "Run CIS benchmark checks for master/control plane node",
                this.clone(),
                Self::master,
            ))
            .with_route(tool_route(
                Self::NODE,
                "Run CIS benchmark checks for worker node",
                this.clone(),
                Self::node,
            ))
            .with_route(tool_route(
                Self::ETCD,
                "Run CIS benchmark checks for etcd",
                this.clone(),
                Self::etcd,
            ))
            .with_route(tool_route(
                Self::POLICIES,
                "Run CIS benchmark policy checks",
                this.clone(),
                Self::policies,
            ))
            .with_route(tool_route(
                Self::JSON,
                "Run benchmark and return JSON results",
                this.clone(),
                Self::json,
            ))
            .with_route(tool_route(
                Self::MANAGED,
                "Run benchmarks for managed Kubernetes services (EKS, GKE, AKS)",
                this.clone(),
                Self::managed,
            ))
            .with_route(tool_route(
                Self::SUMMARY,
                "Get summary of CIS benchmark compliance",
                this.clone(),
                Self::summary,
            ))
            .with_route(tool_route(
                Self::CHECKS,
                "List CIS benchmark check categories",
                this,
                Self::checks,
            ))
    }
}

const CHECKS_TEXT: &str = "CIS Kubernetes Benchmark Check Categories:

1. CONTROL PLANE COMPONENTS
  1.1 Master Node Configuration Files
  1.2 API Server
  1.3 Controller Manager
  1.4 Scheduler

2. ETCD NODE CONFIGURATION
  2.1 etcd Configuration Files
  2.2 etcd Server
  2.3 etcd Client

3. CONTROL PLANE CONFIGURATION
  3.1 Authentication and Authorization
  3.2 Logging

4. WORKER NODE SECURITY
  4.1 Worker Node Configuration Files
  4.2 Kubelet

5. POLICIES
  5.1 RBAC and Service Accounts
  5.2 Pod Security Policies/Standards
  5.3 Network Policies
  5.4 Secrets Management
  5.5 Extensible Admission Control
  5.6 General Policies

BENCHMARK VERSIONS:
  cis-1.6      - CIS Kubernetes Benchmark v1.6.0
  cis-1.7      - CIS Kubernetes Benchmark v1.7.0
  cis-1.8      - CIS Kubernetes Benchmark v1.8.0
  eks-1.0      - CIS Amazon EKS Benchmark
  gke-1.0      - CIS Google GKE Benchmark
  aks-1.0      - CIS Azure AKS Benchmark
  rh-0.7       - Red Hat OpenShift

RESULT STATES:
  [PASS] - Check passed
  [FAIL] - Check failed (action required)
  [WARN] - Manual verification needed
  [INFO] - Informational only";
