//! Nessus vulnerability scanner adapter.
//!
//! Scan lifecycle calls go to a [`NessusBackend`]: the real REST API when
//! credentials are configured, otherwise an in-process mock. Vulnerability
//! details and keyword search always use the bundled catalogue.

pub mod backend;
pub mod catalog;
pub mod mock;
pub mod rest;

use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};

use mockable::DefaultClock;
use regex::Regex;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

pub use backend::{NessusBackend, ScanReport, ScanResults, ScanType, Severity};
use catalog::Vulnerability;
pub use mock::MockBackend;
pub use rest::RestBackend;

use super::common::{error_result, pretty_json, success_result};
use crate::core::config::NessusCredentials;
use crate::core::http::HttpError;
use crate::domains::tools::ToolError;
use crate::domains::tools::route::{NoParams, tool_route};

static TARGET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{1,3}\.){3}\d{1,3}$|^([a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}$",
    )
    .expect("valid regex")
});

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for `start_scan`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct StartScanParams {
    /// Target IP address or hostname to scan
    pub target: String,

    /// Type of scan to run
    pub scan_type: ScanType,
}

/// Parameters for `get_scan_status` and `get_scan_results`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ScanIdParams {
    /// ID of the scan
    pub scan_id: String,
}

/// Parameters for `get_vulnerability_details`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct VulnerabilityParams {
    /// ID of the vulnerability (e.g., CVE-2021-44228)
    pub vulnerability_id: String,
}

/// Parameters for `search_vulnerabilities`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Keyword to search for in vulnerability names and descriptions
    pub keyword: String,
}

fn validate_target(target: &str) -> Result<&str, ToolError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ToolError::invalid_arguments("Target is required"));
    }
    if !TARGET_PATTERN.is_match(target) {
        return Err(ToolError::invalid_arguments(
            "Target must be a valid IP address or hostname",
        ));
    }
    Ok(target)
}

// ============================================================================
// Report formatting
// ============================================================================

const SEVERITIES: [Severity; 5] = [
    Severity::Critical,
    Severity::High,
    Severity::Medium,
    Severity::Low,
    Severity::Info,
];

fn severity_name(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "Critical",
        Severity::High => "High",
        Severity::Medium => "Medium",
        Severity::Low => "Low",
        Severity::Info => "Info",
    }
}

/// Markdown report; findings ordered critical first.
pub fn format_report(report: &ScanReport) -> String {
    let mut out = format!("# Scan Results for {}\n\n", report.target);
    let _ = writeln!(out, "Scan ID: {}", report.scan_id);
    let _ = writeln!(out, "Scan Type: {}", report.scan_type);
    let _ = writeln!(out, "Start Time: {}", report.start_time);
    let _ = writeln!(out, "End Time: {}", report.end_time);
    let _ = writeln!(out, "Status: {}\n", report.status);

    out.push_str("## Vulnerability Summary\n\n");
    let _ = writeln!(out, "Total Vulnerabilities: {}", report.vulnerabilities.len());
    for severity in SEVERITIES {
        let _ = writeln!(out, "{}: {}", severity_name(severity), report.count(severity));
    }
    out.push_str("\n## Vulnerabilities\n\n");

    let mut findings: Vec<_> = report.vulnerabilities.iter().collect();
    findings.sort_by_key(|f| f.severity);
    for (i, finding) in findings.iter().enumerate() {
        let _ = writeln!(out, "### {}. {} ({})\n", i + 1, finding.name, finding.id);
        let _ = writeln!(out, "Severity: {}", finding.severity.label());
        match finding.cvss_score {
            Some(score) => {
                let _ = writeln!(out, "CVSS Score: {score}\n");
            }
            None => out.push_str("CVSS Score: N/A\n\n"),
        }
        let _ = writeln!(out, "{}\n", finding.description);
        if !finding.affected_systems.is_empty() {
            out.push_str("Affected Systems:\n");
            for system in &finding.affected_systems {
                let _ = writeln!(out, "- {system}");
            }
            out.push('\n');
        }
        if let Some(remediation) = &finding.remediation {
            let _ = writeln!(out, "Remediation: {remediation}\n");
        }
        if !finding.references.is_empty() {
            out.push_str("References:\n");
            for reference in &finding.references {
                let _ = writeln!(out, "- {reference}");
            }
            out.push('\n');
        }
    }
    out
}

fn format_vulnerability(vuln: &Vulnerability) -> String {
    let mut out = format!("# {} ({})\n\n", vuln.name, vuln.id);
    let _ = writeln!(out, "**Severity:** {}", vuln.severity.label());
    let _ = writeln!(out, "**CVSS Score:** {}\n", vuln.cvss_score);
    let _ = writeln!(out, "## Description\n\n{}\n", vuln.description);
    out.push_str("## Affected Systems\n\n");
    for system in vuln.affected_systems {
        let _ = writeln!(out, "- {system}");
    }
    let _ = writeln!(out, "\n## Remediation\n\n{}\n", vuln.remediation);
    out.push_str("## References\n\n");
    for reference in vuln.references {
        let _ = writeln!(out, "- {reference}");
    }
    out.push('\n');
    out
}

fn format_search(keyword: &str, matches: &[&Vulnerability]) -> String {
    if matches.is_empty() {
        return format!("No vulnerabilities found matching \"{keyword}\"");
    }
    let mut out = format!("# Vulnerability Search Results for \"{keyword}\"\n\n");
    let _ = writeln!(out, "Found {} matching vulnerabilities:\n", matches.len());
    for (i, vuln) in matches.iter().enumerate() {
        let _ = writeln!(out, "## {}. {} ({})\n", i + 1, vuln.name, vuln.id);
        let _ = writeln!(out, "**Severity:** {}", vuln.severity.label());
        let _ = writeln!(out, "**CVSS Score:** {}\n", vuln.cvss_score);
        let _ = writeln!(out, "{}\n", vuln.description);
        let _ = writeln!(
            out,
            "To get full details, use the `get_vulnerability_details` tool with vulnerability_id: {}\n",
            vuln.id
        );
    }
    out
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct NessusTools {
    backend: Arc<dyn NessusBackend>,
}

impl NessusTools {
    pub const LIST_SCAN_TEMPLATES: &'static str = "list_scan_templates";
    pub const START_SCAN: &'static str = "start_scan";
    pub const GET_SCAN_STATUS: &'static str = "get_scan_status";
    pub const GET_SCAN_RESULTS: &'static str = "get_scan_results";
    pub const LIST_SCANS: &'static str = "list_scans";
    pub const GET_VULNERABILITY_DETAILS: &'static str = "get_vulnerability_details";
    pub const SEARCH_VULNERABILITIES: &'static str = "search_vulnerabilities";

    /// Real API when credentials are present, mock mode otherwise.
    pub fn new(credentials: Option<&NessusCredentials>) -> Result<Self, HttpError> {
        let backend: Arc<dyn NessusBackend> = match credentials {
            Some(credentials) => Arc::new(RestBackend::new(credentials)?),
            None => Arc::new(MockBackend::new(Arc::new(DefaultClock))),
        };
        info!(mode = backend.mode(), "Nessus backend initialized");
        Ok(Self { backend })
    }

    pub fn with_backend(backend: Arc<dyn NessusBackend>) -> Self {
        Self { backend }
    }

    #[instrument(skip_all)]
    pub async fn list_scan_templates(
        self: Arc<Self>,
        _: NoParams,
    ) -> Result<CallToolResult, ToolError> {
        let templates = self.backend.templates().await?;
        Ok(success_result(pretty_json(&templates)))
    }

    #[instrument(skip_all, fields(target = %params.target, scan_type = params.scan_type.as_str()))]
    pub async fn start_scan(
        self: Arc<Self>,
        params: StartScanParams,
    ) -> Result<CallToolResult, ToolError> {
        let target = validate_target(&params.target)?;
        let started = self.backend.start_scan(target, params.scan_type).await?;
        Ok(success_result(pretty_json(&started)))
    }

    #[instrument(skip_all, fields(scan_id = %params.scan_id))]
    pub async fn get_scan_status(
        self: Arc<Self>,
        params: ScanIdParams,
    ) -> Result<CallToolResult, ToolError> {
        let status = self.backend.scan_status(&params.scan_id).await?;
        Ok(success_result(pretty_json(&status)))
    }

    #[instrument(skip_all, fields(scan_id = %params.scan_id))]
    pub async fn get_scan_results(
        self: Arc<Self>,
        params: ScanIdParams,
    ) -> Result<CallToolResult, ToolError> {
        match self.backend.scan_results(&params.scan_id).await? {
            ScanResults::Completed(report) => Ok(success_result(format_report(&report))),
            ScanResults::Pending { status } => Ok(error_result(&pretty_json(&json!({
                "error": "Scan results not available",
                "status": status,
            })))),
        }
    }

    #[instrument(skip_all)]
    pub async fn list_scans(self: Arc<Self>, _: NoParams) -> Result<CallToolResult, ToolError> {
        let scans = self.backend.list_scans().await?;
        Ok(success_result(pretty_json(&scans)))
    }

    #[instrument(skip_all, fields(id = %params.vulnerability_id))]
    pub async fn get_vulnerability_details(
        self: Arc<Self>,
        params: VulnerabilityParams,
    ) -> Result<CallToolResult, ToolError> {
        let vuln = catalog::find(&params.vulnerability_id).ok_or_else(|| {
            ToolError::not_found(format!("Vulnerability not found: {}", params.vulnerability_id))
        })?;
        Ok(success_result(format_vulnerability(vuln)))
    }

    #[instrument(skip_all, fields(keyword = %params.keyword))]
    pub async fn search_vulnerabilities(
        self: Arc<Self>,
        params: SearchParams,
    ) -> Result<CallToolResult, ToolError> {
        let keyword = params.keyword.trim();
        if keyword.is_empty() {
            return Err(ToolError::invalid_arguments("keyword must not be empty"));
        }
        Ok(success_result(format_search(keyword, &catalog::search(keyword))))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::LIST_SCAN_TEMPLATES,
                "List available Nessus scan templates",
                this.clone(),
                Self::list_scan_templates,
            ))
            .with_route(tool_route(
                Self::START_SCAN,
                "Start a new vulnerability scan against a target",
                this.clone(),
                Self::start_scan,
            ))
            .with_route(tool_route(
                Self::GET_SCAN_STATUS,
                "Check the status of a running scan",
                this.clone(),
                Self::get_scan_status,
            ))
            .with_route(tool_route(
                Self::GET_SCAN_RESULTS,
                "Get the results of a completed scan",
                this.clone(),
                Self::get_scan_results,
            ))
            .with_route(tool_route(
                Self::LIST_SCANS,
                "List all scans and their status",
                this.clone(),
                Self::list_scans,
            ))
            .with_route(tool_route(
                Self::GET_VULNERABILITY_DETAILS,
                "Get detailed information about a specific vulnerability",
                this.clone(),
                Self::get_vulnerability_details,
            ))
            .with_route(tool_route(
                Self::SEARCH_VULNERABILITIES,
                "Search for vulnerabilities by keyword",
                this,
                Self::search_vulnerabilities,
            ))
    }
}
