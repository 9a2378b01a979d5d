//! The seam between the Nessus tools and whatever answers them.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::catalog::Vulnerability;
use crate::domains::tools::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ScanType {
    /// Standard network vulnerability assessment
    BasicNetworkScan,
    /// Comprehensive web application security assessment
    WebAppScan,
    /// Regulatory compliance assessment
    ComplianceScan,
}

impl ScanType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BasicNetworkScan => "basic-network-scan",
            Self::WebAppScan => "web-app-scan",
            Self::ComplianceScan => "compliance-scan",
        }
    }

    /// Template name on a real Nessus server.
    pub fn template_name(self) -> &'static str {
        match self {
            Self::BasicNetworkScan => "basic",
            Self::WebAppScan => "webapp",
            Self::ComplianceScan => "compliance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Nessus reports severity as 0 (info) to 4 (critical).
    pub fn from_level(level: i64) -> Self {
        match level {
            l if l >= 4 => Self::Critical,
            3 => Self::High,
            2 => Self::Medium,
            1 => Self::Low,
            _ => Self::Info,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Info => "INFO",
        }
    }
}

/// One vulnerability found on a scanned host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub id: String,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub cvss_score: Option<f64>,
    pub affected_systems: Vec<String>,
    pub remediation: Option<String>,
    pub references: Vec<String>,
}

impl From<&Vulnerability> for Finding {
    fn from(vuln: &Vulnerability) -> Self {
        Self {
            id: vuln.id.to_string(),
            name: vuln.name.to_string(),
            description: vuln.description.to_string(),
            severity: vuln.severity,
            cvss_score: Some(vuln.cvss_score),
            affected_systems: vuln.affected_systems.iter().map(|s| s.to_string()).collect(),
            remediation: Some(vuln.remediation.to_string()),
            references: vuln.references.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A finished scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scan_id: String,
    pub scan_type: String,
    pub target: String,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub vulnerabilities: Vec<Finding>,
}

impl ScanReport {
    pub fn count(&self, severity: Severity) -> usize {
        self.vulnerabilities
            .iter()
            .filter(|v| v.severity == severity)
            .count()
    }
}

/// Results are only available once a scan has completed.
#[derive(Debug, Clone)]
pub enum ScanResults {
    Pending { status: String },
    Completed(ScanReport),
}

/// Scan lifecycle operations. Vulnerability lookups always use the bundled
/// catalogue and are not part of the backend.
#[async_trait]
pub trait NessusBackend: Send + Sync {
    /// `{templates: [...]}`
    async fn templates(&self) -> Result<Value, ToolError>;

    /// `{scan_id, status, message}`
    async fn start_scan(&self, target: &str, scan_type: ScanType) -> Result<Value, ToolError>;

    /// `{id, status, target, type, created}`; unknown ids are `NotFound`.
    async fn scan_status(&self, scan_id: &str) -> Result<Value, ToolError>;

    async fn scan_results(&self, scan_id: &str) -> Result<ScanResults, ToolError>;

    /// `{scans: [...]}`
    async fn list_scans(&self) -> Result<Value, ToolError>;

    /// "mock" or "real", for logs.
    fn mode(&self) -> &'static str;
}
