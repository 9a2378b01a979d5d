//! Acunetix web vulnerability scanner adapter (`{ACUNETIX_URL}/api/v1`).
//!
//! Appliances commonly run with self-signed certificates, so certificate
//! validation is off for this client.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, instrument};

use super::common::{array_at, pretty_json, require_http_url, str_at, success_result, value_at};
use crate::core::http::{ApiAuth, ApiClient, HttpError};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::tool_route;

const DEFAULT_PROFILE: &str = "Full Scan";

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for `start-scan`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct StartScanParams {
    /// Target URL to scan (e.g., https://example.com)
    pub target_url: String,

    /// Optional scanning profile ID (default: Full Scan)
    pub profile_id: Option<String>,

    /// Optional scan description
    pub description: Option<String>,
}

/// Parameters for `get-scan-status`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ScanStatusParams {
    /// Scan ID to check status
    pub scan_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        }
    }
}

/// Parameters for `get-scan-results`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ScanResultsParams {
    /// Scan ID to retrieve results
    pub scan_id: String,

    /// Filter vulnerabilities by severity
    pub severity: Option<Severity>,
}

fn default_limit() -> usize {
    10
}

/// Parameters for `list-targets`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListTargetsParams {
    /// Maximum number of targets to return
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Parameters for `list-scans`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListScansParams {
    /// Optional target ID to filter scans
    pub target_id: Option<String>,

    /// Maximum number of scans to return
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Parameters for `get-vulnerability`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct VulnerabilityParams {
    /// Vulnerability ID
    pub vuln_id: String,

    /// Target ID
    pub target_id: String,
}

// ============================================================================
// Report digests
// ============================================================================

fn session_at(scan: &Value, field: &str) -> Value {
    value_at(scan, &format!("/current_session/{field}"))
}

fn scan_digest(scan: &Value) -> Value {
    json!({
        "scan_id": value_at(scan, "/scan_id"),
        "target_id": value_at(scan, "/target_id"),
        "profile_name": value_at(scan, "/profile_name"),
        "status": session_at(scan, "status"),
        "severity_counts": session_at(scan, "severity_counts"),
        "start_date": session_at(scan, "start_date"),
        "end_date": session_at(scan, "end_date"),
    })
}

fn target_digest(target: &Value) -> Value {
    json!({
        "target_id": value_at(target, "/target_id"),
        "address": value_at(target, "/address"),
        "description": value_at(target, "/description"),
        "last_scan_date": value_at(target, "/last_scan_date"),
        "severity_counts": value_at(target, "/severity_counts"),
        "threat": value_at(target, "/threat"),
    })
}

fn vulnerability_digest(vuln: &Value) -> Value {
    json!({
        "vuln_id": value_at(vuln, "/vuln_id"),
        "severity": value_at(vuln, "/severity"),
        "vt_name": value_at(vuln, "/vt_name"),
        "status": value_at(vuln, "/status"),
        "affects_url": value_at(vuln, "/affects_url"),
        "confidence": value_at(vuln, "/confidence"),
    })
}

fn total(page: &Value) -> Value {
    match page.pointer("/pagination/count") {
        Some(count) if !count.is_null() => count.clone(),
        _ => json!(0),
    }
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct AcunetixTools {
    api: ApiClient,
}

impl AcunetixTools {
    pub const START_SCAN: &'static str = "start-scan";
    pub const GET_SCAN_STATUS: &'static str = "get-scan-status";
    pub const GET_SCAN_RESULTS: &'static str = "get-scan-results";
    pub const LIST_TARGETS: &'static str = "list-targets";
    pub const LIST_SCANS: &'static str = "list-scans";
    pub const GET_VULNERABILITY: &'static str = "get-vulnerability";

    pub fn new(url: &str, api_key: &str) -> Result<Self, HttpError> {
        let api = ApiClient::builder("Acunetix", format!("{}/api/v1", url.trim_end_matches('/')))
            .auth(ApiAuth::Header {
                name: "X-Auth",
                value: api_key.to_string(),
            })
            .accept_invalid_certs(true)
            .build()?;
        Ok(Self { api })
    }

    /// The scan with `scan_id` from the scan listing.
    async fn find_scan(&self, scan_id: &str) -> Result<Value, ToolError> {
        let scans = self.api.get_json("/scans", &[]).await?;
        array_at(&scans, "/scans")
            .iter()
            .find(|s| str_at(s, "/scan_id", "") == scan_id)
            .cloned()
            .ok_or_else(|| ToolError::not_found(format!("Scan not found: {scan_id}")))
    }

    async fn find_or_create_target(
        &self,
        address: &str,
        description: Option<&str>,
    ) -> Result<Value, ToolError> {
        let targets = self.api.get_json("/targets", &[]).await?;
        if let Some(existing) = array_at(&targets, "/targets")
            .iter()
            .find(|t| str_at(t, "/address", "") == address)
        {
            return Ok(existing.clone());
        }

        let description = description.map(str::to_string).unwrap_or_else(|| {
            format!(
                "RaptorX Scan - {}",
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
            )
        });
        let created = self
            .api
            .post_json(
                "/targets",
                &json!({
                    "address": address,
                    "description": description,
                    "criticality": 10,
                }),
            )
            .await?;
        info!(address, "Created Acunetix target");
        Ok(created)
    }

    async fn resolve_profile(&self, profile_id: Option<&str>) -> Result<Value, ToolError> {
        let profiles = self.api.get_json("/scanning_profiles", &[]).await?;
        let profiles = array_at(&profiles, "/scanning_profiles");
        let found = match profile_id {
            Some(id) => profiles.iter().find(|p| str_at(p, "/profile_id", "") == id),
            None => profiles.iter().find(|p| str_at(p, "/name", "") == DEFAULT_PROFILE),
        };
        found.cloned().ok_or_else(|| {
            ToolError::not_found(format!(
                "Scanning profile not found: {}",
                profile_id.unwrap_or(DEFAULT_PROFILE)
            ))
        })
    }

    /// Find-or-create target, resolve profile, create scan. A failure in a
    /// later step leaves an earlier-created target in place.
    #[instrument(skip_all, fields(target = %params.target_url))]
    pub async fn start_scan(
        self: Arc<Self>,
        params: StartScanParams,
    ) -> Result<CallToolResult, ToolError> {
        require_http_url("target_url", &params.target_url)?;
        let target = self
            .find_or_create_target(&params.target_url, params.description.as_deref())
            .await?;
        let profile = self.resolve_profile(params.profile_id.as_deref()).await?;

        let scan = self
            .api
            .post_json(
                "/scans",
                &json!({
                    "target_id": value_at(&target, "/target_id"),
                    "profile_id": value_at(&profile, "/profile_id"),
                    "schedule": {
                        "disable": false,
                        "start_date": null,
                        "time_sensitive": false,
                    },
                }),
            )
            .await?;

        Ok(success_result(pretty_json(&json!({
            "scan_id": value_at(&scan, "/scan_id"),
            "target_id": value_at(&target, "/target_id"),
            "target_url": params.target_url,
            "profile": value_at(&profile, "/name"),
            "status": "queued",
            "message": "Scan started successfully",
        }))))
    }

    #[instrument(skip_all, fields(scan_id = %params.scan_id))]
    pub async fn get_scan_status(
        self: Arc<Self>,
        params: ScanStatusParams,
    ) -> Result<CallToolResult, ToolError> {
        let scan = self.find_scan(&params.scan_id).await?;
        let target = self
            .api
            .get_json(&format!("/targets/{}", str_at(&scan, "/target_id", "")), &[])
            .await?;

        let severity_counts = match session_at(&scan, "severity_counts") {
            Value::Null => value_at(&target, "/severity_counts"),
            counts => counts,
        };
        let status = match session_at(&scan, "status") {
            Value::Null => json!("unknown"),
            status => status,
        };
        let progress = match session_at(&scan, "progress") {
            Value::Null => json!(0),
            progress => progress,
        };

        Ok(success_result(pretty_json(&json!({
            "scan_id": params.scan_id,
            "target_url": value_at(&target, "/address"),
            "status": status,
            "progress": progress,
            "severity_counts": severity_counts,
            "start_date": session_at(&scan, "start_date"),
            "end_date": session_at(&scan, "end_date"),
        }))))
    }

    #[instrument(skip_all, fields(scan_id = %params.scan_id, severity = ?params.severity))]
    pub async fn get_scan_results(
        self: Arc<Self>,
        params: ScanResultsParams,
    ) -> Result<CallToolResult, ToolError> {
        let scan = self.find_scan(&params.scan_id).await?;
        let target_id = str_at(&scan, "/target_id", "").to_string();
        let query: Vec<_> = params
            .severity
            .map(|s| ("severity", s.as_str().to_string()))
            .into_iter()
            .collect();
        let vulns = self
            .api
            .get_json(&format!("/targets/{target_id}/vulnerabilities"), &query)
            .await?;

        let vulnerabilities: Vec<Value> = array_at(&vulns, "/vulnerabilities")
            .iter()
            .map(vulnerability_digest)
            .collect();
        Ok(success_result(pretty_json(&json!({
            "scan_id": params.scan_id,
            "target_id": target_id,
            "total_vulnerabilities": vulnerabilities.len(),
            "vulnerabilities": vulnerabilities,
        }))))
    }

    #[instrument(skip_all, fields(limit = params.limit))]
    pub async fn list_targets(
        self: Arc<Self>,
        params: ListTargetsParams,
    ) -> Result<CallToolResult, ToolError> {
        let page = self
            .api
            .get_json("/targets", &[("l", params.limit.to_string())])
            .await?;
        let targets: Vec<Value> = array_at(&page, "/targets")
            .iter()
            .take(params.limit)
            .map(target_digest)
            .collect();
        Ok(success_result(pretty_json(&json!({
            "total": total(&page),
            "targets": targets,
        }))))
    }

    #[instrument(skip_all, fields(target_id = ?params.target_id, limit = params.limit))]
    pub async fn list_scans(
        self: Arc<Self>,
        params: ListScansParams,
    ) -> Result<CallToolResult, ToolError> {
        let path = match &params.target_id {
            Some(target_id) => format!("/targets/{target_id}/scans"),
            None => "/scans".to_string(),
        };
        let page = self
            .api
            .get_json(&path, &[("l", params.limit.to_string())])
            .await?;
        let scans: Vec<Value> = array_at(&page, "/scans")
            .iter()
            .take(params.limit)
            .map(scan_digest)
            .collect();
        Ok(success_result(pretty_json(&json!({
            "total": total(&page),
            "scans": scans,
        }))))
    }

    #[instrument(skip_all, fields(vuln_id = %params.vuln_id, target_id = %params.target_id))]
    pub async fn get_vulnerability(
        self: Arc<Self>,
        params: VulnerabilityParams,
    ) -> Result<CallToolResult, ToolError> {
        let vuln = self
            .api
            .get_json(
                &format!("/targets/{}/vulnerabilities/{}", params.target_id, params.vuln_id),
                &[],
            )
            .await?;
        let fields = [
            "vuln_id",
            "severity",
            "vt_name",
            "description",
            "recommendation",
            "affects_url",
            "confidence",
            "status",
            "cvss_score",
            "cvss_vector",
            "request",
            "response",
        ];
        let digest: serde_json::Map<String, Value> = fields
            .iter()
            .map(|field| (field.to_string(), value_at(&vuln, &format!("/{field}"))))
            .collect();
        Ok(success_result(pretty_json(&Value::Object(digest))))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::START_SCAN,
                "Start a new Acunetix vulnerability scan on a target URL",
                this.clone(),
                Self::start_scan,
            ))
            .with_route(tool_route(
                Self::GET_SCAN_STATUS,
                "Check the status of a running or completed scan",
                this.clone(),
                Self::get_scan_status,
            ))
            .with_route(tool_route(
                Self::GET_SCAN_RESULTS,
                "Retrieve detailed results from a completed scan",
                this.clone(),
                Self::get_scan_results,
            ))
            .with_route(tool_route(
                Self::LIST_TARGETS,
                "List all configured scan targets in Acunetix",
                this.clone(),
                Self::list_targets,
            ))
            .with_route(tool_route(
                Self::LIST_SCANS,
                "List all scans (optionally filtered by target)",
                this.clone(),
                Self::list_scans,
            ))
            .with_route(tool_route(
                Self::GET_VULNERABILITY,
                "Get detailed information about a specific vulnerability",
                this,
                Self::get_vulnerability,
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::http::testing::serve;
    use crate::domains::tools::definitions::common::result_text;
    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Appliance {
        targets: Arc<Mutex<Vec<Value>>>,
        profiles: Arc<Mutex<Vec<Value>>>,
    }

    async fn list_targets(State(app): State<Appliance>, headers: HeaderMap) -> Json<Value> {
        assert_eq!(headers["x-auth"], "secret-key");
        let targets = app.targets.lock().unwrap().clone();
        Json(json!({"targets": targets, "pagination": {"count": targets.len()}}))
    }

    async fn create_target(
        State(app): State<Appliance>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let mut targets = app.targets.lock().unwrap();
        let created = json!({
            "target_id": format!("t-{}", targets.len() + 1),
            "address": body["address"],
            "description": body["description"],
            "criticality": body["criticality"],
        });
        targets.push(created.clone());
        (StatusCode::CREATED, Json(created))
    }

    async fn profiles(State(app): State<Appliance>) -> Json<Value> {
        Json(json!({"scanning_profiles": app.profiles.lock().unwrap().clone()}))
    }

    fn scans_page() -> Value {
        json!({
            "scans": [
                {"scan_id": "s-1", "target_id": "t-1", "profile_name": "Full Scan",
                 "current_session": {"status": "processing", "progress": 40, "start_date": "2024-05-01T12:00:00Z"}},
                {"scan_id": "s-2", "target_id": "t-2", "profile_name": "High Risk"}
            ],
            "pagination": {"count": 2}
        })
    }

    async fn acunetix(appliance: Appliance) -> Arc<AcunetixTools> {
        let app = Router::new()
            .route("/api/v1/targets", get(list_targets).post(create_target))
            .route("/api/v1/scanning_profiles", get(profiles))
            .route(
                "/api/v1/scans",
                get(|| async { Json(scans_page()) })
                    .post(|Json(body): Json<Value>| async move {
                        let target_id = body["target_id"].as_str().unwrap();
                        Json(json!({"scan_id": format!("scan-for-{target_id}")}))
                    }),
            )
            .route(
                "/api/v1/targets/{id}",
                get(|Path(id): Path<String>| async move {
                    Json(json!({
                        "target_id": id,
                        "address": "https://shop.example.com",
                        "severity_counts": {"high": 2}
                    }))
                }),
            )
            .route(
                "/api/v1/targets/{id}/vulnerabilities",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    assert_eq!(q.get("severity").map(String::as_str), Some("high"));
                    Json(json!({"vulnerabilities": [
                        {"vuln_id": "v-9", "severity": 3, "vt_name": "SQL Injection",
                         "status": "open", "affects_url": "https://shop.example.com/search",
                         "confidence": 95, "request": "GET /search"}
                    ]}))
                }),
            )
            .with_state(appliance);
        let base = serve(app).await;
        Arc::new(AcunetixTools::new(&format!("{base}/"), "secret-key").unwrap())
    }

    fn start(url: &str) -> StartScanParams {
        StartScanParams {
            target_url: url.into(),
            profile_id: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_start_scan_creates_target_and_uses_full_scan() {
        let appliance = Appliance::default();
        appliance.profiles.lock().unwrap().extend([
            json!({"profile_id": "p-quick", "name": "High Risk"}),
            json!({"profile_id": "p-full", "name": "Full Scan"}),
        ]);
        let tools = acunetix(appliance.clone()).await;

        let result = tools.start_scan(start("https://shop.example.com")).await.unwrap();
        let body: Value = serde_json::from_str(result_text(&result)).unwrap();
        assert_eq!(body["scan_id"], "scan-for-t-1");
        assert_eq!(body["profile"], "Full Scan");
        assert_eq!(body["status"], "queued");

        let targets = appliance.targets.lock().unwrap();
        assert_eq!(targets[0]["criticality"], 10);
        let description = targets[0]["description"].as_str().unwrap();
        assert!(description.starts_with("RaptorX Scan - "), "{description}");
    }

    #[tokio::test]
    async fn test_profile_failure_leaves_created_target() {
        let appliance = Appliance::default();
        let tools = acunetix(appliance.clone()).await;

        let err = tools.start_scan(start("https://shop.example.com")).await.unwrap_err();
        assert_eq!(err.to_string(), "Scanning profile not found: Full Scan");
        let targets = appliance.targets.lock().unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0]["address"], "https://shop.example.com");
    }

    #[tokio::test]
    async fn test_scan_status_reads_session_and_target() {
        let tools = acunetix(Appliance::default()).await;
        let result = tools
            .clone()
            .get_scan_status(ScanStatusParams { scan_id: "s-1".into() })
            .await
            .unwrap();
        let body: Value = serde_json::from_str(result_text(&result)).unwrap();
        assert_eq!(body["status"], "processing");
        assert_eq!(body["progress"], 40);
        assert_eq!(body["target_url"], "https://shop.example.com");
        assert_eq!(body["severity_counts"], json!({"high": 2}));

        let missing = tools
            .get_scan_status(ScanStatusParams { scan_id: "s-404".into() })
            .await
            .unwrap_err();
        assert_eq!(missing.to_string(), "Scan not found: s-404");
    }

    #[tokio::test]
    async fn test_scan_results_are_digested() {
        let tools = acunetix(Appliance::default()).await;
        let result = tools
            .get_scan_results(ScanResultsParams {
                scan_id: "s-2".into(),
                severity: Some(Severity::High),
            })
            .await
            .unwrap();
        let body: Value = serde_json::from_str(result_text(&result)).unwrap();
        assert_eq!(body["target_id"], "t-2");
        assert_eq!(body["total_vulnerabilities"], 1);
        assert_eq!(body["vulnerabilities"][0]["vt_name"], "SQL Injection");
        assert!(body["vulnerabilities"][0].get("request").is_none());
    }

    #[tokio::test]
    async fn test_list_scans_without_session_yields_nulls() {
        let tools = acunetix(Appliance::default()).await;
        let result = tools
            .list_scans(ListScansParams {
                target_id: None,
                limit: 1,
            })
            .await
            .unwrap();
        let body: Value = serde_json::from_str(result_text(&result)).unwrap();
        assert_eq!(body["total"], 2);
        assert_eq!(body["scans"].as_array().unwrap().len(), 1);
        assert_eq!(body["scans"][0]["status"], "processing");
    }
}
