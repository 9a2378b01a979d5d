//! Nessus REST backend (`X-ApiKeys: accessKey=…; secretKey=…`).

use async_trait::async_trait;
use serde_json::{Value, json};

use super::backend::{Finding, NessusBackend, ScanReport, ScanResults, ScanType, Severity};
use crate::core::config::NessusCredentials;
use crate::core::http::{ApiAuth, ApiClient, HttpError};
use crate::domains::tools::ToolError;
use crate::domains::tools::definitions::common::{array_at, scalar_at, str_at};

pub struct RestBackend {
    api: ApiClient,
}

impl RestBackend {
    pub fn new(credentials: &NessusCredentials) -> Result<Self, HttpError> {
        let api = ApiClient::builder("Nessus", credentials.url.as_str())
            .auth(ApiAuth::Header {
                name: "X-ApiKeys",
                value: format!(
                    "accessKey={}; secretKey={}",
                    credentials.access_key, credentials.secret_key
                ),
            })
            .accept_invalid_certs(true)
            .build()?;
        Ok(Self { api })
    }

    async fn scan_details(&self, scan_id: &str) -> Result<Value, ToolError> {
        match self.api.get_json(&format!("/scans/{scan_id}"), &[]).await {
            Err(HttpError::Status { status: 404, .. }) => {
                Err(ToolError::not_found(format!("Scan not found: {scan_id}")))
            }
            other => Ok(other?),
        }
    }

    async fn template_uuid(&self, scan_type: ScanType) -> Result<String, ToolError> {
        let templates = self.api.get_json("/editor/scan/templates", &[]).await?;
        array_at(&templates, "/templates")
            .iter()
            .find(|t| str_at(t, "/name", "") == scan_type.template_name())
            .map(|t| str_at(t, "/uuid", "").to_string())
            .filter(|uuid| !uuid.is_empty())
            .ok_or_else(|| {
                ToolError::unexpected(format!(
                    "no '{}' template on the Nessus server",
                    scan_type.template_name()
                ))
            })
    }
}

fn epoch_to_rfc3339(value: &Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .and_then(Value::as_i64)
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn finding(vuln: &Value) -> Finding {
    Finding {
        id: scalar_at(vuln, "/plugin_id", "unknown"),
        name: str_at(vuln, "/plugin_name", "Unknown").to_string(),
        description: format!(
            "{} (hosts affected: {})",
            str_at(vuln, "/plugin_family", "Unknown family"),
            scalar_at(vuln, "/count", "0")
        ),
        severity: Severity::from_level(vuln.get("severity").and_then(Value::as_i64).unwrap_or(0)),
        cvss_score: vuln.get("cvss_base_score").and_then(Value::as_f64),
        affected_systems: Vec::new(),
        remediation: None,
        references: Vec::new(),
    }
}

#[async_trait]
impl NessusBackend for RestBackend {
    async fn templates(&self) -> Result<Value, ToolError> {
        let raw = self.api.get_json("/editor/scan/templates", &[]).await?;
        let templates: Vec<Value> = array_at(&raw, "/templates")
            .iter()
            .map(|t| {
                json!({
                    "id": str_at(t, "/name", ""),
                    "uuid": str_at(t, "/uuid", ""),
                    "name": str_at(t, "/title", ""),
                    "description": str_at(t, "/desc", ""),
                })
            })
            .collect();
        Ok(json!({ "templates": templates }))
    }

    async fn start_scan(&self, target: &str, scan_type: ScanType) -> Result<Value, ToolError> {
        let uuid = self.template_uuid(scan_type).await?;
        let created = self
            .api
            .post_json(
                "/scans",
                &json!({
                    "uuid": uuid,
                    "settings": {
                        "name": format!("{} - {}", scan_type.as_str(), target),
                        "text_targets": target,
                        "enabled": false,
                    },
                }),
            )
            .await?;
        let scan_id = scalar_at(&created, "/scan/id", "");
        if scan_id.is_empty() {
            return Err(ToolError::unexpected("Nessus did not return a scan id"));
        }
        self.api
            .post_json(&format!("/scans/{scan_id}/launch"), &json!({}))
            .await?;
        Ok(json!({
            "scan_id": scan_id,
            "status": "queued",
            "message": "Scan queued successfully",
        }))
    }

    async fn scan_status(&self, scan_id: &str) -> Result<Value, ToolError> {
        let details = self.scan_details(scan_id).await?;
        Ok(json!({
            "id": scan_id,
            "status": str_at(&details, "/info/status", "unknown"),
            "target": str_at(&details, "/info/targets", ""),
            "type": str_at(&details, "/info/policy", ""),
            "created": epoch_to_rfc3339(&details, "/info/scan_start"),
        }))
    }

    async fn scan_results(&self, scan_id: &str) -> Result<ScanResults, ToolError> {
        let details = self.scan_details(scan_id).await?;
        let status = str_at(&details, "/info/status", "unknown").to_string();
        if status != "completed" {
            return Ok(ScanResults::Pending { status });
        }
        Ok(ScanResults::Completed(ScanReport {
            scan_id: scan_id.to_string(),
            scan_type: str_at(&details, "/info/policy", "Unknown").to_string(),
            target: str_at(&details, "/info/targets", "Unknown").to_string(),
            start_time: epoch_to_rfc3339(&details, "/info/scan_start"),
            end_time: epoch_to_rfc3339(&details, "/info/scan_end"),
            status,
            vulnerabilities: array_at(&details, "/vulnerabilities")
                .iter()
                .map(finding)
                .collect(),
        }))
    }

    async fn list_scans(&self) -> Result<Value, ToolError> {
        let raw = self.api.get_json("/scans", &[]).await?;
        let scans: Vec<Value> = array_at(&raw, "/scans")
            .iter()
            .map(|scan| {
                json!({
                    "id": scalar_at(scan, "/id", ""),
                    "target": str_at(scan, "/name", ""),
                    "status": str_at(scan, "/status", "unknown"),
                    "created": epoch_to_rfc3339(scan, "/creation_date"),
                })
            })
            .collect();
        Ok(json!({ "scans": scans }))
    }

    fn mode(&self) -> &'static str {
        "real"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::http::testing::serve;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use pretty_assertions::assert_eq;

    async fn nessus() -> RestBackend {
        let app = Router::new()
            .route(
                "/editor/scan/templates",
                get(|headers: HeaderMap| async move {
                    assert_eq!(headers["x-apikeys"], "accessKey=ak; secretKey=sk");
                    Json(json!({"templates": [
                        {"uuid": "u-basic", "name": "basic", "title": "Basic Network Scan",
                         "desc": "A full system scan"},
                        {"uuid": "u-webapp", "name": "webapp", "title": "Web Application Tests",
                         "desc": "Scan for web vulns"}
                    ]}))
                }),
            )
            .route(
                "/scans",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["uuid"], "u-webapp");
                    assert_eq!(body["settings"]["text_targets"], "shop.example.com");
                    Json(json!({"scan": {"id": 42}}))
                }),
            )
            .route("/scans/42/launch", post(|| async { Json(json!({"scan_uuid": "abc"})) }))
            .route(
                "/scans/{id}",
                get(|Path(id): Path<String>| async move {
                    match id.as_str() {
                        "42" => Ok(Json(json!({
                            "info": {"status": "completed", "targets": "shop.example.com",
                                     "policy": "Web Application Tests",
                                     "scan_start": 1714564800, "scan_end": 1714568400},
                            "vulnerabilities": [
                                {"plugin_id": 19506, "plugin_name": "Nessus Scan Information",
                                 "plugin_family": "Settings", "severity": 0, "count": 1},
                                {"plugin_id": 142960, "plugin_name": "Apache 2.4.x < 2.4.46",
                                 "plugin_family": "Web Servers", "severity": 3, "count": 1}
                            ]
                        }))),
                        "7" => Ok(Json(json!({"info": {"status": "running", "targets": "10.0.0.1"}}))),
                        _ => Err((
                            StatusCode::NOT_FOUND,
                            "{\"error\":\"The requested file was not found.\"}",
                        )),
                    }
                }),
            );
        let base = serve(app).await;
        RestBackend::new(&NessusCredentials {
            url: base,
            access_key: "ak".into(),
            secret_key: "sk".into(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_scan_creates_then_launches() {
        let backend = nessus().await;
        let started = backend
            .start_scan("shop.example.com", ScanType::WebAppScan)
            .await
            .unwrap();
        assert_eq!(started["scan_id"], "42");
        assert_eq!(started["status"], "queued");
    }

    #[tokio::test]
    async fn test_results_map_plugin_severity() {
        let backend = nessus().await;
        let ScanResults::Completed(report) = backend.scan_results("42").await.unwrap() else {
            panic!("expected a completed report");
        };
        assert_eq!(report.target, "shop.example.com");
        assert_eq!(report.vulnerabilities.len(), 2);
        assert_eq!(report.vulnerabilities[1].severity, Severity::High);
        assert_eq!(report.vulnerabilities[1].id, "142960");

        assert!(matches!(
            backend.scan_results("7").await.unwrap(),
            ScanResults::Pending { status } if status == "running"
        ));
    }

    #[tokio::test]
    async fn test_unknown_scan_is_not_found() {
        let backend = nessus().await;
        let err = backend.scan_status("999").await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
