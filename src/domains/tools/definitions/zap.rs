//! OWASP ZAP adapter: spidering, active scanning and alert retrieval through
//! the ZAP daemon's JSON API.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use super::common::{
    array_at, pretty_json, require_http_url, scalar_at, success_result, truncate_chars, value_at,
};
use crate::core::http::{ApiAuth, ApiClient, HttpError};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::{NoParams, tool_route};

const ALERT_TEXT_MAX_CHARS: usize = 200;

// ============================================================================
// Tool Parameters
// ============================================================================

fn default_true() -> bool {
    true
}

/// Parameters for `zap-spider`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SpiderParams {
    /// Target URL to spider
    pub url: String,

    /// Maximum number of child URLs to crawl (0 for unlimited)
    #[serde(rename = "maxChildren", default)]
    pub max_children: u32,

    /// Whether to recurse into found links
    #[serde(default = "default_true")]
    pub recurse: bool,
}

/// Parameters for `zap-spider-status` and `zap-scan-status`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ScanIdParams {
    /// Scan ID returned when the scan was started
    #[serde(rename = "scanId")]
    pub scan_id: String,
}

/// Parameters for `zap-active-scan`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ActiveScanParams {
    /// Target URL to scan
    pub url: String,

    /// Whether to scan recursively
    #[serde(default = "default_true")]
    pub recurse: bool,

    /// Scan policy name to use
    pub policy: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
pub enum RiskLevel {
    Informational,
    Low,
    Medium,
    High,
    #[default]
    #[serde(rename = "all")]
    All,
}

impl RiskLevel {
    /// ZAP's numeric `riskId`; `None` means no filter.
    fn risk_id(self) -> Option<&'static str> {
        match self {
            Self::High => Some("3"),
            Self::Medium => Some("2"),
            Self::Low => Some("1"),
            Self::Informational => Some("0"),
            Self::All => None,
        }
    }
}

/// Parameters for `zap-get-alerts`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AlertsParams {
    /// Filter alerts by base URL
    #[serde(rename = "baseUrl")]
    pub base_url: Option<String>,

    /// Filter by risk level
    #[serde(rename = "riskLevel", default)]
    pub risk_level: RiskLevel,
}

/// Parameters for `zap-ajax-spider`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AjaxSpiderParams {
    /// Target URL to spider
    pub url: String,

    /// Only spider URLs in scope
    #[serde(rename = "inScope", default = "default_true")]
    pub in_scope: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Html,
    Xml,
    #[default]
    Json,
    Md,
}

impl ReportFormat {
    /// Non-JSON reports come from ZAP's `OTHER` API family.
    fn other_endpoint(self) -> Option<&'static str> {
        match self {
            Self::Html => Some("/OTHER/core/other/htmlreport/"),
            Self::Xml => Some("/OTHER/core/other/xmlreport/"),
            Self::Md => Some("/OTHER/core/other/mdreport/"),
            Self::Json => None,
        }
    }
}

/// Parameters for `zap-generate-report`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReportParams {
    /// Report format
    #[serde(default)]
    pub format: ReportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// No attacks
    Safe,
    /// Attacks on scope only
    Protect,
    /// Normal operation
    Standard,
    /// Aggressive
    Attack,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Protect => "protect",
            Self::Standard => "standard",
            Self::Attack => "attack",
        }
    }
}

/// Parameters for `zap-set-mode`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SetModeParams {
    /// Operation mode: safe (no attacks), protect (attacks on scope only), standard (normal), attack (aggressive)
    pub mode: Mode,
}

// ============================================================================
// Report digests
// ============================================================================

fn alert_text(alert: &Value, pointer: &str) -> Value {
    alert
        .pointer(pointer)
        .and_then(Value::as_str)
        .map_or(Value::Null, |s| Value::String(truncate_chars(s, ALERT_TEXT_MAX_CHARS)))
}

fn alerts_digest(result: &Value) -> Vec<Value> {
    array_at(result, "/alerts")
        .iter()
        .map(|alert| {
            json!({
                "name": value_at(alert, "/name"),
                "risk": value_at(alert, "/risk"),
                "confidence": value_at(alert, "/confidence"),
                "url": value_at(alert, "/url"),
                "description": alert_text(alert, "/description"),
                "solution": alert_text(alert, "/solution"),
            })
        })
        .collect()
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct ZapTools {
    api: ApiClient,
}

impl ZapTools {
    pub const SPIDER: &'static str = "zap-spider";
    pub const SPIDER_STATUS: &'static str = "zap-spider-status";
    pub const ACTIVE_SCAN: &'static str = "zap-active-scan";
    pub const SCAN_STATUS: &'static str = "zap-scan-status";
    pub const GET_ALERTS: &'static str = "zap-get-alerts";
    pub const AJAX_SPIDER: &'static str = "zap-ajax-spider";
    pub const AJAX_SPIDER_STATUS: &'static str = "zap-ajax-spider-status";
    pub const GENERATE_REPORT: &'static str = "zap-generate-report";
    pub const SET_MODE: &'static str = "zap-set-mode";

    /// The key is sent as the `apikey` query parameter when given.
    pub fn new(url: &str, api_key: Option<&str>) -> Result<Self, HttpError> {
        let auth = match api_key.filter(|k| !k.is_empty()) {
            Some(key) => ApiAuth::QueryKey {
                name: "apikey",
                value: key.to_string(),
            },
            None => ApiAuth::None,
        };
        let api = ApiClient::builder("ZAP", url).auth(auth).build()?;
        Ok(Self { api })
    }

    async fn call(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value, ToolError> {
        Ok(self.api.get_json(&format!("/JSON{endpoint}"), query).await?)
    }

    #[instrument(skip_all, fields(url = %params.url))]
    pub async fn spider(
        self: Arc<Self>,
        params: SpiderParams,
    ) -> Result<CallToolResult, ToolError> {
        require_http_url("url", &params.url)?;
        let result = self
            .call(
                "/spider/action/scan/",
                &[
                    ("url", params.url),
                    ("maxChildren", params.max_children.to_string()),
                    ("recurse", params.recurse.to_string()),
                ],
            )
            .await?;
        Ok(success_result(format!(
            "Spider started.\nScan ID: {}\n\nUse zap-spider-status to check progress.",
            scalar_at(&result, "/scan", "unknown")
        )))
    }

    #[instrument(skip_all, fields(scan_id = %params.scan_id))]
    pub async fn spider_status(
        self: Arc<Self>,
        params: ScanIdParams,
    ) -> Result<CallToolResult, ToolError> {
        let query = [("scanId", params.scan_id)];
        let status = self.call("/spider/view/status/", &query).await?;
        let results = self.call("/spider/view/results/", &query).await?;
        Ok(success_result(format!(
            "Spider Progress: {}%\nURLs Found: {}",
            scalar_at(&status, "/status", "0"),
            array_at(&results, "/results").len()
        )))
    }

    #[instrument(skip_all, fields(url = %params.url))]
    pub async fn active_scan(
        self: Arc<Self>,
        params: ActiveScanParams,
    ) -> Result<CallToolResult, ToolError> {
        require_http_url("url", &params.url)?;
        let mut query = vec![("url", params.url), ("recurse", params.recurse.to_string())];
        if let Some(policy) = params.policy {
            query.push(("scanPolicyName", policy));
        }
        let result = self.call("/ascan/action/scan/", &query).await?;
        Ok(success_result(format!(
            "Active scan started.\nScan ID: {}\n\nUse zap-scan-status to check progress.",
            scalar_at(&result, "/scan", "unknown")
        )))
    }

    #[instrument(skip_all, fields(scan_id = %params.scan_id))]
    pub async fn scan_status(
        self: Arc<Self>,
        params: ScanIdParams,
    ) -> Result<CallToolResult, ToolError> {
        let status = self
            .call("/ascan/view/status/", &[("scanId", params.scan_id)])
            .await?;
        Ok(success_result(format!(
            "Active Scan Progress: {}%",
            scalar_at(&status, "/status", "0")
        )))
    }

    #[instrument(skip_all, fields(risk = ?params.risk_level))]
    pub async fn get_alerts(
        self: Arc<Self>,
        params: AlertsParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut query = Vec::new();
        if let Some(base_url) = params.base_url {
            query.push(("baseurl", base_url));
        }
        if let Some(risk_id) = params.risk_level.risk_id() {
            query.push(("riskId", risk_id.to_string()));
        }
        let result = self.call("/core/view/alerts/", &query).await?;
        let alerts = alerts_digest(&result);
        Ok(success_result(format!(
            "Found {} alerts:\n\n{}",
            alerts.len(),
            pretty_json(&Value::Array(alerts))
        )))
    }

    #[instrument(skip_all, fields(url = %params.url))]
    pub async fn ajax_spider(
        self: Arc<Self>,
        params: AjaxSpiderParams,
    ) -> Result<CallToolResult, ToolError> {
        require_http_url("url", &params.url)?;
        let result = self
            .call(
                "/ajaxSpider/action/scan/",
                &[("url", params.url.clone()), ("inScope", params.in_scope.to_string())],
            )
            .await?;
        Ok(success_result(format!(
            "AJAX Spider started on {}\n{}",
            params.url,
            pretty_json(&result)
        )))
    }

    pub async fn ajax_spider_status(
        self: Arc<Self>,
        _params: NoParams,
    ) -> Result<CallToolResult, ToolError> {
        let status = self.call("/ajaxSpider/view/status/", &[]).await?;
        let results = self.call("/ajaxSpider/view/numberOfResults/", &[]).await?;
        Ok(success_result(format!(
            "AJAX Spider Status: {}\nResults Found: {}",
            scalar_at(&status, "/status", "unknown"),
            scalar_at(&results, "/numberOfResults", "0")
        )))
    }

    #[instrument(skip_all, fields(format = ?params.format))]
    pub async fn generate_report(
        self: Arc<Self>,
        params: ReportParams,
    ) -> Result<CallToolResult, ToolError> {
        let text = match params.format.other_endpoint() {
            Some(endpoint) => self.api.get_text(endpoint, &[]).await?,
            None => pretty_json(&self.call("/core/view/alerts/", &[]).await?),
        };
        Ok(success_result(text))
    }

    #[instrument(skip_all, fields(mode = params.mode.as_str()))]
    pub async fn set_mode(
        self: Arc<Self>,
        params: SetModeParams,
    ) -> Result<CallToolResult, ToolError> {
        self.call("/core/action/setMode/", &[("mode", params.mode.as_str().to_string())])
            .await?;
        Ok(success_result(format!("ZAP mode set to: {}", params.mode.as_str())))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::SPIDER,
                "Spider a target URL to discover all pages",
                this.clone(),
                Self::spider,
            ))
            .with_route(tool_route(
                Self::SPIDER_STATUS,
                "Get the status of a spider scan",
                this.clone(),
                Self::spider_status,
            ))
            .with_route(tool_route(
                Self::ACTIVE_SCAN,
                "Run an active vulnerability scan on a target",
                this.clone(),
                Self::active_scan,
            ))
            .with_route(tool_route(
                Self::SCAN_STATUS,
                "Get the status of an active scan",
                this.clone(),
                Self::scan_status,
            ))
            .with_route(tool_route(
                Self::GET_ALERTS,
                "Get all security alerts found by ZAP",
                this.clone(),
                Self::get_alerts,
            ))
            .with_route(tool_route(
                Self::AJAX_SPIDER,
                "Run AJAX spider for JavaScript-heavy applications",
                this.clone(),
                Self::ajax_spider,
            ))
            .with_route(tool_route(
                Self::AJAX_SPIDER_STATUS,
                "Get AJAX spider status",
                this.clone(),
                Self::ajax_spider_status,
            ))
            .with_route(tool_route(
                Self::GENERATE_REPORT,
                "Generate a security report",
                this.clone(),
                Self::generate_report,
            ))
            .with_route(tool_route(
                Self::SET_MODE,
                "Set ZAP operation mode",
                this,
                Self::set_mode,
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::http::testing::serve;
    use crate::domains::tools::definitions::common::result_text;
    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;

    type Params = Query<HashMap<String, String>>;

    async fn zap(api_key: Option<&str>) -> Arc<ZapTools> {
        let app = Router::new()
            .route(
                "/JSON/spider/action/scan/",
                get(|Query(q): Params| async move {
                    Json(json!({"scan": "3", "echo": q}))
                }),
            )
            .route(
                "/JSON/spider/view/status/",
                get(|| async { Json(json!({"status": "42"})) }),
            )
            .route(
                "/JSON/spider/view/results/",
                get(|| async {
                    let results = ["http://t.test/", "http://t.test/a", "http://t.test/b"];
                    Json(json!({ "results": results }))
                }),
            )
            .route(
                "/JSON/core/view/alerts/",
                get(|Query(q): Params| async move {
                    assert_eq!(q.get("riskId").map(String::as_str), Some("3"));
                    assert_eq!(q.get("apikey").map(String::as_str), Some("zap-key"));
                    Json(json!({"alerts": [{
                        "name": "SQL Injection",
                        "risk": "High",
                        "confidence": "Medium",
                        "url": "http://t.test/item?id=1",
                        "description": "d".repeat(450),
                        "solution": "Use prepared statements."
                    }]}))
                }),
            )
            .route(
                "/OTHER/core/other/mdreport/",
                get(|| async { "# ZAP Scanning Report\n" }),
            );
        let base = serve(app).await;
        Arc::new(ZapTools::new(&base, api_key).unwrap())
    }

    #[tokio::test]
    async fn test_spider_and_status() {
        let tools = zap(None).await;
        let started = tools
            .clone()
            .spider(SpiderParams {
                url: "http://t.test/".into(),
                max_children: 0,
                recurse: true,
            })
            .await
            .unwrap();
        assert_eq!(
            result_text(&started),
            "Spider started.\nScan ID: 3\n\nUse zap-spider-status to check progress."
        );

        let status = tools
            .spider_status(ScanIdParams { scan_id: "3".into() })
            .await
            .unwrap();
        assert_eq!(result_text(&status), "Spider Progress: 42%\nURLs Found: 3");
    }

    #[tokio::test]
    async fn test_alerts_filtered_and_trimmed() {
        let tools = zap(Some("zap-key")).await;
        let result = tools
            .get_alerts(AlertsParams {
                base_url: None,
                risk_level: RiskLevel::High,
            })
            .await
            .unwrap();
        let text = result_text(&result);
        assert!(text.starts_with("Found 1 alerts:\n\n"));
        let alerts: Value =
            serde_json::from_str(text.trim_start_matches("Found 1 alerts:\n\n")).unwrap();
        assert_eq!(alerts[0]["name"], "SQL Injection");
        assert_eq!(alerts[0]["description"].as_str().unwrap().len(), ALERT_TEXT_MAX_CHARS);
    }

    #[tokio::test]
    async fn test_markdown_report_is_passed_through() {
        let tools = zap(None).await;
        let result = tools
            .generate_report(ReportParams {
                format: ReportFormat::Md,
            })
            .await
            .unwrap();
        assert_eq!(result_text(&result), "# ZAP Scanning Report\n");
    }

    #[tokio::test]
    async fn test_spider_rejects_non_http_target() {
        let tools = zap(None).await;
        let err = tools
            .spider(SpiderParams {
                url: "ftp://t.test".into(),
                max_children: 0,
                recurse: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn test_risk_level_defaults_to_all() {
        let params: AlertsParams = serde_json::from_value(json!({})).unwrap();
        assert_eq!(params.risk_level, RiskLevel::All);
        assert_eq!(params.risk_level.risk_id(), None);
    }
}
