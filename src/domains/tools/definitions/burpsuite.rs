//! Burp Suite Professional adapter over the local REST API (`/v0.1`).

use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use super::common::{pretty_json, require_http_url, scalar_at, success_result};
use crate::core::http::{ApiClient, HttpError};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::tool_route;

// ============================================================================
// Tool Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Single URL
    #[default]
    Url,
    /// Entire host
    Host,
    /// Entire domain
    Domain,
}

impl Scope {
    fn as_str(self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Host => "host",
            Self::Domain => "domain",
        }
    }
}

/// Parameters for `burp-scan`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ScanParams {
    /// Target URL to scan
    pub url: String,

    /// Scope of the scan: url (single URL), host (entire host), domain (entire domain)
    #[serde(default)]
    pub scope: Scope,
}

/// Parameters for `burp-scan-status`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ScanStatusParams {
    /// The task ID of the scan to check
    #[serde(rename = "taskId")]
    pub task_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SeverityFilter {
    High,
    Medium,
    Low,
    Info,
    #[default]
    All,
}

impl SeverityFilter {
    fn matches(self, issue: &Value) -> bool {
        let wanted = match self {
            Self::All => return true,
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        };
        issue
            .get("severity")
            .and_then(Value::as_str)
            .is_some_and(|s| s.eq_ignore_ascii_case(wanted))
    }
}

/// Parameters for `burp-get-issues`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct IssuesParams {
    /// Filter issues by severity
    #[serde(default)]
    pub severity: SeverityFilter,
}

/// Parameters for `burp-sitemap`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SitemapParams {
    /// Filter sitemap by URL prefix
    #[serde(rename = "urlPrefix")]
    pub url_prefix: Option<String>,
}

/// Parameters for `burp-spider`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SpiderParams {
    /// Base URL to spider
    pub url: String,
}

fn filter_issues(issues: Value, severity: SeverityFilter) -> Value {
    match issues {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|issue| severity.matches(issue))
                .collect(),
        ),
        other => other,
    }
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct BurpSuiteTools {
    api: ApiClient,
}

impl BurpSuiteTools {
    pub const SCAN: &'static str = "burp-scan";
    pub const SCAN_STATUS: &'static str = "burp-scan-status";
    pub const GET_ISSUES: &'static str = "burp-get-issues";
    pub const SITEMAP: &'static str = "burp-sitemap";
    pub const SPIDER: &'static str = "burp-spider";

    pub fn new(url: &str) -> Result<Self, HttpError> {
        let api = ApiClient::builder("Burp", url).build()?;
        Ok(Self { api })
    }

    #[instrument(skip_all, fields(url = %params.url, scope = params.scope.as_str()))]
    pub async fn scan(self: Arc<Self>, params: ScanParams) -> Result<CallToolResult, ToolError> {
        require_http_url("url", &params.url)?;
        let body = json!({
            "urls": [params.url],
            "scope": {"type": params.scope.as_str()},
        });
        let result = self.api.post_json("/v0.1/scan", &body).await?;
        Ok(success_result(format!(
            "Scan started successfully.\nTask ID: {}\nTarget: {}\nScope: {}",
            scalar_at(&result, "/task_id", "N/A"),
            params.url,
            params.scope.as_str()
        )))
    }

    #[instrument(skip_all, fields(task_id = %params.task_id))]
    pub async fn scan_status(
        self: Arc<Self>,
        params: ScanStatusParams,
    ) -> Result<CallToolResult, ToolError> {
        let result = self
            .api
            .get_json(&format!("/v0.1/scan/{}", params.task_id), &[])
            .await?;
        Ok(success_result(pretty_json(&result)))
    }

    #[instrument(skip_all, fields(severity = ?params.severity))]
    pub async fn get_issues(
        self: Arc<Self>,
        params: IssuesParams,
    ) -> Result<CallToolResult, ToolError> {
        let issues = self
            .api
            .get_json("/v0.1/knowledge_base/issue_definitions", &[])
            .await?;
        Ok(success_result(pretty_json(&filter_issues(issues, params.severity))))
    }

    #[instrument(skip_all, fields(prefix = ?params.url_prefix))]
    pub async fn sitemap(
        self: Arc<Self>,
        params: SitemapParams,
    ) -> Result<CallToolResult, ToolError> {
        let query: Vec<_> = params
            .url_prefix
            .map(|prefix| ("url_prefix", prefix))
            .into_iter()
            .collect();
        let result = self.api.get_json("/v0.1/sitemap", &query).await?;
        Ok(success_result(pretty_json(&result)))
    }

    #[instrument(skip_all, fields(url = %params.url))]
    pub async fn spider(
        self: Arc<Self>,
        params: SpiderParams,
    ) -> Result<CallToolResult, ToolError> {
        require_http_url("url", &params.url)?;
        let result = self
            .api
            .post_json("/v0.1/spider", &json!({"base_url": params.url}))
            .await?;
        Ok(success_result(format!(
            "Spider started on {}\n{}",
            params.url,
            pretty_json(&result)
        )))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::SCAN,
                "Start an active scan on the specified URL using Burp Suite Professional",
                this.clone(),
                Self::scan,
            ))
            .with_route(tool_route(
                Self::SCAN_STATUS,
                "Get the status of a Burp Suite scan",
                this.clone(),
                Self::scan_status,
            ))
            .with_route(tool_route(
                Self::GET_ISSUES,
                "Get all issues found by Burp Suite",
                this.clone(),
                Self::get_issues,
            ))
            .with_route(tool_route(
                Self::SITEMAP,
                "Get the site map from Burp Suite",
                this.clone(),
                Self::sitemap,
            ))
            .with_route(tool_route(
                Self::SPIDER,
                "Start spidering/crawling a target URL",
                this,
                Self::spider,
            ))
    }
}
