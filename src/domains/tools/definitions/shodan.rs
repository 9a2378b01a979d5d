//! Shodan adapter: host intelligence, search, DNS and on-demand scans through
//! the Shodan REST API. The API key travels as the `key` query parameter.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use super::common::{array_at, pretty_json, scalar_at, str_at, success_result, value_at};
use crate::core::http::{ApiAuth, ApiClient, HttpError};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::{NoParams, tool_route};

pub const API_URL: &str = "https://api.shodan.io";
pub const EXPLOITS_URL: &str = "https://exploits.shodan.io";

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for `shodan-host`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct HostParams {
    /// IP address to look up
    pub ip: String,

    /// Include historical data
    #[serde(default)]
    pub history: bool,

    /// Return only essential information
    #[serde(default)]
    pub minify: bool,
}

fn default_page() -> u32 {
    1
}

/// Parameters for `shodan-search`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Shodan search query, e.g. `apache country:US`, `port:22 org:"Google"`,
    /// `vuln:CVE-2021-44228`, `http.title:"Dashboard"`
    pub query: String,

    /// Page number for results
    #[serde(default = "default_page")]
    pub page: u32,
}

/// Parameters for `shodan-dns-lookup`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DnsLookupParams {
    /// List of hostnames to resolve
    pub hostnames: Vec<String>,
}

/// Parameters for `shodan-reverse-dns` and `shodan-scan`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct IpsParams {
    /// List of IP addresses (or CIDR networks for scans)
    pub ips: Vec<String>,
}

/// Parameters for `shodan-exploits`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExploitsParams {
    /// Search query for exploits (e.g., CVE number, product name)
    pub query: String,
}

// ============================================================================
// Report digests
// ============================================================================

#[derive(Debug, Serialize)]
struct SearchDigest {
    total: Value,
    matches: usize,
    results: Vec<MatchDigest>,
}

#[derive(Debug, Serialize)]
struct MatchDigest {
    ip: Value,
    port: Value,
    org: Value,
    hostnames: Value,
    product: Value,
    version: Value,
    location: String,
}

fn search_digest(result: &Value) -> SearchDigest {
    let matches = array_at(result, "/matches");
    SearchDigest {
        total: value_at(result, "/total"),
        matches: matches.len(),
        results: matches
            .iter()
            .map(|m| MatchDigest {
                ip: value_at(m, "/ip_str"),
                port: value_at(m, "/port"),
                org: value_at(m, "/org"),
                hostnames: value_at(m, "/hostnames"),
                product: value_at(m, "/product"),
                version: value_at(m, "/version"),
                location: format!(
                    "{}, {}",
                    str_at(m, "/location/city", "Unknown"),
                    str_at(m, "/location/country_name", "Unknown")
                ),
            })
            .collect(),
    }
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct ShodanTools {
    api: ApiClient,
    exploits: ApiClient,
}

impl ShodanTools {
    pub const HOST: &'static str = "shodan-host";
    pub const SEARCH: &'static str = "shodan-search";
    pub const DNS_LOOKUP: &'static str = "shodan-dns-lookup";
    pub const REVERSE_DNS: &'static str = "shodan-reverse-dns";
    pub const EXPLOITS: &'static str = "shodan-exploits";
    pub const SCAN: &'static str = "shodan-scan";
    pub const ACCOUNT: &'static str = "shodan-account";

    pub fn new(api_key: &str) -> Result<Self, HttpError> {
        Self::with_endpoints(api_key, API_URL, EXPLOITS_URL)
    }

    pub fn with_endpoints(
        api_key: &str,
        api_url: &str,
        exploits_url: &str,
    ) -> Result<Self, HttpError> {
        let auth = ApiAuth::QueryKey {
            name: "key",
            value: api_key.to_string(),
        };
        Ok(Self {
            api: ApiClient::builder("Shodan", api_url).auth(auth.clone()).build()?,
            exploits: ApiClient::builder("Shodan", exploits_url).auth(auth).build()?,
        })
    }

    #[instrument(skip_all, fields(ip = %params.ip))]
    pub async fn host(self: Arc<Self>, params: HostParams) -> Result<CallToolResult, ToolError> {
        let mut query = Vec::new();
        if params.history {
            query.push(("history", "true".to_string()));
        }
        if params.minify {
            query.push(("minify", "true".to_string()));
        }
        let result = self
            .api
            .get_json(&format!("/shodan/host/{}", params.ip), &query)
            .await?;
        Ok(success_result(pretty_json(&result)))
    }

    #[instrument(skip_all, fields(query = %params.query, page = params.page))]
    pub async fn search(
        self: Arc<Self>,
        params: SearchParams,
    ) -> Result<CallToolResult, ToolError> {
        let result = self
            .api
            .get_json(
                "/shodan/host/search",
                &[("query", params.query), ("page", params.page.to_string())],
            )
            .await?;
        let digest = serde_json::to_value(search_digest(&result))?;
        Ok(success_result(pretty_json(&digest)))
    }

    #[instrument(skip_all, fields(count = params.hostnames.len()))]
    pub async fn dns_lookup(
        self: Arc<Self>,
        params: DnsLookupParams,
    ) -> Result<CallToolResult, ToolError> {
        let result = self
            .api
            .get_json("/dns/resolve", &[("hostnames", params.hostnames.join(","))])
            .await?;
        Ok(success_result(pretty_json(&result)))
    }

    #[instrument(skip_all, fields(count = params.ips.len()))]
    pub async fn reverse_dns(
        self: Arc<Self>,
        params: IpsParams,
    ) -> Result<CallToolResult, ToolError> {
        let result = self
            .api
            .get_json("/dns/reverse", &[("ips", params.ips.join(","))])
            .await?;
        Ok(success_result(pretty_json(&result)))
    }

    #[instrument(skip_all, fields(query = %params.query))]
    pub async fn exploits(
        self: Arc<Self>,
        params: ExploitsParams,
    ) -> Result<CallToolResult, ToolError> {
        let result = self
            .exploits
            .get_json("/api/search", &[("query", params.query)])
            .await?;
        Ok(success_result(pretty_json(&result)))
    }

    #[instrument(skip_all, fields(count = params.ips.len()))]
    pub async fn scan(self: Arc<Self>, params: IpsParams) -> Result<CallToolResult, ToolError> {
        let result = self
            .api
            .post_form("/shodan/scan", &[("ips", params.ips.join(","))])
            .await?;
        Ok(success_result(format!(
            "Scan requested.\nScan ID: {}\nCredits remaining: {}\n\nNote: Results will be available in Shodan once the scan completes.",
            scalar_at(&result, "/id", "unknown"),
            scalar_at(&result, "/credits_left", "unknown")
        )))
    }

    pub async fn account(self: Arc<Self>, _params: NoParams) -> Result<CallToolResult, ToolError> {
        let result = self.api.get_json("/account/profile", &[]).await?;
        Ok(success_result(pretty_json(&result)))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::HOST,
                "Get all available information on an IP address including open ports, services, and vulnerabilities",
                this.clone(),
                Self::host,
            ))
            .with_route(tool_route(
                Self::SEARCH,
                "Search Shodan for devices matching the query",
                this.clone(),
                Self::search,
            ))
            .with_route(tool_route(
                Self::DNS_LOOKUP,
                "Look up DNS information for a domain",
                this.clone(),
                Self::dns_lookup,
            ))
            .with_route(tool_route(
                Self::REVERSE_DNS,
                "Look up hostnames for IP addresses",
                this.clone(),
                Self::reverse_dns,
            ))
            .with_route(tool_route(
                Self::EXPLOITS,
                "Search for known exploits",
                this.clone(),
                Self::exploits,
            ))
            .with_route(tool_route(
                Self::SCAN,
                "Request Shodan to scan an IP or network",
                this.clone(),
                Self::scan,
            ))
            .with_route(tool_route(
                Self::ACCOUNT,
                "Get information about your Shodan account",
                this,
                Self::account,
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::definitions::common::result_text;
    use crate::core::http::testing::serve;
    use axum::extract::{Form, Query};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    async fn shodan() -> Arc<ShodanTools> {
        let app = Router::new()
            .route(
                "/shodan/host/search",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    assert_eq!(q["key"], "test-key");
                    assert_eq!(q["query"], "product:nginx city:\"San Francisco\"");
                    Json(json!({
                        "total": 1342,
                        "matches": [
                            {
                                "ip_str": "198.51.100.4",
                                "port": 443,
                                "org": "Example Hosting",
                                "hostnames": ["www.example.net"],
                                "product": "nginx",
                                "version": "1.25.3",
                                "location": {"city": "San Francisco", "country_name": "United States"}
                            },
                            {"ip_str": "198.51.100.9", "port": 80, "location": {}}
                        ]
                    }))
                }),
            )
            .route(
                "/shodan/host/{ip}",
                get(|| async {
                    let body = r#"{"error": "No information available for that IP."}"#;
                    (StatusCode::NOT_FOUND, body)
                }),
            )
            .route(
                "/shodan/scan",
                post(|Form(form): Form<HashMap<String, String>>| async move {
                    let count = form["ips"].split(',').count();
                    Json(json!({"id": "R2XRT5HH6X67PFAB", "count": count, "credits_left": 4}))
                }),
            )
            .route(
                "/api/search",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    Json(json!({"total": 1, "matches": [{"cve": [q["query"].clone()]}]}))
                }),
            );
        let base = serve(app).await;
        Arc::new(ShodanTools::with_endpoints("test-key", &base, &base).unwrap())
    }

    #[tokio::test]
    async fn test_search_digest() {
        let tools = shodan().await;
        let result = tools
            .search(SearchParams {
                query: "product:nginx city:\"San Francisco\"".into(),
                page: 1,
            })
            .await
            .unwrap();
        let digest: Value = serde_json::from_str(result_text(&result)).unwrap();
        assert_eq!(digest["total"], 1342);
        assert_eq!(digest["matches"], 2);
        assert_eq!(digest["results"][0]["location"], "San Francisco, United States");
        assert_eq!(digest["results"][0]["hostnames"][0], "www.example.net");
        assert_eq!(digest["results"][1]["location"], "Unknown, Unknown");
        assert!(digest["results"][1]["org"].is_null());
    }

    #[tokio::test]
    async fn test_scan_reports_id_and_credits() {
        let tools = shodan().await;
        let result = tools
            .scan(IpsParams {
                ips: vec!["198.51.100.0/24".into(), "203.0.113.8".into()],
            })
            .await
            .unwrap();
        assert!(result_text(&result).starts_with(
            "Scan requested.\nScan ID: R2XRT5HH6X67PFAB\nCredits remaining: 4\n"
        ));
    }

    #[tokio::test]
    async fn test_exploits_use_second_host() {
        let tools = shodan().await;
        let result = tools
            .exploits(ExploitsParams {
                query: "CVE-2021-44228".into(),
            })
            .await
            .unwrap();
        assert!(result_text(&result).contains("CVE-2021-44228"));
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced() {
        let tools = shodan().await;
        let err = tools
            .host(HostParams {
                ip: "192.0.2.1".into(),
                history: false,
                minify: true,
            })
            .await
            .unwrap_err();
        let result = err.into_call_result(ShodanTools::HOST).unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(
            result_text(&result),
            "shodan-host failed: Shodan API error: 404 - {\"error\": \"No information available for that IP.\"}"
        );
    }
}
