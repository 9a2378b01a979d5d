//! VirusTotal adapter: URL, file, IP and domain reputation through the v3 API.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use super::common::{
    array_at, pretty_json, require_http_url, str_at, success_result, truncate_chars, value_at,
};
use crate::core::config::SecurityConfig;
use crate::core::http::{ApiAuth, ApiClient, HttpError};
use crate::core::security::confine_path;
use crate::domains::tools::ToolError;
use crate::domains::tools::route::tool_route;

pub const API_URL: &str = "https://www.virustotal.com/api/v3";

const WHOIS_MAX_CHARS: usize = 500;

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for `vt-scan-url` and `vt-url-report`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UrlParams {
    /// URL to scan or look up
    pub url: String,
}

/// Parameters for `vt-hash-report`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct HashParams {
    /// File hash (MD5, SHA1, or SHA256)
    pub hash: String,
}

/// Parameters for `vt-ip-report`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct IpParams {
    /// IP address to look up
    pub ip: String,
}

/// Parameters for `vt-domain-report`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DomainParams {
    /// Domain to look up
    pub domain: String,
}

/// Parameters for `vt-scan-file`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ScanFileParams {
    /// Path to the file to scan
    #[serde(rename = "filePath")]
    pub file_path: String,
}

fn default_search_limit() -> u32 {
    10
}

/// Parameters for `vt-search`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// VT search query, e.g. `engines:kaspersky positives:5+`, `type:peexe size:100kb-`,
    /// `tag:ransomware`, `fs:2024-01-01+`
    pub query: String,

    /// Number of results
    #[serde(default = "default_search_limit")]
    pub limit: u32,
}

// ============================================================================
// Report digests
// ============================================================================

/// VirusTotal addresses URLs by their unpadded URL-safe base64 encoding.
fn url_id(url: &str) -> String {
    URL_SAFE_NO_PAD.encode(url.as_bytes())
}

/// First `n` elements of the array at `pointer`, or null when absent.
fn take_at(value: &Value, pointer: &str, n: usize) -> Value {
    match value.pointer(pointer) {
        Some(Value::Array(items)) => Value::Array(items.iter().take(n).cloned().collect()),
        _ => Value::Null,
    }
}

fn url_digest(report: &Value) -> Value {
    let attrs = value_at(report, "/data/attributes");
    json!({
        "url": value_at(&attrs, "/url"),
        "final_url": value_at(&attrs, "/last_final_url"),
        "scan_date": value_at(&attrs, "/last_analysis_date"),
        "stats": value_at(&attrs, "/last_analysis_stats"),
        "reputation": value_at(&attrs, "/reputation"),
        "categories": value_at(&attrs, "/categories"),
    })
}

fn file_digest(report: &Value) -> Value {
    let attrs = value_at(report, "/data/attributes");
    json!({
        "sha256": value_at(&attrs, "/sha256"),
        "sha1": value_at(&attrs, "/sha1"),
        "md5": value_at(&attrs, "/md5"),
        "file_type": value_at(&attrs, "/type_description"),
        "file_size": value_at(&attrs, "/size"),
        "names": take_at(&attrs, "/names", 5),
        "scan_date": value_at(&attrs, "/last_analysis_date"),
        "stats": value_at(&attrs, "/last_analysis_stats"),
        "reputation": value_at(&attrs, "/reputation"),
        "popular_threat_classification": value_at(&attrs, "/popular_threat_classification"),
        "tags": value_at(&attrs, "/tags"),
    })
}

fn ip_digest(ip: &str, report: &Value) -> Value {
    let attrs = value_at(report, "/data/attributes");
    let whois = attrs
        .pointer("/whois")
        .and_then(Value::as_str)
        .map_or(Value::Null, |w| Value::String(truncate_chars(w, WHOIS_MAX_CHARS)));
    json!({
        "ip": ip,
        "country": value_at(&attrs, "/country"),
        "as_owner": value_at(&attrs, "/as_owner"),
        "asn": value_at(&attrs, "/asn"),
        "reputation": value_at(&attrs, "/reputation"),
        "stats": value_at(&attrs, "/last_analysis_stats"),
        "whois": whois,
    })
}

fn domain_digest(domain: &str, report: &Value) -> Value {
    let attrs = value_at(report, "/data/attributes");
    json!({
        "domain": domain,
        "registrar": value_at(&attrs, "/registrar"),
        "creation_date": value_at(&attrs, "/creation_date"),
        "reputation": value_at(&attrs, "/reputation"),
        "stats": value_at(&attrs, "/last_analysis_stats"),
        "categories": value_at(&attrs, "/categories"),
        "popularity_ranks": value_at(&attrs, "/popularity_ranks"),
        "dns_records": take_at(&attrs, "/last_dns_records", 10),
    })
}

fn search_digest(result: &Value) -> Value {
    let items: Vec<Value> = array_at(result, "/data")
        .iter()
        .map(|item| {
            json!({
                "id": value_at(item, "/id"),
                "type": value_at(item, "/type"),
                "sha256": value_at(item, "/attributes/sha256"),
                "names": take_at(item, "/attributes/names", 3),
                "stats": value_at(item, "/attributes/last_analysis_stats"),
            })
        })
        .collect();
    Value::Array(items)
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct VirusTotalTools {
    api: ApiClient,
    security: SecurityConfig,
}

impl VirusTotalTools {
    pub const SCAN_URL: &'static str = "vt-scan-url";
    pub const URL_REPORT: &'static str = "vt-url-report";
    pub const HASH_REPORT: &'static str = "vt-hash-report";
    pub const IP_REPORT: &'static str = "vt-ip-report";
    pub const DOMAIN_REPORT: &'static str = "vt-domain-report";
    pub const SCAN_FILE: &'static str = "vt-scan-file";
    pub const SEARCH: &'static str = "vt-search";

    pub fn new(api_key: &str, security: SecurityConfig) -> Result<Self, HttpError> {
        Self::with_base_url(api_key, API_URL, security)
    }

    pub fn with_base_url(
        api_key: &str,
        base_url: &str,
        security: SecurityConfig,
    ) -> Result<Self, HttpError> {
        let api = ApiClient::builder("VirusTotal", base_url)
            .auth(ApiAuth::Header {
                name: "x-apikey",
                value: api_key.to_string(),
            })
            .build()?;
        Ok(Self { api, security })
    }

    #[instrument(skip_all, fields(url = %params.url))]
    pub async fn scan_url(self: Arc<Self>, params: UrlParams) -> Result<CallToolResult, ToolError> {
        require_http_url("url", &params.url)?;
        let result = self.api.post_form("/urls", &[("url", params.url)]).await?;
        Ok(success_result(format!(
            "URL submitted for scanning.\nAnalysis ID: {}\n\nUse vt-url-report to get results.",
            str_at(&result, "/data/id", "N/A")
        )))
    }

    #[instrument(skip_all, fields(url = %params.url))]
    pub async fn url_report(
        self: Arc<Self>,
        params: UrlParams,
    ) -> Result<CallToolResult, ToolError> {
        let report = self
            .api
            .get_json(&format!("/urls/{}", url_id(&params.url)), &[])
            .await?;
        Ok(success_result(pretty_json(&url_digest(&report))))
    }

    #[instrument(skip_all, fields(hash = %params.hash))]
    pub async fn hash_report(
        self: Arc<Self>,
        params: HashParams,
    ) -> Result<CallToolResult, ToolError> {
        let report = self
            .api
            .get_json(&format!("/files/{}", params.hash), &[])
            .await?;
        Ok(success_result(pretty_json(&file_digest(&report))))
    }

    #[instrument(skip_all, fields(ip = %params.ip))]
    pub async fn ip_report(self: Arc<Self>, params: IpParams) -> Result<CallToolResult, ToolError> {
        let report = self
            .api
            .get_json(&format!("/ip_addresses/{}", params.ip), &[])
            .await?;
        Ok(success_result(pretty_json(&ip_digest(&params.ip, &report))))
    }

    #[instrument(skip_all, fields(domain = %params.domain))]
    pub async fn domain_report(
        self: Arc<Self>,
        params: DomainParams,
    ) -> Result<CallToolResult, ToolError> {
        let report = self
            .api
            .get_json(&format!("/domains/{}", params.domain), &[])
            .await?;
        Ok(success_result(pretty_json(&domain_digest(&params.domain, &report))))
    }

    /// Look the file up by its SHA-256; files are never uploaded.
    #[instrument(skip_all, fields(path = %params.file_path))]
    pub async fn scan_file(
        self: Arc<Self>,
        params: ScanFileParams,
    ) -> Result<CallToolResult, ToolError> {
        let path = confine_path(Path::new(&params.file_path), &self.security)?;
        let data = fs::read(&path)?;
        let hash = format!("{:x}", Sha256::digest(&data));
        debug!(%hash, bytes = data.len(), "Hashed local file");

        match self.api.get_json(&format!("/files/{hash}"), &[]).await {
            Ok(report) if !value_at(&report, "/data").is_null() => {
                let stats = value_at(&report, "/data/attributes/last_analysis_stats");
                Ok(success_result(format!(
                    "File already analyzed:\nSHA256: {hash}\nStats: {}",
                    pretty_json(&stats)
                )))
            }
            Ok(_) | Err(HttpError::Status { status: 404, .. }) => Ok(success_result(format!(
                "File not found in VirusTotal database.\nSHA256: {hash}\n\n\
                 Note: File upload requires additional implementation and larger API quota."
            ))),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip_all, fields(query = %params.query, limit = params.limit))]
    pub async fn search(
        self: Arc<Self>,
        params: SearchParams,
    ) -> Result<CallToolResult, ToolError> {
        let result = self
            .api
            .get_json(
                "/intelligence/search",
                &[("query", params.query), ("limit", params.limit.to_string())],
            )
            .await?;
        Ok(success_result(pretty_json(&search_digest(&result))))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::SCAN_URL,
                "Submit a URL for scanning by VirusTotal",
                this.clone(),
                Self::scan_url,
            ))
            .with_route(tool_route(
                Self::URL_REPORT,
                "Get the analysis report for a URL",
                this.clone(),
                Self::url_report,
            ))
            .with_route(tool_route(
                Self::HASH_REPORT,
                "Get the analysis report for a file hash",
                this.clone(),
                Self::hash_report,
            ))
            .with_route(tool_route(
                Self::IP_REPORT,
                "Get information about an IP address",
                this.clone(),
                Self::ip_report,
            ))
            .with_route(tool_route(
                Self::DOMAIN_REPORT,
                "Get information about a domain",
                this.clone(),
                Self::domain_report,
            ))
            .with_route(tool_route(
                Self::SCAN_FILE,
                "Look up a local file in VirusTotal by its SHA-256 hash",
                this.clone(),
                Self::scan_file,
            ))
            .with_route(tool_route(
                Self::SEARCH,
                "Search VirusTotal using their query language",
                this,
                Self::search,
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::http::testing::serve;
    use crate::domains::tools::definitions::common::result_text;
    use axum::extract::Path as UrlPath;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use tempfile::TempDir;

    // sha256("hello\n")
    const KNOWN_SHA256: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    async fn virustotal(security: SecurityConfig) -> Arc<VirusTotalTools> {
        let app = Router::new()
            .route(
                "/urls/{id}",
                get(|UrlPath(id): UrlPath<String>, headers: HeaderMap| async move {
                    assert_eq!(headers["x-apikey"], "vt-key");
                    Json(json!({"data": {"id": id, "attributes": {
                        "url": "https://example.com/?q=a+b",
                        "last_analysis_stats": {"harmless": 70, "malicious": 1},
                        "reputation": -3
                    }}}))
                }),
            )
            .route(
                "/files/{hash}",
                get(|UrlPath(hash): UrlPath<String>| async move {
                    if hash == KNOWN_SHA256 {
                        Json(json!({"data": {"attributes": {
                            "last_analysis_stats": {"malicious": 0, "undetected": 60}
                        }}}))
                        .into_response()
                    } else {
                        let body = r#"{"error":{"code":"NotFoundError"}}"#;
                        (StatusCode::NOT_FOUND, body).into_response()
                    }
                }),
            )
            .route(
                "/ip_addresses/{ip}",
                get(|| async {
                    Json(json!({"data": {"attributes": {
                        "country": "US",
                        "whois": "x".repeat(900),
                        "last_analysis_stats": {"malicious": 2}
                    }}}))
                }),
            );
        let base = serve(app).await;
        Arc::new(VirusTotalTools::with_base_url("vt-key", &base, security).unwrap())
    }

    #[test]
    fn test_url_id_is_unpadded_url_safe() {
        assert_eq!(url_id("https://example.com/?q=a+b"), "aHR0cHM6Ly9leGFtcGxlLmNvbS8_cT1hK2I");
        assert!(!url_id("https://a.b").contains('='));
    }

    #[tokio::test]
    async fn test_url_report_digest() {
        let tools = virustotal(SecurityConfig::default()).await;
        let result = tools
            .url_report(UrlParams {
                url: "https://example.com/?q=a+b".into(),
            })
            .await
            .unwrap();
        let digest: Value = serde_json::from_str(result_text(&result)).unwrap();
        assert_eq!(digest["stats"]["malicious"], 1);
        assert_eq!(digest["reputation"], -3);
        assert!(digest["final_url"].is_null());
    }

    #[tokio::test]
    async fn test_ip_whois_is_cut() {
        let tools = virustotal(SecurityConfig::default()).await;
        let result = tools
            .ip_report(IpParams {
                ip: "198.51.100.23".into(),
            })
            .await
            .unwrap();
        let digest: Value = serde_json::from_str(result_text(&result)).unwrap();
        assert_eq!(digest["ip"], "198.51.100.23");
        assert_eq!(digest["whois"].as_str().unwrap().chars().count(), WHOIS_MAX_CHARS);
    }

    #[tokio::test]
    async fn test_scan_file_known_and_unknown() {
        let dir = TempDir::new().unwrap();
        let known = dir.path().join("known.txt");
        let unknown = dir.path().join("unknown.bin");
        fs::write(&known, "hello\n").unwrap();
        fs::write(&unknown, [0u8, 1, 2, 3]).unwrap();
        let tools = virustotal(SecurityConfig::default()).await;

        let result = tools
            .clone()
            .scan_file(ScanFileParams {
                file_path: known.to_string_lossy().into_owned(),
            })
            .await
            .unwrap();
        assert!(result_text(&result).starts_with(&format!(
            "File already analyzed:\nSHA256: {KNOWN_SHA256}\nStats: {{"
        )));

        let result = tools
            .scan_file(ScanFileParams {
                file_path: unknown.to_string_lossy().into_owned(),
            })
            .await
            .unwrap();
        assert!(
            result_text(&result).starts_with("File not found in VirusTotal database.\nSHA256: ")
        );
    }

    #[tokio::test]
    async fn test_scan_file_respects_root() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let file = outside.path().join("sample.exe");
        fs::write(&file, b"MZ").unwrap();
        let tools = virustotal(SecurityConfig {
            root_path: Some(root.path().to_path_buf()),
            allow_symlinks: false,
        })
        .await;
        let err = tools
            .scan_file(ScanFileParams {
                file_path: file.to_string_lossy().into_owned(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Path(_)));
    }

    #[test]
    fn test_domain_digest_limits_dns_records() {
        let records: Vec<Value> = (0..25)
            .map(|i| json!({"type": "A", "value": format!("192.0.2.{i}")}))
            .collect();
        let report = json!({"data": {"attributes": {
            "registrar": "Example Registrar",
            "last_dns_records": records
        }}});
        let digest = domain_digest("example.com", &report);
        assert_eq!(digest["dns_records"].as_array().unwrap().len(), 10);
        assert_eq!(digest["registrar"], "Example Registrar");
    }
}
