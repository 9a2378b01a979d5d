//! Single-URL scan and concurrent batch runner.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use futures::{StreamExt, stream};
use regex::Regex;
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Client, Url, redirect};
use serde::Serialize;
use tracing::{debug, warn};

use super::payload::{Payload, PayloadKind};
use super::version::{self, Verdict};

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const MAX_REDIRECTS: usize = 5;

static POWERED_BY_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Next\.js\s*([\d.]+(?:-[a-zA-Z]+\.\d+)?)").expect("valid regex")
});

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub safe_check: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            follow_redirects: true,
            max_redirects: MAX_REDIRECTS,
            safe_check: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    Unknown,
}

impl Confidence {
    pub fn label(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub url: String,
    pub vulnerable: bool,
    pub confidence: Confidence,
    pub method: &'static str,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_check: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub redirect_chain: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

impl ScanResult {
    fn new(url: &str, safe_check: bool) -> Self {
        Self {
            url: url.to_string(),
            vulnerable: false,
            confidence: Confidence::Unknown,
            method: if safe_check { "safe-check" } else { "rce-poc" },
            details: String::new(),
            version: None,
            version_check: None,
            status_code: None,
            headers: BTreeMap::new(),
            redirect_chain: Vec::new(),
            final_url: None,
            error: None,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    fn conclude(
        mut self,
        vulnerable: bool,
        confidence: Confidence,
        details: impl Into<String>,
    ) -> Self {
        self.vulnerable = vulnerable;
        self.confidence = confidence;
        self.details = details.into();
        self
    }
}

/// Adds `https://` when no scheme is given and drops one trailing slash.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let url = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    };
    url.strip_suffix('/').map(str::to_string).unwrap_or(url)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn extract_version(headers: &HeaderMap) -> Option<String> {
    let powered_by = header(headers, "x-powered-by");
    if !powered_by.contains("Next.js") {
        return None;
    }
    POWERED_BY_VERSION
        .captures(powered_by)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn has_rsc_headers(headers: &HeaderMap) -> bool {
    let vary = header(headers, "vary");
    vary.contains("RSC")
        || vary.contains("Next-Router")
        || header(headers, "content-type").contains("text/x-component")
}

fn is_followable_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Holds the HTTP client; redirects are followed by hand so each hop can be
/// checked for origin.
#[derive(Debug, Clone)]
pub struct Scanner {
    http: Client,
}

impl Scanner {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = Client::builder().redirect(redirect::Policy::none()).build()?;
        Ok(Self { http })
    }

    /// Never fails: transport problems are reported inside the result.
    pub async fn scan(&self, url: &str, options: ScanOptions) -> ScanResult {
        let normalized = normalize_url(url);
        let result = ScanResult::new(&normalized, options.safe_check);
        match self.exchange(&normalized, options, result.clone()).await {
            Ok(done) => done,
            Err(err) => {
                warn!(url = %normalized, "Next.js scan failed: {}", err);
                let mut failed = result.conclude(false, Confidence::Unknown, "Scan failed");
                failed.error = Some(err);
                failed
            }
        }
    }

    async fn exchange(
        &self,
        start: &str,
        options: ScanOptions,
        mut result: ScanResult,
    ) -> Result<ScanResult, String> {
        let payload = Payload::new(if options.safe_check {
            PayloadKind::SafeCheck
        } else {
            PayloadKind::Detection
        });
        let mut current = Url::parse(start).map_err(|e| format!("invalid URL: {e}"))?;

        for _ in 0..=options.max_redirects {
            let mut request = self
                .http
                .post(current.clone())
                .timeout(options.timeout)
                .body(payload.body.clone());
            for (name, value) in payload.headers() {
                request = request.header(name, value);
            }
            let response = request.send().await.map_err(|e| e.to_string())?;

            let status = response.status().as_u16();
            let headers = response.headers().clone();
            debug!(url = %current, status, "Next.js response");

            result.status_code = Some(status);
            result.headers = headers
                .iter()
                .filter_map(|(k, v)| {
                    Some((k.as_str().to_lowercase(), v.to_str().ok()?.to_string()))
                })
                .collect();
            result.version = extract_version(&headers);
            result.version_check = result.version.as_deref().map(version::check);

            if options.follow_redirects && is_followable_redirect(status) {
                let location = header(&headers, LOCATION.as_str());
                if !location.is_empty() {
                    let next = current
                        .join(location)
                        .map_err(|e| format!("invalid redirect location '{location}': {e}"))?;
                    if next.origin() == current.origin() {
                        result.redirect_chain.push(current.to_string());
                        result.final_url = Some(next.to_string());
                        current = next;
                        continue;
                    }
                    let details =
                        format!("Cross-origin redirect detected to {next}. Not followed.");
                    return Ok(result.conclude(false, Confidence::Unknown, details));
                }
            }

            let rsc = has_rsc_headers(&headers);
            if options.safe_check {
                if status == 500 {
                    let body = response.text().await.unwrap_or_default();
                    if body.contains("digest")
                        || body.contains("NEXT_")
                        || body.contains("Server Error")
                    {
                        return Ok(result.conclude(
                            true,
                            Confidence::Medium,
                            "Server returned 500 with RSC error patterns. Likely vulnerable.",
                        ));
                    }
                }
            } else {
                let expected = payload.expected();
                if header(&headers, "x-action-redirect").contains(expected) {
                    let details = format!(
                        "RCE confirmed! X-Action-Redirect contains \"{expected}\" (41*271=11111)"
                    );
                    return Ok(result.conclude(true, Confidence::High, details));
                }
                let body = response.text().await.unwrap_or_default();
                if body.contains(expected) && rsc {
                    let details = format!("Possible RCE - response body contains \"{expected}\"");
                    return Ok(result.conclude(true, Confidence::Medium, details));
                }
            }

            return Ok(if rsc {
                result.conclude(
                    false,
                    Confidence::Medium,
                    "RSC headers detected but no vulnerability indicators found",
                )
            } else {
                result.conclude(
                    false,
                    Confidence::Low,
                    "No RSC headers or vulnerability indicators found",
                )
            });
        }

        let details = format!("Maximum redirects ({}) reached", options.max_redirects);
        Ok(result.conclude(false, Confidence::Unknown, details))
    }

    /// Scan every URL with at most `concurrency` requests in flight. Results
    /// come back in completion order.
    pub async fn batch(
        &self,
        urls: &[String],
        concurrency: usize,
        options: ScanOptions,
    ) -> Vec<ScanResult> {
        stream::iter(urls.to_vec())
            .map(|url| async move { self.scan(&url, options).await })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::http::testing::serve;
    use axum::Router;
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::routing::post;

    fn options() -> ScanOptions {
        ScanOptions {
            timeout: Duration::from_secs(5),
            ..ScanOptions::default()
        }
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("shop.example.com/"), "https://shop.example.com");
        assert_eq!(normalize_url("http://10.0.0.1:3000"), "http://10.0.0.1:3000");
    }

    #[tokio::test]
    async fn test_action_redirect_is_high_confidence() {
        let app = Router::new().route(
            "/",
            post(|headers: AxumHeaders| async move {
                assert_eq!(headers["next-action"], "$$ACTION_1");
                (
                    StatusCode::SEE_OTHER,
                    [
                        ("x-action-redirect", "/login?a=11111;push"),
                        ("x-powered-by", "Next.js 15.1.0"),
                    ],
                )
            }),
        );
        let base = serve(app).await;
        let scanner = Scanner::new().unwrap();
        let result = scanner
            .scan(&base, ScanOptions { follow_redirects: false, ..options() })
            .await;
        assert!(result.vulnerable);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.version.as_deref(), Some("15.1.0"));
        assert!(result.version_check.unwrap().vulnerable);
    }

    #[tokio::test]
    async fn test_same_origin_redirect_is_followed() {
        let app = Router::new()
            .route(
                "/",
                post(|| async { (StatusCode::TEMPORARY_REDIRECT, [("location", "/app")]) }),
            )
            .route(
                "/app",
                post(|| async { ([("vary", "RSC, Next-Router-State-Tree")], "ok") }),
            );
        let base = serve(app).await;
        let result = Scanner::new().unwrap().scan(&base, options()).await;
        assert!(!result.vulnerable);
        assert_eq!(result.confidence, Confidence::Medium);
        assert_eq!(result.redirect_chain, vec![format!("{base}/")]);
        assert_eq!(result.final_url, Some(format!("{base}/app")));
    }

    #[tokio::test]
    async fn test_cross_origin_redirect_stops() {
        let app = Router::new().route(
            "/",
            post(|| async { (StatusCode::FOUND, [("location", "https://elsewhere.example/")]) }),
        );
        let base = serve(app).await;
        let result = Scanner::new().unwrap().scan(&base, options()).await;
        assert_eq!(result.confidence, Confidence::Unknown);
        assert!(
            result
                .details
                .starts_with("Cross-origin redirect detected to https://elsewhere.example/")
        );
    }

    #[tokio::test]
    async fn test_redirect_loop_hits_limit() {
        let app = Router::new().route(
            "/",
            post(|| async { (StatusCode::TEMPORARY_REDIRECT, [("location", "/")]) }),
        );
        let base = serve(app).await;
        let result = Scanner::new().unwrap().scan(&base, options()).await;
        assert_eq!(result.details, "Maximum redirects (5) reached");
        assert_eq!(result.redirect_chain.len(), 6);
    }

    #[tokio::test]
    async fn test_safe_check_error_digest() {
        let app = Router::new().route(
            "/",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "<html>Application error: digest 2338785109</html>",
                )
            }),
        );
        let base = serve(app).await;
        let result = Scanner::new()
            .unwrap()
            .scan(&base, ScanOptions { safe_check: true, ..options() })
            .await;
        assert!(result.vulnerable);
        assert_eq!(result.method, "safe-check");
        assert_eq!(result.confidence, Confidence::Medium);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_failed_result() {
        let result = Scanner::new()
            .unwrap()
            .scan("http://127.0.0.1:1", options())
            .await;
        assert_eq!(result.details, "Scan failed");
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_batch_returns_one_result_per_url() {
        let app = Router::new().route("/", post(|| async { "plain" }));
        let base = serve(app).await;
        let urls = vec![base.clone(), "http://127.0.0.1:1".to_string(), base];
        let results = Scanner::new().unwrap().batch(&urls, 2, options()).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|r| r.error.is_some()).count(), 1);
        assert_eq!(
            results.iter().filter(|r| r.confidence == Confidence::Low).count(),
            2
        );
    }
}
