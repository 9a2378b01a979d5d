//! Thin REST client shared by the API-backed adapters.
//!
//! One [`ApiClient`] per remote service: a base URL, an authentication scheme
//! and a `reqwest::Client`. Non-2xx responses become [`HttpError::Status`]
//! carrying the response body, because scanners put the useful explanation
//! there.

use std::fmt;
use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors raised by REST calls.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The service answered with a non-success status.
    #[error("{service} API error: {status} - {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Connection, TLS or timeout failure.
    #[error("{service} request failed: {source}")]
    Request {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The body was not the JSON we expected.
    #[error("{service} returned an invalid response: {source}")]
    Decode {
        service: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The client could not be constructed.
    #[error("cannot build {service} client: {source}")]
    Build {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// How a service expects to be authenticated.
#[derive(Clone)]
pub enum ApiAuth {
    None,
    /// A custom header such as `X-Auth` or `x-apikey`.
    Header { name: &'static str, value: String },
    /// A query-string parameter such as `?key=`.
    QueryKey { name: &'static str, value: String },
}

impl fmt::Debug for ApiAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Header { name, .. } => write!(f, "Header({name}: [REDACTED])"),
            Self::QueryKey { name, .. } => write!(f, "QueryKey({name}=[REDACTED])"),
        }
    }
}

/// Builder for [`ApiClient`].
#[derive(Debug)]
pub struct ApiClientBuilder {
    service: &'static str,
    base_url: String,
    auth: ApiAuth,
    accept_invalid_certs: bool,
    timeout: Duration,
}

impl ApiClientBuilder {
    pub fn auth(mut self, auth: ApiAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Accept self-signed certificates (on-premise scanner appliances).
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<ApiClient, HttpError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .timeout(self.timeout)
            .user_agent(concat!("security_mcp_adapters/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| HttpError::Build {
                service: self.service,
                source,
            })?;

        Ok(ApiClient {
            http,
            service: self.service,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            auth: self.auth,
        })
    }
}

/// REST client bound to one service.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    service: &'static str,
    base_url: String,
    auth: ApiAuth,
}

impl ApiClient {
    pub fn builder(service: &'static str, base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder {
            service,
            base_url: base_url.into(),
            auth: ApiAuth::None,
            accept_invalid_certs: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `path`. Full URLs are passed through untouched.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    pub async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, HttpError> {
        let body = self.send(self.request(Method::GET, path).query(query)).await?;
        self.decode(&body)
    }

    pub async fn get_text(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<String, HttpError> {
        self.send(self.request(Method::GET, path).query(query)).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, HttpError> {
        let text = self.send(self.request(Method::POST, path).json(body)).await?;
        self.decode(&text)
    }

    /// POST an `application/x-www-form-urlencoded` body.
    pub async fn post_form(&self, path: &str, form: &[(&str, String)]) -> Result<Value, HttpError> {
        let encoded = serde_urlencoded::to_string(form).unwrap_or_default();
        let request = self
            .request(Method::POST, path)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(encoded);
        let text = self.send(request).await?;
        self.decode(&text)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!(service = self.service, %method, %url, "API request");
        let request = self
            .http
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.auth {
            ApiAuth::None => request,
            ApiAuth::Header { name, value } => request.header(*name, value),
            ApiAuth::QueryKey { name, value } => request.query(&[(*name, value)]),
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, HttpError> {
        let response = request.send().await.map_err(|source| HttpError::Request {
            service: self.service,
            source,
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|source| HttpError::Request {
            service: self.service,
            source,
        })?;
        if !status.is_success() {
            return Err(HttpError::Status {
                service: self.service,
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    /// Empty bodies decode to `null` (202/204 responses).
    fn decode(&self, body: &str) -> Result<Value, HttpError> {
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(body).map_err(|source| HttpError::Decode {
            service: self.service,
            source,
        })
    }
}
