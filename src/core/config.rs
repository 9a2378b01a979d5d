//! Configuration management for the adapter processes.
//!
//! Everything that is not an adapter's positional CLI argument comes from the
//! environment (optionally seeded from a `.env` file): logging, subprocess
//! limits, file-access confinement and REST credentials.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server identification and metadata.
    pub server: ServerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Subprocess execution limits.
    pub execution: ExecutionConfig,

    /// External API credentials configuration.
    pub credentials: CredentialsConfig,

    /// Security and path validation configuration.
    pub security: SecurityConfig,
}

/// Server identification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The name of the server as reported in logs. Defaults to the adapter name.
    pub name: Option<String>,

    /// The version of the server.
    pub version: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    pub level: String,
}

/// Limits applied to every spawned security tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// How many subprocesses may run at once; further calls wait.
    pub max_concurrent: usize,

    /// Per-stream capture cap in bytes. Output beyond it is drained and dropped.
    pub max_output_bytes: usize,

    /// Timeout for operations that do not declare their own.
    pub default_timeout_secs: u64,
}

impl ExecutionConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

/// Nessus REST credentials. Only present when all three variables are set.
#[derive(Clone, Serialize, Deserialize)]
pub struct NessusCredentials {
    pub url: String,
    pub access_key: String,
    pub secret_key: String,
}

/// Configuration for external API credentials.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Real Nessus API; mock mode when absent.
    pub nessus: Option<NessusCredentials>,

    /// Acunetix appliance URL (`ACUNETIX_URL`).
    pub acunetix_url: Option<String>,

    /// Acunetix API key (`ACUNETIX_API_KEY`).
    pub acunetix_api_key: Option<String>,
}

/// Custom Debug implementation to redact secrets from logs.
impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field(
                "nessus",
                &self.nessus.as_ref().map(|n| format!("{} [REDACTED]", n.url)),
            )
            .field("acunetix_url", &self.acunetix_url)
            .field(
                "acunetix_api_key",
                &self.acunetix_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Confinement for files the adapters read or list themselves
/// (screenshots, files hashed before a VirusTotal lookup).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Optional root directory. If None, no path restrictions are enforced.
    pub root_path: Option<PathBuf>,

    /// Whether symlinks may be followed. Targets are still checked against the root.
    pub allow_symlinks: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            root_path: None,
            allow_symlinks: true,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_output_bytes: 16 * 1024 * 1024,
            default_timeout_secs: 30 * 60,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                name: None,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            execution: ExecutionConfig::default(),
            credentials: CredentialsConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unparseable numeric values are ignored with a warning and the default kept.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(name) = std::env::var("MCP_SERVER_NAME") {
            config.server.name = Some(name);
        }

        if let Ok(level) = std::env::var("MCP_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Some(n) = parse_var::<usize>("MCP_EXEC_MAX_CONCURRENT") {
            config.execution.max_concurrent = n.max(1);
        }
        if let Some(n) = parse_var::<usize>("MCP_EXEC_MAX_OUTPUT_BYTES") {
            config.execution.max_output_bytes = n;
        }
        if let Some(n) = parse_var::<u64>("MCP_EXEC_TIMEOUT_SECS") {
            config.execution.default_timeout_secs = n;
        }

        config.credentials.nessus = match (
            std::env::var("NESSUS_URL"),
            std::env::var("NESSUS_ACCESS_KEY"),
            std::env::var("NESSUS_SECRET_KEY"),
        ) {
            (Ok(url), Ok(access_key), Ok(secret_key)) => Some(NessusCredentials {
                url,
                access_key,
                secret_key,
            }),
            _ => None,
        };

        config.credentials.acunetix_url = std::env::var("ACUNETIX_URL").ok();
        config.credentials.acunetix_api_key = std::env::var("ACUNETIX_API_KEY").ok();

        if let Ok(root_path) = std::env::var("MCP_ROOT_PATH") {
            config.security.root_path = Some(PathBuf::from(root_path));
            info!("Path security enabled: root directory set to {:?}", config.security.root_path);
        }

        if let Ok(allow_symlinks) = std::env::var("MCP_ALLOW_SYMLINKS") {
            config.security.allow_symlinks = allow_symlinks.parse().unwrap_or(true);
        }

        config
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid number", key, raw);
            None
        }
    }
}
