//! hydra adapter: online password attacks against network services.
//!
//! hydra's exit code says little about whether credentials were found, so
//! every run is reported with stdout and stderr combined.

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::instrument;

use super::common::success_result;
use crate::core::process::{CommandRunner, ExternalTool, SuccessPolicy};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::{NoParams, tool_route};

const ATTACK_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const SSH_TIMEOUT: Duration = Duration::from_secs(15 * 60);

// ============================================================================
// Tool Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Service {
    Ssh,
    Ftp,
    Telnet,
    Smtp,
    HttpGet,
    HttpPost,
    HttpGetForm,
    HttpPostForm,
    HttpsGet,
    HttpsPost,
    Mysql,
    Mssql,
    Postgres,
    Rdp,
    Vnc,
    Smb,
    Ldap,
    Pop3,
    Imap,
    Snmp,
}

impl Service {
    fn as_str(self) -> &'static str {
        match self {
            Self::Ssh => "ssh",
            Self::Ftp => "ftp",
            Self::Telnet => "telnet",
            Self::Smtp => "smtp",
            Self::HttpGet => "http-get",
            Self::HttpPost => "http-post",
            Self::HttpGetForm => "http-get-form",
            Self::HttpPostForm => "http-post-form",
            Self::HttpsGet => "https-get",
            Self::HttpsPost => "https-post",
            Self::Mysql => "mysql",
            Self::Mssql => "mssql",
            Self::Postgres => "postgres",
            Self::Rdp => "rdp",
            Self::Vnc => "vnc",
            Self::Smb => "smb",
            Self::Ldap => "ldap",
            Self::Pop3 => "pop3",
            Self::Imap => "imap",
            Self::Snmp => "snmp",
        }
    }
}

fn default_threads() -> u32 {
    16
}

fn default_wait() -> u32 {
    30
}

/// Parameters for `hydra-attack`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AttackParams {
    /// Target IP or hostname
    pub target: String,

    /// Service/protocol to attack
    pub service: Service,

    /// Target port (uses default if not specified)
    pub port: Option<u16>,

    /// Single username to test
    pub username: Option<String>,

    /// Path to username wordlist
    #[serde(rename = "userList")]
    pub user_list: Option<String>,

    /// Single password to test
    pub password: Option<String>,

    /// Path to password wordlist
    #[serde(rename = "passwordList")]
    pub password_list: Option<String>,

    /// Number of parallel tasks
    #[serde(default = "default_threads")]
    pub threads: u32,

    /// Timeout per connection attempt
    #[serde(default = "default_wait")]
    pub timeout: u32,

    /// Show verbose output
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FormMethod {
    Get,
    #[default]
    Post,
}

fn default_http_port() -> u16 {
    80
}

/// Parameters for `hydra-http-form`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct HttpFormParams {
    /// Target hostname/IP
    pub target: String,

    /// Target port
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Use HTTPS
    #[serde(default)]
    pub ssl: bool,

    /// HTTP method
    #[serde(default)]
    pub method: FormMethod,

    /// Login form path (e.g., '/login.php')
    pub path: String,

    /// Form parameters (e.g., 'user=^USER^&pass=^PASS^')
    #[serde(rename = "formParams")]
    pub form_params: String,

    /// String that indicates failed login
    #[serde(rename = "failString")]
    pub fail_string: String,

    /// Path to username wordlist
    #[serde(rename = "userList")]
    pub user_list: String,

    /// Path to password wordlist
    #[serde(rename = "passwordList")]
    pub password_list: String,

    /// Parallel tasks
    #[serde(default = "default_threads")]
    pub threads: u32,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_ssh_threads() -> u32 {
    4
}

/// Parameters for `hydra-ssh`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SshParams {
    /// Target IP or hostname
    pub target: String,

    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Path to username wordlist
    #[serde(rename = "userList")]
    pub user_list: String,

    /// Path to password wordlist
    #[serde(rename = "passwordList")]
    pub password_list: String,

    /// Parallel tasks (keep low for SSH)
    #[serde(default = "default_ssh_threads")]
    pub threads: u32,
}

fn default_smb_threads() -> u32 {
    8
}

/// Parameters for `hydra-smb`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SmbParams {
    /// Target IP or hostname
    pub target: String,

    /// Windows domain
    pub domain: Option<String>,

    /// Path to username wordlist
    #[serde(rename = "userList")]
    pub user_list: String,

    /// Path to password wordlist
    #[serde(rename = "passwordList")]
    pub password_list: String,

    /// Parallel tasks
    #[serde(default = "default_smb_threads")]
    pub threads: u32,
}

/// Build the attack argv. A single value wins over its wordlist; one of the
/// two is required for both logins and passwords.
fn attack_args(params: &AttackParams) -> Result<Vec<String>, ToolError> {
    let mut args = Vec::new();
    match (&params.username, &params.user_list) {
        (Some(username), _) => args.extend(["-l".to_string(), username.clone()]),
        (None, Some(list)) => args.extend(["-L".to_string(), list.clone()]),
        (None, None) => {
            return Err(ToolError::invalid_arguments(
                "Either username or userList must be provided",
            ));
        }
    }
    match (&params.password, &params.password_list) {
        (Some(password), _) => args.extend(["-p".to_string(), password.clone()]),
        (None, Some(list)) => args.extend(["-P".to_string(), list.clone()]),
        (None, None) => {
            return Err(ToolError::invalid_arguments(
                "Either password or passwordList must be provided",
            ));
        }
    }
    args.extend([
        "-t".to_string(),
        params.threads.to_string(),
        "-W".to_string(),
        params.timeout.to_string(),
    ]);
    if params.verbose {
        args.push("-V".to_string());
    }
    if let Some(port) = params.port {
        args.extend(["-s".to_string(), port.to_string()]);
    }
    args.push(params.target.clone());
    args.push(params.service.as_str().to_string());
    Ok(args)
}

fn form_service(ssl: bool, method: FormMethod) -> &'static str {
    match (ssl, method) {
        (false, FormMethod::Post) => "http-post-form",
        (false, FormMethod::Get) => "http-get-form",
        (true, FormMethod::Post) => "https-post-form",
        (true, FormMethod::Get) => "https-get-form",
    }
}

static FOUND_CREDENTIAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[.*?\].*?login:.*?password:.*").expect("valid regex")
});

/// Lines where hydra reports a valid login.
fn found_credentials(output: &str) -> usize {
    FOUND_CREDENTIAL.find_iter(output).count()
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct HydraTools {
    hydra: ExternalTool,
}

impl HydraTools {
    pub const ATTACK: &'static str = "hydra-attack";
    pub const HTTP_FORM: &'static str = "hydra-http-form";
    pub const SSH: &'static str = "hydra-ssh";
    pub const SMB: &'static str = "hydra-smb";
    pub const SERVICES: &'static str = "hydra-services";

    pub fn new(binary: PathBuf, runner: Arc<CommandRunner>) -> Self {
        Self::with_tool(ExternalTool::new(binary, SuccessPolicy::always(), runner))
    }

    pub fn with_tool(hydra: ExternalTool) -> Self {
        Self { hydra }
    }

    #[instrument(skip_all, fields(target = %params.target, service = params.service.as_str()))]
    pub async fn attack(
        self: Arc<Self>,
        params: AttackParams,
    ) -> Result<CallToolResult, ToolError> {
        let args = attack_args(&params)?;
        let spec = self.hydra.command(args).timeout(ATTACK_TIMEOUT);
        let output = self.hydra.run_spec(spec).await?;
        let combined = output.combined();
        let text = format!(
            "Hydra Attack Results:\nTarget: {}\nService: {}\n\n{}\n\nFound Credentials: {}",
            params.target,
            params.service.as_str(),
            combined,
            found_credentials(&combined)
        );
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(target = %params.target, path = %params.path))]
    pub async fn http_form(
        self: Arc<Self>,
        params: HttpFormParams,
    ) -> Result<CallToolResult, ToolError> {
        let form = format!(
            "{}:{}:{}",
            params.path, params.form_params, params.fail_string
        );
        let args = [
            "-L".to_string(),
            params.user_list,
            "-P".to_string(),
            params.password_list,
            "-t".to_string(),
            params.threads.to_string(),
            "-s".to_string(),
            params.port.to_string(),
            params.target.clone(),
            form_service(params.ssl, params.method).to_string(),
            form,
        ];
        let spec = self.hydra.command(args).timeout(ATTACK_TIMEOUT);
        let output = self.hydra.run_spec(spec).await?;
        let method = match params.method {
            FormMethod::Get => "GET",
            FormMethod::Post => "POST",
        };
        let text = format!(
            "HTTP Form Attack Results:\nTarget: {}{}\nMethod: {}\n\n{}",
            params.target,
            params.path,
            method,
            output.combined()
        );
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(target = %params.target, port = params.port))]
    pub async fn ssh(self: Arc<Self>, params: SshParams) -> Result<CallToolResult, ToolError> {
        let args = [
            "-L".to_string(),
            params.user_list,
            "-P".to_string(),
            params.password_list,
            "-t".to_string(),
            params.threads.to_string(),
            "-s".to_string(),
            params.port.to_string(),
            "-V".to_string(),
            params.target.clone(),
            "ssh".to_string(),
        ];
        let spec = self.hydra.command(args).timeout(SSH_TIMEOUT);
        let output = self.hydra.run_spec(spec).await?;
        let text = format!(
            "SSH Brute Force Results:\nTarget: {}:{}\n\n{}",
            params.target,
            params.port,
            output.combined()
        );
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(target = %params.target))]
    pub async fn smb(self: Arc<Self>, params: SmbParams) -> Result<CallToolResult, ToolError> {
        let mut args = vec![
            "-L".to_string(),
            params.user_list,
            "-P".to_string(),
            params.password_list,
            "-t".to_string(),
            params.threads.to_string(),
            "-V".to_string(),
        ];
        if let Some(domain) = &params.domain {
            args.extend(["-m".to_string(), format!("DOMAIN:{domain}")]);
        }
        args.extend([params.target.clone(), "smb".to_string()]);

        let spec = self.hydra.command(args).timeout(ATTACK_TIMEOUT);
        let output = self.hydra.run_spec(spec).await?;
        let text = format!(
            "SMB Brute Force Results:\nTarget: {}\nDomain: {}\n\n{}",
            params.target,
            params.domain.as_deref().unwrap_or("N/A"),
            output.combined()
        );
        Ok(success_result(output.annotate(text)))
    }

    pub async fn services(self: Arc<Self>, _params: NoParams) -> Result<CallToolResult, ToolError> {
        Ok(success_result(SERVICES_TEXT.to_string()))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::ATTACK,
                "Perform online password attack against a service (for authorized testing only)",
                this.clone(),
                Self::attack,
            ))
            .with_route(tool_route(
                Self::HTTP_FORM,
                "Attack HTTP login forms (GET or POST)",
                this.clone(),
                Self::http_form,
            ))
            .with_route(tool_route(
                Self::SSH,
                "Perform SSH brute force attack",
                this.clone(),
                Self::ssh,
            ))
            .with_route(tool_route(
                Self::SMB,
                "Perform SMB/Windows authentication brute force",
                this.clone(),
                Self::smb,
            ))
            .with_route(tool_route(
                Self::SERVICES,
                "List all supported services and protocols",
                this,
                Self::services,
            ))
    }
}

const SERVICES_TEXT: &str = "Hydra Supported Services:

REMOTE ACCESS:
  ssh         - Secure Shell
  telnet      - Telnet
  rdp         - Remote Desktop Protocol
  vnc         - Virtual Network Computing
  rsh         - Remote Shell
  rexec       - Remote Execution
  rlogin      - Remote Login

WEB:
  http-get         - HTTP GET basic auth
  http-post        - HTTP POST basic auth
  http-get-form    - HTTP GET form login
  http-post-form   - HTTP POST form login
  https-get        - HTTPS GET
  https-post       - HTTPS POST
  https-get-form   - HTTPS GET form
  https-post-form  - HTTPS POST form

EMAIL:
  smtp        - SMTP authentication
  pop3        - POP3
  imap        - IMAP
  pop3s       - POP3 over SSL
  imaps       - IMAP over SSL

FILE TRANSFER:
  ftp         - FTP
  ftps        - FTP over SSL
  smb         - SMB/CIFS
  smb2        - SMBv2

DATABASE:
  mysql       - MySQL
  mssql       - Microsoft SQL Server
  postgres    - PostgreSQL
  oracle      - Oracle
  mongodb     - MongoDB

DIRECTORY:
  ldap        - LDAP
  ldaps       - LDAP over SSL

OTHER:
  snmp        - SNMP community strings
  socks5      - SOCKS5 proxy
  cisco       - Cisco devices
  cisco-enable - Cisco enable password

Form Syntax:
  http-post-form \"/login:user=^USER^&pass=^PASS^:Invalid\"
  - ^USER^ = username placeholder
  - ^PASS^ = password placeholder
  - Last part = failure string";
