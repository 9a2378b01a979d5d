//! CrackMapExec/NetExec adapter: SMB, WinRM, LDAP and MSSQL enumeration.
//!
//! cme exits non-zero for many ordinary outcomes, so every run is reported
//! with stdout, or stderr when stdout is empty.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::instrument;

use super::common::success_result;
use crate::core::process::{CommandRunner, ExternalTool, SuccessPolicy};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::{NoParams, tool_route};

// ============================================================================
// Tool Parameters
// ============================================================================

fn enabled() -> bool {
    true
}

/// Parameters for `cme-smb-enum`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SmbEnumParams {
    /// Target IP, hostname, or CIDR range
    pub target: String,

    /// Username for authentication
    pub username: Option<String>,

    /// Password for authentication
    pub password: Option<String>,

    /// Domain name
    pub domain: Option<String>,

    /// Enumerate shares
    #[serde(default = "enabled")]
    pub shares: bool,

    /// Enumerate active sessions
    #[serde(default)]
    pub sessions: bool,

    /// Enumerate domain users
    #[serde(default)]
    pub users: bool,
}

/// Parameters for `cme-smb-spray`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SmbSprayParams {
    /// Target IP, hostname, or CIDR range
    pub target: String,

    /// List of usernames to test
    #[serde(rename = "userList")]
    pub user_list: Vec<String>,

    /// Password to spray
    pub password: String,

    /// Domain name
    pub domain: Option<String>,

    /// Continue spraying after finding valid credentials
    #[serde(default, rename = "continueOnSuccess")]
    pub continue_on_success: bool,
}

/// Parameters for `cme-winrm`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WinrmParams {
    /// Target IP or hostname
    pub target: String,

    /// Username
    pub username: String,

    /// Password
    pub password: String,

    /// Domain name
    pub domain: Option<String>,

    /// Command to execute
    pub command: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LdapQuery {
    Users,
    Groups,
    Computers,
    Trusts,
    Asreproast,
    Kerberoast,
}

impl LdapQuery {
    fn args(self) -> &'static [&'static str] {
        match self {
            Self::Users => &["--users"],
            Self::Groups => &["--groups"],
            Self::Computers => &["--computers"],
            Self::Trusts => &["--trusts"],
            Self::Asreproast => &["--asreproast", "/dev/stdout"],
            Self::Kerberoast => &["--kerberoasting", "/dev/stdout"],
        }
    }
}

/// Parameters for `cme-ldap`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct LdapParams {
    /// Domain controller IP or hostname
    pub target: String,

    /// Username
    pub username: String,

    /// Password
    pub password: String,

    /// Domain name
    pub domain: Option<String>,

    /// Type of LDAP query to perform
    pub query: Option<LdapQuery>,
}

/// Parameters for `cme-mssql`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MssqlParams {
    /// Target IP or hostname
    pub target: String,

    /// Username
    pub username: String,

    /// Password
    pub password: String,

    /// Domain name
    pub domain: Option<String>,

    /// SQL query to execute
    pub query: Option<String>,

    /// Use local authentication instead of domain
    #[serde(default, rename = "localAuth")]
    pub local_auth: bool,
}

/// `<protocol> <target> -u <user> -p <password> [-d <domain>]`
fn login_args(
    protocol: &str,
    target: &str,
    username: &str,
    password: &str,
    domain: Option<&str>,
) -> Vec<String> {
    let mut args = vec![
        protocol.to_string(),
        target.to_string(),
        "-u".to_string(),
        username.to_string(),
        "-p".to_string(),
        password.to_string(),
    ];
    if let Some(domain) = domain {
        args.extend(["-d".to_string(), domain.to_string()]);
    }
    args
}

fn smb_enum_args(params: &SmbEnumParams) -> Vec<String> {
    let mut args = vec!["smb".to_string(), params.target.clone()];
    // Credentials are only sent as a pair.
    if let (Some(username), Some(password)) = (&params.username, &params.password) {
        args.extend([
            "-u".to_string(),
            username.clone(),
            "-p".to_string(),
            password.clone(),
        ]);
    }
    if let Some(domain) = &params.domain {
        args.extend(["-d".to_string(), domain.clone()]);
    }
    for (flag, on) in [
        ("--shares", params.shares),
        ("--sessions", params.sessions),
        ("--users", params.users),
    ] {
        if on {
            args.push(flag.to_string());
        }
    }
    args
}

fn spray_args(params: &SmbSprayParams) -> Result<Vec<String>, ToolError> {
    if params.user_list.is_empty() {
        return Err(ToolError::invalid_arguments("userList must not be empty"));
    }
    let mut args = vec!["smb".to_string(), params.target.clone(), "-u".to_string()];
    args.extend(params.user_list.iter().cloned());
    args.extend(["-p".to_string(), params.password.clone()]);
    if let Some(domain) = &params.domain {
        args.extend(["-d".to_string(), domain.clone()]);
    }
    if params.continue_on_success {
        args.push("--continue-on-success".to_string());
    }
    Ok(args)
}

/// Lines where cme reports a valid login or local admin.
fn successful_logins(output: &str) -> usize {
    output
        .lines()
        .filter(|line| line.contains("[+]") || line.contains("Pwn3d!"))
        .count()
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct CrackMapExecTools {
    cme: ExternalTool,
}

impl CrackMapExecTools {
    pub const SMB_ENUM: &'static str = "cme-smb-enum";
    pub const SMB_SPRAY: &'static str = "cme-smb-spray";
    pub const WINRM: &'static str = "cme-winrm";
    pub const LDAP: &'static str = "cme-ldap";
    pub const MSSQL: &'static str = "cme-mssql";
    pub const PROTOCOLS: &'static str = "cme-protocols";

    pub fn new(binary: PathBuf, runner: Arc<CommandRunner>) -> Self {
        Self::with_tool(ExternalTool::new(binary, SuccessPolicy::always(), runner))
    }

    pub fn with_tool(cme: ExternalTool) -> Self {
        Self { cme }
    }

    async fn run(&self, args: Vec<String>) -> Result<String, ToolError> {
        let output = self.cme.run(args).await?;
        let text = output.stdout_or_stderr().to_string();
        Ok(output.annotate(text))
    }

    #[instrument(skip_all, fields(target = %params.target))]
    pub async fn smb_enum(
        self: Arc<Self>,
        params: SmbEnumParams,
    ) -> Result<CallToolResult, ToolError> {
        let text = self.run(smb_enum_args(&params)).await?;
        Ok(success_result(text))
    }

    #[instrument(skip_all, fields(target = %params.target, users = params.user_list.len()))]
    pub async fn smb_spray(
        self: Arc<Self>,
        params: SmbSprayParams,
    ) -> Result<CallToolResult, ToolError> {
        let output = self.run(spray_args(&params)?).await?;
        Ok(success_result(format!(
            "Password Spray Results:\n\nSuccessful: {}\n\n{output}",
            successful_logins(&output)
        )))
    }

    #[instrument(skip_all, fields(target = %params.target))]
    pub async fn winrm(self: Arc<Self>, params: WinrmParams) -> Result<CallToolResult, ToolError> {
        let mut args = login_args(
            "winrm",
            &params.target,
            &params.username,
            &params.password,
            params.domain.as_deref(),
        );
        if let Some(command) = params.command {
            args.extend(["-x".to_string(), command]);
        }
        let text = self.run(args).await?;
        Ok(success_result(text))
    }

    #[instrument(skip_all, fields(target = %params.target, query = ?params.query))]
    pub async fn ldap(self: Arc<Self>, params: LdapParams) -> Result<CallToolResult, ToolError> {
        let mut args = login_args(
            "ldap",
            &params.target,
            &params.username,
            &params.password,
            params.domain.as_deref(),
        );
        if let Some(query) = params.query {
            args.extend(query.args().iter().map(|a| a.to_string()));
        }
        let text = self.run(args).await?;
        Ok(success_result(text))
    }

    #[instrument(skip_all, fields(target = %params.target))]
    pub async fn mssql(self: Arc<Self>, params: MssqlParams) -> Result<CallToolResult, ToolError> {
        let mut args = login_args(
            "mssql",
            &params.target,
            &params.username,
            &params.password,
            params.domain.as_deref(),
        );
        if params.local_auth {
            args.push("--local-auth".to_string());
        }
        if let Some(query) = params.query {
            args.extend(["-q".to_string(), query]);
        }
        let text = self.run(args).await?;
        Ok(success_result(text))
    }

    pub async fn protocols(
        self: Arc<Self>,
        _params: NoParams,
    ) -> Result<CallToolResult, ToolError> {
        Ok(success_result(PROTOCOLS_TEXT.to_string()))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::SMB_ENUM,
                "Enumerate SMB shares and information on target hosts",
                this.clone(),
                Self::smb_enum,
            ))
            .with_route(tool_route(
                Self::SMB_SPRAY,
                "Perform password spraying against SMB",
                this.clone(),
                Self::smb_spray,
            ))
            .with_route(tool_route(
                Self::WINRM,
                "Execute commands via WinRM",
                this.clone(),
                Self::winrm,
            ))
            .with_route(tool_route(
                Self::LDAP,
                "Query LDAP/Active Directory",
                this.clone(),
                Self::ldap,
            ))
            .with_route(tool_route(
                Self::MSSQL,
                "Interact with Microsoft SQL Server",
                this.clone(),
                Self::mssql,
            ))
            .with_route(tool_route(
                Self::PROTOCOLS,
                "List supported protocols and modules",
                this,
                Self::protocols,
            ))
    }
}

const PROTOCOLS_TEXT: &str = "CrackMapExec/NetExec Supported Protocols:

PROTOCOLS:
  smb     - SMB protocol (file shares, authentication, command execution)
  winrm   - Windows Remote Management (PowerShell remoting)
  ldap    - LDAP/Active Directory queries
  mssql   - Microsoft SQL Server
  ssh     - SSH protocol
  rdp     - Remote Desktop Protocol
  wmi     - Windows Management Instrumentation
  ftp     - FTP protocol

COMMON MODULES (SMB):
  --shares          - Enumerate shares
  --sessions        - Enumerate active sessions
  --disks           - Enumerate disks
  --loggedon-users  - Enumerate logged on users
  --users           - Enumerate domain users
  --groups          - Enumerate local groups
  --local-groups    - Enumerate local group membership
  --pass-pol        - Get password policy
  --rid-brute       - RID cycling for user enumeration
  --sam             - Dump SAM hashes
  --lsa             - Dump LSA secrets
  --ntds            - Dump NTDS.dit (Domain Controller)

AUTHENTICATION OPTIONS:
  -u USER           - Username
  -p PASS           - Password
  -H HASH           - NTLM hash (pass-the-hash)
  -d DOMAIN         - Domain name
  --local-auth      - Use local authentication

EXECUTION MODULES:
  -x CMD            - Execute command
  -X PS_CMD         - Execute PowerShell command
  --exec-method     - Execution method (smbexec, wmiexec, atexec, mmcexec)";
