//! Metasploit adapter: msfconsole in batch mode (`-q -x "<cmds>; exit"`) and
//! msfvenom for payload generation.
//!
//! msfconsole exit codes are unreliable, so console runs are never judged.
//! Each console operation has its own deadline; a run that hits it keeps the
//! output printed so far with a `[TIMEOUT - ...]` line appended.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::instrument;

use super::common::success_result;
use crate::core::process::{CommandRunner, CommandSpec, ExternalTool, SuccessPolicy};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::{NoParams, tool_route};

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(60);
const CHECK_TIMEOUT: Duration = Duration::from_secs(120);
const SCAN_TIMEOUT: Duration = Duration::from_secs(300);
const DB_NMAP_TIMEOUT: Duration = Duration::from_secs(600);

const TIMEOUT_MARKER: &str = "[TIMEOUT - Command execution exceeded time limit]";

// ============================================================================
// Tool Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    Exploit,
    Auxiliary,
    Post,
    Payload,
    Encoder,
    Nop,
}

impl ModuleType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Exploit => "exploit",
            Self::Auxiliary => "auxiliary",
            Self::Post => "post",
            Self::Payload => "payload",
            Self::Encoder => "encoder",
            Self::Nop => "nop",
        }
    }
}

/// Parameters for `msf-search`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Search query (e.g., 'type:exploit name:smb')
    pub query: String,

    /// Filter by module type
    #[serde(rename = "moduleType")]
    pub module_type: Option<ModuleType>,
}

/// Parameters for `msf-info`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct InfoParams {
    /// Full module path (e.g., 'exploit/windows/smb/ms17_010_eternalblue')
    #[serde(rename = "modulePath")]
    pub module_path: String,
}

/// Parameters for `msf-exploit-check`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExploitCheckParams {
    /// Exploit module path
    #[serde(rename = "modulePath")]
    pub module_path: String,

    /// Target host(s) - IP or CIDR
    pub rhosts: String,

    /// Target port (if different from default)
    pub rport: Option<u16>,

    /// Additional module options as key-value pairs
    #[serde(rename = "additionalOptions", default)]
    pub additional_options: BTreeMap<String, String>,
}

fn default_threads() -> u32 {
    10
}

/// Parameters for `msf-auxiliary-scan`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AuxiliaryScanParams {
    /// Auxiliary module path (e.g., 'auxiliary/scanner/smb/smb_version')
    #[serde(rename = "modulePath")]
    pub module_path: String,

    /// Target host(s) - IP, CIDR, or range
    pub rhosts: String,

    /// Number of concurrent threads
    #[serde(default = "default_threads")]
    pub threads: u32,

    /// Additional module options
    #[serde(rename = "additionalOptions", default)]
    pub additional_options: BTreeMap<String, String>,
}

fn default_iterations() -> u32 {
    1
}

/// Parameters for `msfvenom-generate`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GenerateParams {
    /// Payload to use (e.g., 'windows/meterpreter/reverse_tcp')
    pub payload: String,

    /// Output format (exe, elf, raw, python, powershell, etc.)
    pub format: String,

    /// Listener host (your IP)
    pub lhost: String,

    /// Listener port
    pub lport: u16,

    /// Output file path
    #[serde(rename = "outputFile")]
    pub output_file: Option<String>,

    /// Encoder to use (e.g., 'x86/shikata_ga_nai')
    pub encoder: Option<String>,

    /// Encoding iterations
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Characters to avoid (e.g., '\x00\x0a')
    #[serde(rename = "badChars")]
    pub bad_chars: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    Payloads,
    Formats,
    Encoders,
    Platforms,
    Archs,
}

impl ListType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Payloads => "payloads",
            Self::Formats => "formats",
            Self::Encoders => "encoders",
            Self::Platforms => "platforms",
            Self::Archs => "archs",
        }
    }
}

/// Parameters for `msfvenom-list`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListParams {
    /// What to list
    #[serde(rename = "listType")]
    pub list_type: ListType,

    /// Filter results (e.g., 'windows' for Windows payloads)
    pub filter: Option<String>,
}

fn default_nmap_args() -> String {
    "-sV -sC".to_string()
}

/// Parameters for `msf-db-nmap`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DbNmapParams {
    /// Target specification for nmap
    pub targets: String,

    /// Additional nmap arguments
    #[serde(rename = "nmapArgs", default = "default_nmap_args")]
    pub nmap_args: String,
}

/// msfconsole runs `-x` as a `;`-separated script, so interpolated values
/// must not be able to start a command of their own.
fn console_value<'a>(field: &str, value: &'a str) -> Result<&'a str, ToolError> {
    if value.contains([';', '\n', '\r']) {
        return Err(ToolError::invalid_arguments(format!(
            "{field} must not contain ';' or line breaks"
        )));
    }
    Ok(value)
}

/// Select the module and its targets.
fn module_commands(module_path: &str, rhosts: &str) -> Result<Vec<String>, ToolError> {
    Ok(vec![
        format!("use {}", console_value("modulePath", module_path)?),
        format!("set RHOSTS {}", console_value("rhosts", rhosts)?),
    ])
}

fn option_commands(options: &BTreeMap<String, String>) -> Result<Vec<String>, ToolError> {
    options
        .iter()
        .map(|(key, value)| {
            Ok(format!(
                "set {} {}",
                console_value("additionalOptions", key)?,
                console_value("additionalOptions", value)?
            ))
        })
        .collect()
}

/// msfvenom sits next to msfconsole.
fn msfvenom_path(console: &Path) -> PathBuf {
    PathBuf::from(console.to_string_lossy().replace("msfconsole", "msfvenom"))
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct MetasploitTools {
    console: ExternalTool,
    venom: ExternalTool,
}

impl MetasploitTools {
    pub const SEARCH: &'static str = "msf-search";
    pub const INFO: &'static str = "msf-info";
    pub const EXPLOIT_CHECK: &'static str = "msf-exploit-check";
    pub const AUXILIARY_SCAN: &'static str = "msf-auxiliary-scan";
    pub const VENOM_GENERATE: &'static str = "msfvenom-generate";
    pub const VENOM_LIST: &'static str = "msfvenom-list";
    pub const DB_NMAP: &'static str = "msf-db-nmap";
    pub const COMMON_MODULES: &'static str = "msf-common-modules";

    pub fn new(msfconsole: PathBuf, runner: Arc<CommandRunner>) -> Self {
        let venom = ExternalTool::new(
            msfvenom_path(&msfconsole),
            SuccessPolicy::AnyOutputOrExitZero,
            runner.clone(),
        );
        let console = ExternalTool::new(msfconsole, SuccessPolicy::always(), runner);
        Self::with_tools(console, venom)
    }

    pub fn with_tools(console: ExternalTool, venom: ExternalTool) -> Self {
        Self { console, venom }
    }

    fn console_spec(&self, commands: &[String], timeout: Duration) -> CommandSpec {
        let script = format!("{}; exit", commands.join("; "));
        self.console
            .command(["-q".to_string(), "-x".to_string(), script])
            .timeout(timeout)
    }

    /// Run a console script: stdout (or stderr when stdout is empty), or the
    /// partial stdout plus the timeout marker.
    async fn run_console(
        &self,
        commands: &[String],
        timeout: Duration,
    ) -> Result<String, ToolError> {
        let output = self.console.run_spec(self.console_spec(commands, timeout)).await?;
        if output.timed_out {
            return Ok(format!("{}\n{}", output.stdout, TIMEOUT_MARKER));
        }
        Ok(output.stdout_or_stderr().to_string())
    }

    #[instrument(skip_all, fields(query = %params.query))]
    pub async fn search(
        self: Arc<Self>,
        params: SearchParams,
    ) -> Result<CallToolResult, ToolError> {
        let query = console_value("query", &params.query)?;
        let command = match params.module_type {
            Some(kind) => format!("search type:{} {}", kind.as_str(), query),
            None => format!("search {query}"),
        };
        let output = self.run_console(&[command], LOOKUP_TIMEOUT).await?;
        Ok(success_result(format!("Metasploit Search Results:\n\n{output}")))
    }

    #[instrument(skip_all, fields(module = %params.module_path))]
    pub async fn info(self: Arc<Self>, params: InfoParams) -> Result<CallToolResult, ToolError> {
        let command = format!("info {}", console_value("modulePath", &params.module_path)?);
        let output = self.run_console(&[command], LOOKUP_TIMEOUT).await?;
        Ok(success_result(format!("Module Information:\n\n{output}")))
    }

    fn check_commands(params: &ExploitCheckParams) -> Result<Vec<String>, ToolError> {
        let mut commands = module_commands(&params.module_path, &params.rhosts)?;
        if let Some(rport) = params.rport {
            commands.push(format!("set RPORT {rport}"));
        }
        commands.extend(option_commands(&params.additional_options)?);
        commands.push("check".to_string());
        Ok(commands)
    }

    #[instrument(skip_all, fields(module = %params.module_path, rhosts = %params.rhosts))]
    pub async fn exploit_check(
        self: Arc<Self>,
        params: ExploitCheckParams,
    ) -> Result<CallToolResult, ToolError> {
        let commands = Self::check_commands(&params)?;
        let output = self.run_console(&commands, CHECK_TIMEOUT).await?;
        Ok(success_result(format!(
            "Vulnerability Check Results:\nModule: {}\nTarget: {}\n\n{}",
            params.module_path, params.rhosts, output
        )))
    }

    fn scan_commands(params: &AuxiliaryScanParams) -> Result<Vec<String>, ToolError> {
        let mut commands = module_commands(&params.module_path, &params.rhosts)?;
        commands.push(format!("set THREADS {}", params.threads));
        commands.extend(option_commands(&params.additional_options)?);
        commands.push("run".to_string());
        Ok(commands)
    }

    #[instrument(skip_all, fields(module = %params.module_path, rhosts = %params.rhosts))]
    pub async fn auxiliary_scan(
        self: Arc<Self>,
        params: AuxiliaryScanParams,
    ) -> Result<CallToolResult, ToolError> {
        let commands = Self::scan_commands(&params)?;
        let output = self.run_console(&commands, SCAN_TIMEOUT).await?;
        Ok(success_result(format!(
            "Auxiliary Scan Results:\nModule: {}\nTarget: {}\n\n{}",
            params.module_path, params.rhosts, output
        )))
    }

    #[instrument(skip_all, fields(payload = %params.payload, format = %params.format))]
    pub async fn venom_generate(
        self: Arc<Self>,
        params: GenerateParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = vec![
            "-p".to_string(),
            params.payload,
            format!("LHOST={}", params.lhost),
            format!("LPORT={}", params.lport),
            "-f".to_string(),
            params.format,
        ];
        if let Some(encoder) = params.encoder {
            args.extend([
                "-e".to_string(),
                encoder,
                "-i".to_string(),
                params.iterations.to_string(),
            ]);
        }
        if let Some(bad_chars) = params.bad_chars {
            args.extend(["-b".to_string(), bad_chars]);
        }
        if let Some(output_file) = &params.output_file {
            args.extend(["-o".to_string(), output_file.clone()]);
        }

        let output = self.venom.run(args).await?;
        let text = match &params.output_file {
            Some(path) => format!("Payload generated and saved to: {path}\n\n{}", output.stdout),
            None => format!("Generated Payload:\n\n{}", output.stdout),
        };
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(list = params.list_type.as_str()))]
    pub async fn venom_list(
        self: Arc<Self>,
        params: ListParams,
    ) -> Result<CallToolResult, ToolError> {
        let output = self
            .venom
            .run(["-l".to_string(), params.list_type.as_str().to_string()])
            .await?;
        let listing = match &params.filter {
            Some(filter) => {
                let needle = filter.to_lowercase();
                output
                    .stdout
                    .split('\n')
                    .filter(|line| line.to_lowercase().contains(&needle))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            None => output.stdout.clone(),
        };
        let text = format!("Metasploit {}:\n\n{}", params.list_type.as_str(), listing);
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(targets = %params.targets))]
    pub async fn db_nmap(
        self: Arc<Self>,
        params: DbNmapParams,
    ) -> Result<CallToolResult, ToolError> {
        let commands = [
            format!(
                "db_nmap {} {}",
                console_value("nmapArgs", &params.nmap_args)?,
                console_value("targets", &params.targets)?
            ),
            "hosts".to_string(),
            "services".to_string(),
        ];
        let output = self.run_console(&commands, DB_NMAP_TIMEOUT).await?;
        Ok(success_result(format!(
            "Nmap Scan Results (imported to MSF db):\n\n{output}"
        )))
    }

    pub async fn common_modules(
        self: Arc<Self>,
        _params: NoParams,
    ) -> Result<CallToolResult, ToolError> {
        Ok(success_result(COMMON_MODULES_TEXT.to_string()))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::SEARCH,
                "Search for Metasploit modules (exploits, auxiliary, payloads)",
                this.clone(),
                Self::search,
            ))
            .with_route(tool_route(
                Self::INFO,
                "Get detailed information about a Metasploit module",
                this.clone(),
                Self::info,
            ))
            .with_route(tool_route(
                Self::EXPLOIT_CHECK,
                "Check if a target is vulnerable without exploiting (safe check)",
                this.clone(),
                Self::exploit_check,
            ))
            .with_route(tool_route(
                Self::AUXILIARY_SCAN,
                "Run an auxiliary scanner module",
                this.clone(),
                Self::auxiliary_scan,
            ))
            .with_route(tool_route(
                Self::VENOM_GENERATE,
                "Generate payloads using msfvenom",
                this.clone(),
                Self::venom_generate,
            ))
            .with_route(tool_route(
                Self::VENOM_LIST,
                "List available payloads, formats, or encoders",
                this.clone(),
                Self::venom_list,
            ))
            .with_route(tool_route(
                Self::DB_NMAP,
                "Run nmap scan and import results into Metasploit database",
                this.clone(),
                Self::db_nmap,
            ))
            .with_route(tool_route(
                Self::COMMON_MODULES,
                "Get a list of commonly used Metasploit modules by category",
                this,
                Self::common_modules,
            ))
    }
}

const COMMON_MODULES_TEXT: &str = "Common Metasploit Modules:

EXPLOITATION:
  exploit/windows/smb/ms17_010_eternalblue     - EternalBlue SMB RCE
  exploit/windows/smb/ms08_067_netapi          - Conficker vulnerability
  exploit/multi/http/apache_mod_cgi_bash_env   - Shellshock
  exploit/unix/ftp/vsftpd_234_backdoor         - vsFTPd backdoor
  exploit/multi/handler                         - Generic payload handler

SCANNING:
  auxiliary/scanner/portscan/tcp               - TCP port scanner
  auxiliary/scanner/smb/smb_version            - SMB version detection
  auxiliary/scanner/smb/smb_ms17_010           - EternalBlue checker
  auxiliary/scanner/ssh/ssh_version            - SSH version scanner
  auxiliary/scanner/http/http_version          - HTTP server info
  auxiliary/scanner/ftp/ftp_version            - FTP banner grab
  auxiliary/scanner/mysql/mysql_version        - MySQL version
  auxiliary/scanner/rdp/rdp_scanner            - RDP detection

CREDENTIAL ATTACKS:
  auxiliary/scanner/ssh/ssh_login              - SSH brute force
  auxiliary/scanner/smb/smb_login              - SMB brute force
  auxiliary/scanner/ftp/ftp_login              - FTP brute force
  auxiliary/scanner/mysql/mysql_login          - MySQL brute force

POST EXPLOITATION:
  post/windows/gather/hashdump                 - Dump password hashes
  post/multi/gather/env                        - Environment variables
  post/windows/gather/enum_logged_on_users     - Logged on users
  post/linux/gather/enum_system                - Linux system info

PAYLOADS:
  windows/meterpreter/reverse_tcp              - Windows Meterpreter
  linux/x64/meterpreter/reverse_tcp            - Linux Meterpreter
  cmd/unix/reverse_bash                        - Bash reverse shell
  windows/shell/reverse_tcp                    - Windows cmd shell";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process::testing::{echo_args_tool, fake_tool, missing_tool};
    use crate::domains::tools::definitions::common::result_text;
    use pretty_assertions::assert_eq;

    fn console_only(console: ExternalTool) -> Arc<MetasploitTools> {
        Arc::new(MetasploitTools::with_tools(
            console,
            missing_tool(SuccessPolicy::AnyOutputOrExitZero),
        ))
    }

    fn check_params() -> ExploitCheckParams {
        serde_json::from_value(serde_json::json!({
            "modulePath": "exploit/windows/smb/ms17_010_eternalblue",
            "rhosts": "10.0.0.0/24",
            "rport": 445,
            "additionalOptions": {"SMBDomain": "CORP", "VERBOSE": "true"}
        }))
        .unwrap()
    }

    #[test]
    fn test_check_script_and_deadline() {
        let tools = console_only(echo_args_tool(SuccessPolicy::always()));
        let commands = MetasploitTools::check_commands(&check_params()).unwrap();
        let spec = tools.console_spec(&commands, CHECK_TIMEOUT);
        assert_eq!(spec.timeout, Some(Duration::from_secs(120)));
        assert_eq!(
            spec.args.last().unwrap(),
            "use exploit/windows/smb/ms17_010_eternalblue; set RHOSTS 10.0.0.0/24; \
             set RPORT 445; set SMBDomain CORP; set VERBOSE true; check; exit"
        );
    }

    #[test]
    fn test_scan_script_sets_threads_before_options() {
        let params: AuxiliaryScanParams = serde_json::from_value(serde_json::json!({
            "modulePath": "auxiliary/scanner/smb/smb_version",
            "rhosts": "10.0.0.1-20",
            "additionalOptions": {"SMBUser": "guest"}
        }))
        .unwrap();
        assert_eq!(
            MetasploitTools::scan_commands(&params).unwrap(),
            vec![
                "use auxiliary/scanner/smb/smb_version",
                "set RHOSTS 10.0.0.1-20",
                "set THREADS 10",
                "set SMBUser guest",
                "run",
            ]
        );
        assert_eq!(SCAN_TIMEOUT, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_injected_command_is_rejected() {
        let tools = console_only(fake_tool("echo ran", SuccessPolicy::always()));
        let err = tools
            .info(InfoParams {
                module_path: "exploit/x; sessions -K".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_timed_out_console_keeps_partial_output() {
        let tools = console_only(fake_tool(
            "echo 'Matching Modules'; sleep 30",
            SuccessPolicy::always(),
        ));
        let text = tools
            .run_console(&["search smb".to_string()], Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(
            text,
            "Matching Modules\n\n[TIMEOUT - Command execution exceeded time limit]"
        );
    }

    #[tokio::test]
    async fn test_search_with_module_type() {
        let tools = console_only(echo_args_tool(SuccessPolicy::always()));
        let result = tools
            .search(SearchParams {
                query: "eternalblue".into(),
                module_type: Some(ModuleType::Exploit),
            })
            .await
            .unwrap();
        assert_eq!(
            result_text(&result),
            "Metasploit Search Results:\n\n-q\n-x\nsearch type:exploit eternalblue; exit\n"
        );
    }

    #[tokio::test]
    async fn test_console_falls_back_to_stderr() {
        let tools = console_only(fake_tool(
            "echo 'database not connected' >&2; exit 1",
            SuccessPolicy::always(),
        ));
        let result = tools
            .info(InfoParams {
                module_path: "auxiliary/scanner/ssh/ssh_version".into(),
            })
            .await
            .unwrap();
        assert_eq!(
            result_text(&result),
            "Module Information:\n\ndatabase not connected\n"
        );
    }

    #[tokio::test]
    async fn test_venom_list_filters_case_insensitively() {
        let venom = fake_tool(
            "printf 'windows/x64/shell_reverse_tcp\\nlinux/x86/shell_reverse_tcp\\nWindows/exec\\n'",
            SuccessPolicy::AnyOutputOrExitZero,
        );
        let tools = Arc::new(MetasploitTools::with_tools(
            missing_tool(SuccessPolicy::always()),
            venom,
        ));
        let result = tools
            .venom_list(ListParams {
                list_type: ListType::Payloads,
                filter: Some("WINDOWS".into()),
            })
            .await
            .unwrap();
        assert_eq!(
            result_text(&result),
            "Metasploit payloads:\n\nwindows/x64/shell_reverse_tcp\nWindows/exec"
        );
    }

    #[tokio::test]
    async fn test_venom_failure_surfaces_stderr() {
        let venom = fake_tool(
            "echo 'Error: invalid payload' >&2; exit 2",
            SuccessPolicy::AnyOutputOrExitZero,
        );
        let tools = Arc::new(MetasploitTools::with_tools(
            missing_tool(SuccessPolicy::always()),
            venom,
        ));
        let params: GenerateParams = serde_json::from_value(serde_json::json!({
            "payload": "nope", "format": "exe", "lhost": "10.0.0.2", "lport": 4444
        }))
        .unwrap();
        let err = tools.venom_generate(params).await.unwrap_err();
        assert!(err.to_string().contains("invalid payload"));
    }

    #[test]
    fn test_msfvenom_lives_next_to_msfconsole() {
        assert_eq!(
            msfvenom_path(Path::new("/opt/metasploit-framework/bin/msfconsole")),
            PathBuf::from("/opt/metasploit-framework/bin/msfvenom")
        );
    }
}
