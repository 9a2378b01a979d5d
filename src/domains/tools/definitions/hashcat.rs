//! hashcat adapter: password hash cracking, benchmarking and reference tables.
//!
//! hashcat exits 0 when everything was cracked and 1 when the keyspace was
//! exhausted, with further codes for aborts. Its status output is useful in
//! all of those cases, so every run is reported rather than judged.

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::instrument;

use super::common::{non_empty_lines, success_result};
use crate::core::process::{CommandRunner, ExternalTool, SuccessPolicy};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::{NoParams, tool_route};

const CRACK_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const BENCHMARK_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const SHOW_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Tool Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
pub enum AttackMode {
    #[serde(rename = "dictionary")]
    Dictionary,
    #[serde(rename = "combinator")]
    Combinator,
    #[serde(rename = "bruteforce")]
    Bruteforce,
    #[serde(rename = "hybrid-dict-mask")]
    HybridDictMask,
    #[serde(rename = "hybrid-mask-dict")]
    HybridMaskDict,
}

impl AttackMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Dictionary => "dictionary",
            Self::Combinator => "combinator",
            Self::Bruteforce => "bruteforce",
            Self::HybridDictMask => "hybrid-dict-mask",
            Self::HybridMaskDict => "hybrid-mask-dict",
        }
    }

    /// hashcat's `-a` code.
    fn code(self) -> &'static str {
        match self {
            Self::Dictionary => "0",
            Self::Combinator => "1",
            Self::Bruteforce => "3",
            Self::HybridDictMask => "6",
            Self::HybridMaskDict => "7",
        }
    }

    fn needs_wordlist(self) -> bool {
        matches!(self, Self::Dictionary | Self::Combinator | Self::HybridDictMask)
    }

    fn uses_mask(self) -> bool {
        matches!(self, Self::Bruteforce | Self::HybridDictMask | Self::HybridMaskDict)
    }
}

fn default_workload() -> u8 {
    3
}

/// Parameters for `hashcat-crack`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CrackParams {
    /// Path to file containing hashes
    #[serde(rename = "hashFile")]
    pub hash_file: String,

    /// Hash type code (e.g., 0=MD5, 1000=NTLM, 1800=sha512crypt)
    #[serde(rename = "hashType")]
    pub hash_type: u32,

    /// Attack mode to use
    #[serde(rename = "attackMode")]
    pub attack_mode: AttackMode,

    /// Path to wordlist (for dictionary/hybrid modes)
    pub wordlist: Option<String>,

    /// Mask pattern for brute force (e.g., ?a?a?a?a?a?a)
    pub mask: Option<String>,

    /// Path to rules file
    pub rules: Option<String>,

    /// Output file for cracked hashes
    #[serde(rename = "outputFile")]
    pub output_file: Option<String>,

    /// Workload profile (1=low, 2=default, 3=high, 4=nightmare)
    #[serde(rename = "workloadProfile", default = "default_workload")]
    pub workload_profile: u8,

    /// Disable potfile
    #[serde(rename = "potfileDisable", default)]
    pub potfile_disable: bool,
}

/// Parameters for `hashcat-benchmark`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct BenchmarkParams {
    /// Specific hash type to benchmark (omit for all)
    #[serde(rename = "hashType")]
    pub hash_type: Option<u32>,

    /// Workload profile
    #[serde(rename = "workloadProfile", default = "default_workload")]
    pub workload_profile: u8,
}

/// Parameters for `hashcat-show`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ShowParams {
    /// Path to hash file
    #[serde(rename = "hashFile")]
    pub hash_file: String,

    /// Hash type code
    #[serde(rename = "hashType")]
    pub hash_type: u32,
}

/// Parameters for `hashcat-identify`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct IdentifyParams {
    /// Hash string to identify
    pub hash: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum HashCategory {
    #[default]
    All,
    Raw,
    Salted,
    Unix,
    Windows,
    Web,
    Database,
    Network,
}

/// Parameters for `hashcat-hash-types`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct HashTypesParams {
    /// Category to filter
    #[serde(default)]
    pub category: HashCategory,
}

/// Build the crack argv, enforcing the wordlist and mask each mode needs.
fn crack_args(params: &CrackParams) -> Result<Vec<String>, ToolError> {
    let mode = params.attack_mode;
    let mut args = vec![
        "-m".to_string(),
        params.hash_type.to_string(),
        "-a".to_string(),
        mode.code().to_string(),
        "-w".to_string(),
        params.workload_profile.to_string(),
        "--status".to_string(),
        "--status-timer=10".to_string(),
    ];
    if let Some(output) = &params.output_file {
        args.extend(["-o".to_string(), output.clone()]);
    }
    if params.potfile_disable {
        args.push("--potfile-disable".to_string());
    }
    if let Some(rules) = &params.rules {
        args.extend(["-r".to_string(), rules.clone()]);
    }
    args.push(params.hash_file.clone());

    if mode.needs_wordlist() {
        let wordlist = params.wordlist.as_ref().ok_or_else(|| {
            ToolError::invalid_arguments(format!(
                "wordlist is required for {} attacks",
                mode.as_str()
            ))
        })?;
        args.push(wordlist.clone());
    }
    if mode.uses_mask() {
        match &params.mask {
            Some(mask) => args.push(mask.clone()),
            None if mode == AttackMode::Bruteforce => {
                return Err(ToolError::invalid_arguments(
                    "mask is required for bruteforce attacks",
                ));
            }
            None => {}
        }
    }
    Ok(args)
}

static HASH_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)^[a-f0-9]{32}$", "MD5 (0), NTLM (1000), MD4 (900)"),
        (r"(?i)^[a-f0-9]{40}$", "SHA1 (100)"),
        (r"(?i)^[a-f0-9]{64}$", "SHA256 (1400)"),
        (r"(?i)^[a-f0-9]{128}$", "SHA512 (1700)"),
        (r"^\$1\$", "MD5crypt (500)"),
        (r"^\$2[aby]?\$", "bcrypt (3200)"),
        (r"^\$5\$", "SHA256crypt (7400)"),
        (r"^\$6\$", "SHA512crypt (1800)"),
        (r"^\$apr1\$", "Apache MD5 (1600)"),
        (r"(?i)^[a-f0-9]{32}:[a-f0-9]+$", "MD5 with salt, NTLM with salt"),
        (r"^\$P\$", "phpBB3/WordPress (400)"),
        (r"^\$H\$", "phpBB3 (400)"),
        (r"^sha1\$", "Django SHA1 (124)"),
        (r"^pbkdf2_sha256\$", "Django PBKDF2-SHA256 (10000)"),
    ]
    .into_iter()
    .map(|(pattern, types)| (Regex::new(pattern).expect("valid regex"), types))
    .collect()
});

/// First matching entry of the pattern table.
fn identify(hash: &str) -> &'static str {
    HASH_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(hash))
        .map_or("Unknown hash type", |(_, types)| types)
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct HashcatTools {
    hashcat: ExternalTool,
}

impl HashcatTools {
    pub const CRACK: &'static str = "hashcat-crack";
    pub const BENCHMARK: &'static str = "hashcat-benchmark";
    pub const SHOW: &'static str = "hashcat-show";
    pub const IDENTIFY: &'static str = "hashcat-identify";
    pub const HASH_TYPES: &'static str = "hashcat-hash-types";
    pub const MASKS: &'static str = "hashcat-masks";

    pub fn new(binary: PathBuf, runner: Arc<CommandRunner>) -> Self {
        Self::with_tool(ExternalTool::new(binary, SuccessPolicy::always(), runner))
    }

    pub fn with_tool(hashcat: ExternalTool) -> Self {
        Self { hashcat }
    }

    #[instrument(skip_all, fields(hash_type = params.hash_type, mode = params.attack_mode.as_str()))]
    pub async fn crack(self: Arc<Self>, params: CrackParams) -> Result<CallToolResult, ToolError> {
        let args = crack_args(&params)?;
        let spec = self.hashcat.command(args).timeout(CRACK_TIMEOUT);
        let output = self.hashcat.run_spec(spec).await?;
        let text = format!(
            "Hashcat Results:\nHash Type: {}\nAttack Mode: {}\n\n{}",
            params.hash_type,
            params.attack_mode.as_str(),
            output.combined()
        );
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(hash_type = ?params.hash_type))]
    pub async fn benchmark(
        self: Arc<Self>,
        params: BenchmarkParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = vec![
            "-b".to_string(),
            "-w".to_string(),
            params.workload_profile.to_string(),
        ];
        if let Some(hash_type) = params.hash_type {
            args.extend(["-m".to_string(), hash_type.to_string()]);
        }
        let spec = self.hashcat.command(args).timeout(BENCHMARK_TIMEOUT);
        let output = self.hashcat.run_spec(spec).await?;
        let text = format!("Hashcat Benchmark:\n\n{}", output.combined());
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(hash_file = %params.hash_file))]
    pub async fn show(self: Arc<Self>, params: ShowParams) -> Result<CallToolResult, ToolError> {
        let args = [
            "-m".to_string(),
            params.hash_type.to_string(),
            "--show".to_string(),
            params.hash_file,
        ];
        let spec = self.hashcat.command(args).timeout(SHOW_TIMEOUT);
        let output = self.hashcat.run_spec(spec).await?;
        let combined = output.combined();
        let cracked = non_empty_lines(&combined).len();
        let body = if combined.is_empty() {
            "No cracked hashes found".to_string()
        } else {
            combined.clone()
        };
        let text = format!("Previously Cracked Hashes ({cracked}):\n\n{body}");
        Ok(success_result(output.annotate(text)))
    }

    pub async fn identify(
        self: Arc<Self>,
        params: IdentifyParams,
    ) -> Result<CallToolResult, ToolError> {
        Ok(success_result(format!(
            "Hash: {}\nLength: {}\nPotential Types: {}\n\nNote: Use hashcat --example-hashes to see format examples",
            params.hash,
            params.hash.chars().count(),
            identify(&params.hash)
        )))
    }

    pub async fn hash_types(
        self: Arc<Self>,
        params: HashTypesParams,
    ) -> Result<CallToolResult, ToolError> {
        let body = match params.category {
            HashCategory::All => HASH_TYPE_TABLES.join("\n"),
            HashCategory::Raw => HASH_TYPE_TABLES[0].to_string(),
            HashCategory::Salted => HASH_TYPE_TABLES[1].to_string(),
            HashCategory::Unix => HASH_TYPE_TABLES[2].to_string(),
            HashCategory::Windows => HASH_TYPE_TABLES[3].to_string(),
            HashCategory::Web => HASH_TYPE_TABLES[4].to_string(),
            HashCategory::Database => HASH_TYPE_TABLES[5].to_string(),
            HashCategory::Network => HASH_TYPE_TABLES[6].to_string(),
        };
        Ok(success_result(format!(
            "Hashcat Hash Types:\n{body}\n\nUse: hashcat --help to see all >600 hash types"
        )))
    }

    pub async fn masks(self: Arc<Self>, _params: NoParams) -> Result<CallToolResult, ToolError> {
        Ok(success_result(MASKS_TEXT.to_string()))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::CRACK,
                "Crack password hashes using various attack modes",
                this.clone(),
                Self::crack,
            ))
            .with_route(tool_route(
                Self::BENCHMARK,
                "Run hashcat benchmark for hash types",
                this.clone(),
                Self::benchmark,
            ))
            .with_route(tool_route(
                Self::SHOW,
                "Show already cracked hashes from potfile",
                this.clone(),
                Self::show,
            ))
            .with_route(tool_route(
                Self::IDENTIFY,
                "Identify potential hash types for a given hash",
                this.clone(),
                Self::identify,
            ))
            .with_route(tool_route(
                Self::HASH_TYPES,
                "List common hash types and their codes",
                this.clone(),
                Self::hash_types,
            ))
            .with_route(tool_route(
                Self::MASKS,
                "Show mask charset reference for brute force attacks",
                this,
                Self::masks,
            ))
    }
}

/// raw, salted, unix, windows, web, database, network.
const HASH_TYPE_TABLES: [&str; 7] = [
    "
RAW HASHES:
  0       MD5
  100     SHA1
  1400    SHA256
  1700    SHA512
  900     MD4
  17400   SHA3-256
  17600   SHA3-512
  6000    RIPEMD-160",
    "
SALTED HASHES:
  10      MD5($pass.$salt)
  20      MD5($salt.$pass)
  110     SHA1($pass.$salt)
  120     SHA1($salt.$pass)
  1410    SHA256($pass.$salt)
  1420    SHA256($salt.$pass)",
    "
UNIX/LINUX:
  500     MD5crypt $1$
  1800    SHA512crypt $6$
  7400    SHA256crypt $5$
  3200    bcrypt $2*$
  1500    DES(Unix)
  15600   Argon2",
    "
WINDOWS:
  1000    NTLM
  3000    LM
  5500    NetNTLMv1
  5600    NetNTLMv2
  1100    Domain Cached Credentials (DCC)
  2100    Domain Cached Credentials 2 (DCC2)
  13100   Kerberos 5 TGS-REP",
    "
WEB APPLICATIONS:
  400     phpBB3/WordPress/Drupal
  2612    PHPS
  121     SMF
  21      osCommerce
  124     Django SHA1
  10000   Django PBKDF2-SHA256
  3711    MediaWiki B
  7900    Drupal7",
    "
DATABASE:
  12      PostgreSQL
  131     MSSQL 2000
  132     MSSQL 2005
  1731    MSSQL 2012/2014
  300     MySQL4.1/MySQL5
  200     MySQL323
  112     Oracle S",
    "
NETWORK:
  2500    WPA/WPA2
  16800   WPA-PMKID-PBKDF2
  5500    NetNTLMv1
  5600    NetNTLMv2
  7300    IPMI2 RAKP HMAC-SHA1
  4800    iSCSI CHAP",
];

const MASKS_TEXT: &str = r##"Hashcat Mask Charsets:

BUILT-IN CHARSETS:
  ?l    Lowercase letters     (abcdefghijklmnopqrstuvwxyz)
  ?u    Uppercase letters     (ABCDEFGHIJKLMNOPQRSTUVWXYZ)
  ?d    Digits                (0123456789)
  ?s    Special characters    (!"#$%&'()*+,-./:;<=>?@[\]^_`{|}~)
  ?a    All printable         (?l?u?d?s)
  ?b    All bytes             (0x00 - 0xff)
  ?h    Lowercase hex         (0123456789abcdef)
  ?H    Uppercase hex         (0123456789ABCDEF)

CUSTOM CHARSETS:
  -1 ?l?d            Custom charset 1 (use as ?1)
  -2 ?l?u            Custom charset 2 (use as ?2)
  -3 abc123          Custom charset 3 (use as ?3)
  -4 ?d?s            Custom charset 4 (use as ?4)

MASK EXAMPLES:
  ?d?d?d?d           4-digit PIN (0000-9999)
  ?l?l?l?l?l         5 lowercase letters
  ?u?l?l?l?l?d?d     Capital + 4 lower + 2 digits (Password12)
  ?a?a?a?a?a?a       6 chars, all printable
  password?d?d       password + 2 digits
  ?d?d?d?d?d?d?s     6 digits + special char

INCREMENT MODE:
  --increment        Try all lengths up to mask length
  --increment-min=4  Start from length 4
  --increment-max=8  Stop at length 8

Example: hashcat -a 3 -m 1000 hashes.txt ?a?a?a?a?a?a --increment"##;
