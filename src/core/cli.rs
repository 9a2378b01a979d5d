//! Command-line surface: one subcommand per adapter.
//!
//! The positional arguments are exactly what the MCP client's launch entry
//! passes (usually the path to the security tool). Credentials for the REST
//! scanners that need more than one value come from the environment instead.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "security_mcp_adapters", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub adapter: AdapterCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum AdapterCommand {
    /// Network discovery and port scanning.
    Nmap {
        /// Path to the nmap binary.
        binary: PathBuf,
    },
    /// Command-injection testing.
    Commix {
        /// Python interpreter used to run commix.
        python: PathBuf,
        /// Path to commix.py.
        script: PathBuf,
    },
    /// Domain discovery from TLS certificates.
    Cero {
        binary: PathBuf,
    },
    /// WordPress vulnerability scanning.
    Wpscan {
        binary: PathBuf,
    },
    /// Passive subdomain enumeration.
    Subfinder {
        binary: PathBuf,
    },
    /// DNS resolution and record probing.
    Dnsx {
        binary: PathBuf,
    },
    /// Secret detection in git repositories and directories.
    Gitleaks {
        binary: PathBuf,
    },
    /// Image, filesystem and repository vulnerability scanning.
    Trivy {
        binary: PathBuf,
    },
    /// Static analysis with rule packs.
    Semgrep {
        binary: PathBuf,
    },
    /// Infrastructure-as-code misconfiguration scanning.
    Checkov {
        binary: PathBuf,
    },
    /// Cloud account security assessment.
    Prowler {
        binary: PathBuf,
    },
    /// CIS Kubernetes benchmark checks.
    KubeBench {
        binary: PathBuf,
    },
    /// Kubernetes penetration testing.
    KubeHunter {
        /// Launcher command line, e.g. `kube-hunter` or `python3 -m kube_hunter`.
        command: String,
    },
    /// Kubernetes manifest and cluster auditing.
    Kubeaudit {
        binary: PathBuf,
    },
    /// XSS scanning.
    Dalfox {
        binary: PathBuf,
    },
    /// Exposed-host search across search engines.
    Uncover {
        binary: PathBuf,
    },
    /// Notification delivery.
    Notify {
        binary: PathBuf,
    },
    /// Password hash recovery.
    Hashcat {
        binary: PathBuf,
    },
    /// Web screenshots.
    Gowitness {
        binary: PathBuf,
    },
    /// Shodan search API.
    Shodan {
        api_key: String,
    },
    /// VirusTotal reputation lookups.
    Virustotal {
        api_key: String,
    },
    /// OWASP ZAP API.
    Zap {
        /// ZAP API base URL.
        url: String,
        api_key: Option<String>,
    },
    /// Burp Suite REST API.
    Burpsuite {
        url: String,
    },
    /// Nessus scanner (NESSUS_URL, NESSUS_ACCESS_KEY, NESSUS_SECRET_KEY); mock mode otherwise.
    Nessus,
    /// Acunetix scanner (ACUNETIX_URL, ACUNETIX_API_KEY).
    Acunetix,
    /// Next.js React Server Components RCE detection.
    Nextjs,
    /// Online password attacks.
    Hydra {
        binary: PathBuf,
    },
    /// Metasploit Framework console and msfvenom.
    Metasploit {
        /// Path to msfconsole; msfvenom is expected next to it.
        binary: PathBuf,
    },
    /// Ghidra headless binary analysis.
    Ghidra {
        /// Path to analyzeHeadless.
        binary: PathBuf,
        /// Directory holding Ghidra projects and generated scripts.
        #[arg(default_value = "/tmp/ghidra_projects")]
        project_dir: PathBuf,
    },
    /// BloodHound Active Directory queries over Neo4j.
    Bloodhound {
        /// Neo4j URL, e.g. bolt://localhost:7687.
        url: String,
        password: String,
        #[arg(default_value = "neo4j")]
        user: String,
    },
    /// CrackMapExec/NetExec network authentication testing.
    Crackmapexec {
        binary: PathBuf,
    },
}

impl AdapterCommand {
    /// Adapter name, used as the default server name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nmap { .. } => "nmap",
            Self::Commix { .. } => "commix",
            Self::Cero { .. } => "cero",
            Self::Wpscan { .. } => "wpscan",
            Self::Subfinder { .. } => "subfinder",
            Self::Dnsx { .. } => "dnsx",
            Self::Gitleaks { .. } => "gitleaks",
            Self::Trivy { .. } => "trivy",
            Self::Semgrep { .. } => "semgrep",
            Self::Checkov { .. } => "checkov",
            Self::Prowler { .. } => "prowler",
            Self::KubeBench { .. } => "kube-bench",
            Self::KubeHunter { .. } => "kube-hunter",
            Self::Kubeaudit { .. } => "kubeaudit",
            Self::Dalfox { .. } => "dalfox",
            Self::Uncover { .. } => "uncover",
            Self::Notify { .. } => "notify",
            Self::Hashcat { .. } => "hashcat",
            Self::Gowitness { .. } => "gowitness",
            Self::Shodan { .. } => "shodan",
            Self::Virustotal { .. } => "virustotal",
            Self::Zap { .. } => "zap",
            Self::Burpsuite { .. } => "burpsuite",
            Self::Nessus => "nessus",
            Self::Acunetix => "acunetix",
            Self::Nextjs => "nextjs",
            Self::Hydra { .. } => "hydra",
            Self::Metasploit { .. } => "metasploit",
            Self::Ghidra { .. } => "ghidra",
            Self::Bloodhound { .. } => "bloodhound",
            Self::Crackmapexec { .. } => "crackmapexec",
        }
    }
}
