//! Adapter definitions.
//!
//! One module per security tool. Each exposes an `*Tools` struct whose
//! `router()` contributes that tool's operations; `common` holds the result
//! and JSON helpers they share.

pub mod common;

pub mod acunetix;
pub mod bloodhound;
pub mod burpsuite;
pub mod cero;
pub mod checkov;
pub mod commix;
pub mod crackmapexec;
pub mod dalfox;
pub mod dnsx;
pub mod ghidra;
pub mod gitleaks;
pub mod gowitness;
pub mod hashcat;
pub mod hydra;
pub mod kube_bench;
pub mod kube_hunter;
pub mod kubeaudit;
pub mod metasploit;
pub mod nessus;
pub mod nextjs;
pub mod nmap;
pub mod notify;
pub mod prowler;
pub mod semgrep;
pub mod shodan;
pub mod subfinder;
pub mod trivy;
pub mod uncover;
pub mod virustotal;
pub mod wpscan;
pub mod zap;

pub use acunetix::AcunetixTools;
pub use bloodhound::BloodHoundTools;
pub use burpsuite::BurpSuiteTools;
pub use cero::CeroTools;
pub use checkov::CheckovTools;
pub use commix::CommixTools;
pub use crackmapexec::CrackMapExecTools;
pub use dalfox::DalfoxTools;
pub use dnsx::DnsxTools;
pub use ghidra::GhidraTools;
pub use gitleaks::GitleaksTools;
pub use gowitness::GowitnessTools;
pub use hashcat::HashcatTools;
pub use hydra::HydraTools;
pub use kube_bench::KubeBenchTools;
pub use kube_hunter::KubeHunterTools;
pub use kubeaudit::KubeauditTools;
pub use metasploit::MetasploitTools;
pub use nessus::NessusTools;
pub use nextjs::NextjsTools;
pub use nmap::NmapTools;
pub use notify::NotifyTools;
pub use prowler::ProwlerTools;
pub use semgrep::SemgrepTools;
pub use shodan::ShodanTools;
pub use subfinder::SubfinderTools;
pub use trivy::TrivyTools;
pub use uncover::UncoverTools;
pub use virustotal::VirusTotalTools;
pub use wpscan::WpscanTools;
pub use zap::ZapTools;
