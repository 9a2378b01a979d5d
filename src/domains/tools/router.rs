//! Tool router construction.
//!
//! A process serves exactly one adapter, chosen by the CLI subcommand. The
//! router is built once here and never changes afterwards.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use tracing::debug;

use crate::core::cli::AdapterCommand;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::http::HttpError;
use crate::core::process::CommandRunner;

use super::definitions::{
    AcunetixTools, BloodHoundTools, BurpSuiteTools, CeroTools, CheckovTools, CommixTools,
    CrackMapExecTools, DalfoxTools, DnsxTools, GhidraTools, GitleaksTools, GowitnessTools,
    HashcatTools, HydraTools, KubeBenchTools, KubeHunterTools, KubeauditTools, MetasploitTools,
    NessusTools, NextjsTools, NmapTools, NotifyTools, ProwlerTools, SemgrepTools, ShodanTools,
    SubfinderTools, TrivyTools, UncoverTools, VirusTotalTools, WpscanTools, ZapTools,
};

/// Build the router for the selected adapter.
///
/// Fails only on startup problems: missing environment credentials or an
/// HTTP client that cannot be constructed.
pub fn build_tool_router<S>(
    adapter: &AdapterCommand,
    config: &Config,
    runner: Arc<CommandRunner>,
) -> Result<ToolRouter<S>>
where
    S: Send + Sync + 'static,
{
    let router = match adapter {
        AdapterCommand::Nmap { binary } => NmapTools::new(binary.clone(), runner).router(),
        AdapterCommand::Commix { python, script } => {
            CommixTools::new(python.clone(), script.clone(), runner).router()
        }
        AdapterCommand::Cero { binary } => CeroTools::new(binary.clone(), runner).router(),
        AdapterCommand::Wpscan { binary } => WpscanTools::new(binary.clone(), runner).router(),
        AdapterCommand::Subfinder { binary } => {
            SubfinderTools::new(binary.clone(), runner).router()
        }
        AdapterCommand::Dnsx { binary } => DnsxTools::new(binary.clone(), runner).router(),
        AdapterCommand::Gitleaks { binary } => GitleaksTools::new(binary.clone(), runner).router(),
        AdapterCommand::Trivy { binary } => TrivyTools::new(binary.clone(), runner).router(),
        AdapterCommand::Semgrep { binary } => SemgrepTools::new(binary.clone(), runner).router(),
        AdapterCommand::Checkov { binary } => CheckovTools::new(binary.clone(), runner).router(),
        AdapterCommand::Prowler { binary } => ProwlerTools::new(binary.clone(), runner).router(),
        AdapterCommand::KubeBench { binary } => {
            KubeBenchTools::new(binary.clone(), runner).router()
        }
        AdapterCommand::KubeHunter { command } => KubeHunterTools::new(command, runner).router(),
        AdapterCommand::Kubeaudit { binary } => {
            KubeauditTools::new(binary.clone(), runner).router()
        }
        AdapterCommand::Dalfox { binary } => DalfoxTools::new(binary.clone(), runner).router(),
        AdapterCommand::Uncover { binary } => UncoverTools::new(binary.clone(), runner).router(),
        AdapterCommand::Notify { binary } => NotifyTools::new(binary.clone(), runner).router(),
        AdapterCommand::Hashcat { binary } => HashcatTools::new(binary.clone(), runner).router(),
        AdapterCommand::Gowitness { binary } => {
            GowitnessTools::new(binary.clone(), runner, config.security.clone()).router()
        }
        AdapterCommand::Shodan { api_key } => ShodanTools::new(api_key)?.router(),
        AdapterCommand::Virustotal { api_key } => {
            VirusTotalTools::new(api_key, config.security.clone())?.router()
        }
        AdapterCommand::Zap { url, api_key } => ZapTools::new(url, api_key.as_deref())?.router(),
        AdapterCommand::Burpsuite { url } => BurpSuiteTools::new(url)?.router(),
        AdapterCommand::Nessus => NessusTools::new(config.credentials.nessus.as_ref())?.router(),
        AdapterCommand::Acunetix => {
            let credentials = &config.credentials;
            let (Some(url), Some(api_key)) = (
                credentials.acunetix_url.as_deref(),
                credentials.acunetix_api_key.as_deref(),
            ) else {
                return Err(Error::config(
                    "ACUNETIX_URL and ACUNETIX_API_KEY must be set for the acunetix adapter",
                ));
            };
            AcunetixTools::new(url, api_key)?.router()
        }
        AdapterCommand::Nextjs => NextjsTools::new()
            .map_err(|source| HttpError::Build {
                service: "Next.js",
                source,
            })?
            .router(),
        AdapterCommand::Hydra { binary } => HydraTools::new(binary.clone(), runner).router(),
        AdapterCommand::Metasploit { binary } => {
            MetasploitTools::new(binary.clone(), runner).router()
        }
        AdapterCommand::Ghidra {
            binary,
            project_dir,
        } => GhidraTools::new(
            binary.clone(),
            project_dir.clone(),
            runner,
            config.security.clone(),
        )
        .router(),
        AdapterCommand::Bloodhound {
            url,
            password,
            user,
        } => BloodHoundTools::new(url, user, password)?.router(),
        AdapterCommand::Crackmapexec { binary } => {
            CrackMapExecTools::new(binary.clone(), runner).router()
        }
    };

    debug!(
        adapter = adapter.name(),
        tools = router.list_all().len(),
        "Tool router built"
    );
    Ok(router)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use tokio_test::assert_ok;

    use crate::core::config::CredentialsConfig;

    struct TestServer {}

    fn runner() -> Arc<CommandRunner> {
        Arc::new(CommandRunner::new(&Config::default().execution))
    }

    fn names(adapter: &AdapterCommand, config: &Config) -> Vec<String> {
        let router: ToolRouter<TestServer> =
            assert_ok!(build_tool_router(adapter, config, runner()));
        router.list_all().into_iter().map(|t| t.name.to_string()).collect()
    }

    fn binary(name: &str) -> PathBuf {
        PathBuf::from(format!("/usr/bin/{name}"))
    }

    fn all_adapters() -> Vec<(AdapterCommand, usize)> {
        vec![
            (AdapterCommand::Nmap { binary: binary("nmap") }, 1),
            (
                AdapterCommand::Commix {
                    python: binary("python3"),
                    script: PathBuf::from("/opt/commix/commix.py"),
                },
                1,
            ),
            (AdapterCommand::Cero { binary: binary("cero") }, 1),
            (AdapterCommand::Wpscan { binary: binary("wpscan") }, 1),
            (AdapterCommand::Subfinder { binary: binary("subfinder") }, 4),
            (AdapterCommand::Dnsx { binary: binary("dnsx") }, 4),
            (AdapterCommand::Gitleaks { binary: binary("gitleaks") }, 4),
            (AdapterCommand::Trivy { binary: binary("trivy") }, 6),
            (AdapterCommand::Semgrep { binary: binary("semgrep") }, 4),
            (AdapterCommand::Checkov { binary: binary("checkov") }, 7),
            (AdapterCommand::Prowler { binary: binary("prowler") }, 6),
            (AdapterCommand::KubeBench { binary: binary("kube-bench") }, 9),
            (
                AdapterCommand::KubeHunter {
                    command: "python3 -m kube_hunter".to_string(),
                },
                5,
            ),
            (AdapterCommand::Kubeaudit { binary: binary("kubeaudit") }, 10),
            (AdapterCommand::Dalfox { binary: binary("dalfox") }, 5),
            (AdapterCommand::Uncover { binary: binary("uncover") }, 6),
            (AdapterCommand::Notify { binary: binary("notify") }, 4),
            (AdapterCommand::Hashcat { binary: binary("hashcat") }, 6),
            (AdapterCommand::Gowitness { binary: binary("gowitness") }, 5),
            (AdapterCommand::Shodan { api_key: "key".to_string() }, 7),
            (AdapterCommand::Virustotal { api_key: "key".to_string() }, 7),
            (
                AdapterCommand::Zap {
                    url: "http://127.0.0.1:8080".to_string(),
                    api_key: None,
                },
                9,
            ),
            (
                AdapterCommand::Burpsuite {
                    url: "http://127.0.0.1:1337/v0.1".to_string(),
                },
                5,
            ),
            (AdapterCommand::Nessus, 7),
            (AdapterCommand::Nextjs, 5),
            (AdapterCommand::Hydra { binary: binary("hydra") }, 5),
            (AdapterCommand::Metasploit { binary: binary("msfconsole") }, 8),
            (
                AdapterCommand::Ghidra {
                    binary: binary("analyzeHeadless"),
                    project_dir: PathBuf::from("/tmp/ghidra_projects"),
                },
                5,
            ),
            (
                AdapterCommand::Bloodhound {
                    url: "bolt://localhost:7687".to_string(),
                    password: "bloodhound".to_string(),
                    user: "neo4j".to_string(),
                },
                8,
            ),
            (AdapterCommand::Crackmapexec { binary: binary("nxc") }, 6),
        ]
    }

    #[test]
    fn test_every_adapter_registers_unique_names() {
        let config = Config::default();
        for (adapter, expected) in all_adapters() {
            let listed = names(&adapter, &config);
            let unique: HashSet<_> = listed.iter().collect();
            assert_eq!(listed.len(), expected, "{}: {listed:?}", adapter.name());
            assert_eq!(unique.len(), listed.len(), "{} has duplicate names", adapter.name());
        }
    }

    #[test]
    fn test_listing_is_stable() {
        let config = Config::default();
        let adapter = AdapterCommand::Kubeaudit { binary: binary("kubeaudit") };
        let router: ToolRouter<TestServer> =
            assert_ok!(build_tool_router(&adapter, &config, runner()));
        let first = serde_json::to_string(&router.list_all()).unwrap();
        let second = serde_json::to_string(&router.list_all()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_acunetix_requires_environment() {
        let config = Config::default();
        let Err(err) = build_tool_router::<TestServer>(&AdapterCommand::Acunetix, &config, runner())
        else {
            panic!("acunetix without credentials must not start");
        };
        assert!(matches!(err, Error::Config(_)));

        let config = Config {
            credentials: CredentialsConfig {
                acunetix_url: Some("https://awvs.local:3443".to_string()),
                acunetix_api_key: Some("key".to_string()),
                ..CredentialsConfig::default()
            },
            ..Config::default()
        };
        assert_eq!(names(&AdapterCommand::Acunetix, &config).len(), 6);
    }
}
