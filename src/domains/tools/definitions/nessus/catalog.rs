//! Bundled scan templates and vulnerability catalogue.

use serde::Serialize;
use serde_json::{Value, json};

use super::backend::Severity;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Vulnerability {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub severity: Severity,
    pub cvss_score: f64,
    pub affected_systems: &'static [&'static str],
    pub remediation: &'static str,
    pub references: &'static [&'static str],
}

pub static VULNERABILITIES: [Vulnerability; 10] = [
    Vulnerability {
        id: "CVE-2021-44228",
        name: "Log4Shell",
        description: "Remote code execution vulnerability in Apache Log4j",
        severity: Severity::Critical,
        cvss_score: 10.0,
        affected_systems: &["Java applications using Log4j 2.0-2.14.1"],
        remediation: "Update to Log4j 2.15.0 or later",
        references: &[
            "https://nvd.nist.gov/vuln/detail/CVE-2021-44228",
            "https://logging.apache.org/log4j/2.x/security.html",
        ],
    },
    Vulnerability {
        id: "CVE-2023-23397",
        name: "Microsoft Outlook Elevation of Privilege",
        description: "Microsoft Outlook vulnerability allowing privilege escalation",
        severity: Severity::High,
        cvss_score: 9.8,
        affected_systems: &["Microsoft Outlook for Windows"],
        remediation: "Install latest Microsoft security updates",
        references: &["https://msrc.microsoft.com/update-guide/vulnerability/CVE-2023-23397"],
    },
    Vulnerability {
        id: "CVE-2022-22965",
        name: "Spring4Shell",
        description: "Remote code execution vulnerability in Spring Framework",
        severity: Severity::Critical,
        cvss_score: 9.8,
        affected_systems: &[
            "Spring Framework 5.3.0 to 5.3.17",
            "Spring Framework 5.2.0 to 5.2.19",
        ],
        remediation: "Update to Spring Framework 5.3.18+ or 5.2.20+",
        references: &["https://tanzu.vmware.com/security/cve-2022-22965"],
    },
    Vulnerability {
        id: "CVE-2021-34527",
        name: "PrintNightmare",
        description: "Windows Print Spooler remote code execution vulnerability",
        severity: Severity::Critical,
        cvss_score: 8.8,
        affected_systems: &["Windows Print Spooler service"],
        remediation: "Install Microsoft security updates and disable Print Spooler when not needed",
        references: &["https://msrc.microsoft.com/update-guide/vulnerability/CVE-2021-34527"],
    },
    Vulnerability {
        id: "CVE-2021-26855",
        name: "ProxyLogon",
        description: "Microsoft Exchange Server vulnerability",
        severity: Severity::Critical,
        cvss_score: 9.8,
        affected_systems: &["Microsoft Exchange Server 2013-2019"],
        remediation: "Install security updates for Exchange Server",
        references: &["https://msrc.microsoft.com/update-guide/vulnerability/CVE-2021-26855"],
    },
    Vulnerability {
        id: "CVE-2022-30190",
        name: "Follina",
        description: "Microsoft Support Diagnostic Tool vulnerability",
        severity: Severity::High,
        cvss_score: 7.8,
        affected_systems: &["Microsoft Office"],
        remediation: "Apply Microsoft security updates",
        references: &["https://msrc.microsoft.com/update-guide/vulnerability/CVE-2022-30190"],
    },
    Vulnerability {
        id: "CVE-2020-1472",
        name: "Zerologon",
        description: "Windows Netlogon elevation of privilege vulnerability",
        severity: Severity::Critical,
        cvss_score: 10.0,
        affected_systems: &["Windows Server 2008-2019"],
        remediation: "Install August 2020 security update and enable enforcement mode",
        references: &["https://msrc.microsoft.com/update-guide/vulnerability/CVE-2020-1472"],
    },
    Vulnerability {
        id: "CVE-2019-19781",
        name: "Citrix ADC Vulnerability",
        description: "Directory traversal vulnerability in Citrix ADC and Gateway",
        severity: Severity::Critical,
        cvss_score: 9.8,
        affected_systems: &["Citrix ADC and Gateway 10.5-13.0"],
        remediation: "Apply Citrix security updates",
        references: &["https://support.citrix.com/article/CTX267027"],
    },
    Vulnerability {
        id: "CVE-2021-40444",
        name: "MSHTML Remote Code Execution",
        description: "Microsoft MSHTML remote code execution vulnerability",
        severity: Severity::High,
        cvss_score: 8.8,
        affected_systems: &["Windows with Microsoft Office"],
        remediation: "Install Microsoft security updates",
        references: &["https://msrc.microsoft.com/update-guide/vulnerability/CVE-2021-40444"],
    },
    Vulnerability {
        id: "CVE-2021-3156",
        name: "Sudo Baron Samedit",
        description: "Heap-based buffer overflow in Sudo",
        severity: Severity::High,
        cvss_score: 7.8,
        affected_systems: &["Unix/Linux systems with Sudo 1.8.2-1.8.31p2"],
        remediation: "Update Sudo to version 1.9.5p2 or later",
        references: &["https://cve.mitre.org/cgi-bin/cvename.cgi?name=CVE-2021-3156"],
    },
];

/// Exact id lookup; ids compare case-insensitively.
pub fn find(id: &str) -> Option<&'static Vulnerability> {
    VULNERABILITIES
        .iter()
        .find(|v| v.id.eq_ignore_ascii_case(id.trim()))
}

/// Case-insensitive substring match on name or description.
pub fn search(keyword: &str) -> Vec<&'static Vulnerability> {
    let keyword = keyword.to_lowercase();
    VULNERABILITIES
        .iter()
        .filter(|v| {
            v.name.to_lowercase().contains(&keyword)
                || v.description.to_lowercase().contains(&keyword)
        })
        .collect()
}

pub fn templates() -> Value {
    json!({
        "templates": [
            {
                "id": "basic-network-scan",
                "name": "Basic Network Scan",
                "description": "Standard network vulnerability assessment",
                "capabilities": ["OS detection", "Service discovery", "Vulnerability detection"]
            },
            {
                "id": "web-app-scan",
                "name": "Web Application Scan",
                "description": "Comprehensive web application security assessment",
                "capabilities": ["SQL injection", "XSS detection", "CSRF testing", "Authentication testing"]
            },
            {
                "id": "compliance-scan",
                "name": "Compliance Scan",
                "description": "Regulatory compliance assessment",
                "capabilities": ["PCI DSS", "HIPAA", "SOX", "GDPR"]
            }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_is_case_insensitive() {
        assert_eq!(find("cve-2021-44228").map(|v| v.name), Some("Log4Shell"));
        assert!(find("CVE-1999-0001").is_none());
    }

    #[test]
    fn test_search_matches_name_and_description() {
        let ids: Vec<_> = search("remote code").iter().map(|v| v.id).collect();
        assert_eq!(
            ids,
            ["CVE-2021-44228", "CVE-2022-22965", "CVE-2021-34527", "CVE-2021-40444"]
        );
        assert_eq!(search("zerologon").len(), 1);
        assert!(search("kubernetes").is_empty());
    }
}
