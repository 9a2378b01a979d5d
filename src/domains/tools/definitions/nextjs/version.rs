//! Next.js release classification for CVE-2025-66478 / CVE-2025-55182.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// 15.x releases carrying the fix. Any other 15.x is vulnerable.
pub const PATCHED_15: [&str; 6] = ["15.0.5", "15.1.9", "15.2.6", "15.3.6", "15.4.8", "15.5.7"];

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(\d+)\.(\d+)(?:-([a-zA-Z]+)\.?(\d+))?").expect("valid regex")
});

/// `major.minor.patch[-tag.N]`, e.g. `14.3.0-canary.77`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub prerelease_num: Option<u64>,
}

impl NextVersion {
    pub fn parse(version: &str) -> Option<Self> {
        let caps = VERSION_PATTERN.captures(version.trim())?;
        let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
        Some(Self {
            major: number(1)?,
            minor: number(2)?,
            patch: number(3)?,
            prerelease: caps.get(4).map(|m| m.as_str().to_string()),
            prerelease_num: number(5),
        })
    }

    /// Semver-ish ordering: a prerelease sorts before its stable release;
    /// two prereleases compare by their number when both have one.
    pub fn compare(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                _ => match (self.prerelease_num, other.prerelease_num) {
                    (Some(a), Some(b)) => a.cmp(&b),
                    _ => Ordering::Equal,
                },
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub vulnerable: bool,
    pub reason: String,
}

impl Verdict {
    fn vulnerable(reason: String) -> Self {
        Self {
            vulnerable: true,
            reason,
        }
    }

    fn safe(reason: String) -> Self {
        Self {
            vulnerable: false,
            reason,
        }
    }
}

pub fn check(version: &str) -> Verdict {
    let version = version.trim();
    let Some(parsed) = NextVersion::parse(version) else {
        return Verdict::safe(format!("Unable to parse version: {version}"));
    };

    match parsed.major {
        16 => {
            let fixed = NextVersion {
                major: 16,
                minor: 0,
                patch: 7,
                prerelease: None,
                prerelease_num: None,
            };
            if parsed.compare(&fixed) == Ordering::Less {
                Verdict::vulnerable(format!(
                    "Next.js {version} is vulnerable. Upgrade to 16.0.7 or later."
                ))
            } else {
                Verdict::safe(format!("Next.js {version} is patched (>= 16.0.7)"))
            }
        }
        15 if PATCHED_15.contains(&version) => {
            Verdict::safe(format!("Next.js {version} is a patched release"))
        }
        15 => Verdict::vulnerable(format!(
            "Next.js {version} is vulnerable. Upgrade to one of: {}",
            PATCHED_15.join(", ")
        )),
        14 if parsed.prerelease.as_deref() == Some("canary") => {
            if parsed.prerelease_num.is_some_and(|n| n >= 77) {
                Verdict::vulnerable(format!("Next.js {version} (canary >= 77) is vulnerable"))
            } else {
                Verdict::safe(format!("Next.js {version} (canary < 77) is not affected"))
            }
        }
        14 if parsed.prerelease.is_none() => {
            Verdict::safe(format!("Next.js {version} stable is not affected by this CVE"))
        }
        major if major <= 13 => {
            Verdict::safe(format!("Next.js {version} is not affected by this CVE"))
        }
        _ => Verdict::safe(format!(
            "Next.js {version} - unknown version, manual verification recommended"
        )),
    }
}

pub fn summary() -> String {
    format!(
        "CVE-2025-66478 & CVE-2025-55182 - Next.js React Server Components RCE\n\
         \n\
         VULNERABLE VERSIONS:\n\
         - Next.js 16.x < 16.0.7\n\
         - Next.js 15.x (except: {})\n\
         - Next.js 14.3.0-canary.77 and later canary builds\n\
         \n\
         NOT AFFECTED:\n\
         - Next.js 14.x stable releases\n\
         - Next.js 13.x and earlier\n\
         - Applications not using React Server Components\n\
         \n\
         PATCHED VERSIONS:\n\
         - 16.0.7+\n\
         - 15.5.7, 15.4.8, 15.3.6, 15.2.6, 15.1.9, 15.0.5",
        PATCHED_15.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canary() {
        let v = NextVersion::parse("14.3.0-canary.77").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (14, 3, 0));
        assert_eq!(v.prerelease.as_deref(), Some("canary"));
        assert_eq!(v.prerelease_num, Some(77));
        assert!(NextVersion::parse("latest").is_none());
    }

    #[test]
    fn test_prerelease_sorts_before_stable() {
        let rc = NextVersion::parse("16.0.7-canary.3").unwrap();
        let stable = NextVersion::parse("16.0.7").unwrap();
        assert_eq!(rc.compare(&stable), Ordering::Less);
        assert_eq!(stable.compare(&rc), Ordering::Greater);
    }

    #[test]
    fn test_release_lines() {
        assert!(check("16.0.6").vulnerable);
        assert!(!check("16.0.7").vulnerable);
        assert!(!check("16.1.0").vulnerable);
        assert!(check("16.0.7-canary.2").vulnerable);

        assert!(check("15.0.1").vulnerable);
        assert!(!check("15.2.6").vulnerable);
        assert!(check("15.2.7").vulnerable);

        assert!(check("14.3.0-canary.77").vulnerable);
        assert!(!check("14.3.0-canary.76").vulnerable);
        assert!(!check("14.2.3").vulnerable);
        assert!(!check("13.5.6").vulnerable);
    }

    #[test]
    fn test_unknown_and_unparsable() {
        let future = check("17.0.0");
        assert!(!future.vulnerable);
        assert!(future.reason.contains("manual verification recommended"));
        assert_eq!(check("next").reason, "Unable to parse version: next");
    }
}
