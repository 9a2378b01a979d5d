//! Success policies for external tools.
//!
//! Security scanners disagree on what a non-zero exit means: gitleaks exits 1
//! when it finds secrets, subfinder may exit non-zero after printing results,
//! kube-bench exits non-zero when checks fail. Each adapter declares its rule
//! once and the runner applies it.

use std::fmt;
use std::sync::Arc;

use super::ProcessOutput;

/// Decides whether a finished process counts as a successful invocation.
#[derive(Clone)]
pub enum SuccessPolicy {
    /// Only exit code 0 is success.
    ExitCodeZero,
    /// Exit codes 0 and 1 are success ("ran fine" / "ran fine and found something").
    ExitCodeZeroOrOne,
    /// Success if stdout is non-empty, or the exit code is 0.
    AnyOutputOrExitZero,
    /// Adapter-specific rule.
    Custom(Arc<dyn Fn(&ProcessOutput) -> bool + Send + Sync>),
}

impl SuccessPolicy {
    /// Build a custom policy from a predicate.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&ProcessOutput) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// A policy that accepts every exit. For tools whose exit code reports
    /// audit results rather than execution problems.
    pub fn always() -> Self {
        Self::custom(|_| true)
    }

    pub fn accepts(&self, output: &ProcessOutput) -> bool {
        match self {
            Self::ExitCodeZero => output.exit_code == Some(0),
            Self::ExitCodeZeroOrOne => matches!(output.exit_code, Some(0) | Some(1)),
            Self::AnyOutputOrExitZero => !output.stdout.is_empty() || output.exit_code == Some(0),
            Self::Custom(predicate) => predicate(output),
        }
    }
}

impl fmt::Debug for SuccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExitCodeZero => f.write_str("ExitCodeZero"),
            Self::ExitCodeZeroOrOne => f.write_str("ExitCodeZeroOrOne"),
            Self::AnyOutputOrExitZero => f.write_str("AnyOutputOrExitZero"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &str, stderr: &str, exit_code: Option<i32>) -> ProcessOutput {
        ProcessOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
            ..ProcessOutput::default()
        }
    }

    #[test]
    fn test_exit_code_zero() {
        let policy = SuccessPolicy::ExitCodeZero;
        assert!(policy.accepts(&output("", "", Some(0))));
        assert!(!policy.accepts(&output("results", "", Some(1))));
        assert!(!policy.accepts(&output("", "", None)));
    }

    #[test]
    fn test_exit_code_zero_or_one() {
        let policy = SuccessPolicy::ExitCodeZeroOrOne;
        assert!(policy.accepts(&output("", "", Some(0))));
        assert!(policy.accepts(&output("[]", "", Some(1))));
        assert!(!policy.accepts(&output("", "boom", Some(2))));
    }

    #[test]
    fn test_any_output_or_exit_zero() {
        let policy = SuccessPolicy::AnyOutputOrExitZero;
        assert!(policy.accepts(&output("a.example.com", "", Some(2))));
        assert!(policy.accepts(&output("", "", Some(0))));
        assert!(!policy.accepts(&output("", "rate limited", Some(1))));
    }

    #[test]
    fn test_custom_and_always() {
        let signal_ok = SuccessPolicy::custom(|o| matches!(o.exit_code, Some(0) | None));
        assert!(signal_ok.accepts(&output("", "", None)));
        assert!(!signal_ok.accepts(&output("", "", Some(3))));

        assert!(SuccessPolicy::always().accepts(&output("", "", Some(42))));
        assert_eq!(format!("{:?}", signal_ok), "Custom(..)");
    }
}
