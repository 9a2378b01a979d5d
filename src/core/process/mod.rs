//! Subprocess execution for command-line security tools.
//!
//! Every CLI adapter funnels through [`CommandRunner::run`]: build an argv,
//! spawn without a shell, drain stdout/stderr concurrently into bounded
//! buffers, enforce a timeout, then judge the exit with the tool's
//! [`SuccessPolicy`].

mod policy;
mod runner;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub use policy::SuccessPolicy;
pub use runner::CommandRunner;

/// Everything needed to launch one process.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Written to the child's stdin, which is then closed.
    pub stdin: Option<String>,
    pub policy: SuccessPolicy,
    /// Overrides the runner's default timeout.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            policy: SuccessPolicy::ExitCodeZero,
            timeout: None,
        }
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn policy(mut self, policy: SuccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Short program name for messages (`/usr/bin/nmap` -> `nmap`).
    pub fn display_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// Captured result of a finished (or timed-out) process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// None when the process was killed by a signal or by the timeout.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Set when either stream hit the capture cap.
    pub truncated: bool,
    pub elapsed: Duration,
}

impl ProcessOutput {
    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        text.push_str(&self.stderr);
        text
    }

    /// stdout, or stderr when stdout is empty.
    pub fn stdout_or_stderr(&self) -> &str {
        if self.stdout.is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }

    /// Marker appended to results built from partial output.
    pub fn notice(&self) -> Option<String> {
        let mut notes = Vec::new();
        if self.timed_out {
            notes.push(format!(
                "[timed out after {}s; output may be incomplete]",
                self.elapsed.as_secs()
            ));
        }
        if self.truncated {
            notes.push("[output truncated at capture limit]".to_string());
        }
        (!notes.is_empty()).then(|| notes.join("\n"))
    }

    /// Append [`ProcessOutput::notice`] to an already formatted result.
    pub fn annotate(&self, text: String) -> String {
        match self.notice() {
            Some(notice) => format!("{text}\n\n{notice}"),
            None => text,
        }
    }
}

/// Errors raised while running a subprocess.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The binary is missing or not executable.
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran but its exit was rejected by the success policy.
    #[error("{program} exited with code {}: {stderr}", exit_code_label(.code))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
        /// Captured stdout, for adapters that still want to show it.
        stdout: String,
    },

    /// Waiting on the child failed.
    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

fn exit_code_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// A configured external binary: what to run, with which fixed leading
/// arguments, judged by which policy.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    program: PathBuf,
    base_args: Vec<String>,
    policy: SuccessPolicy,
    timeout: Option<Duration>,
    runner: Arc<CommandRunner>,
}

impl ExternalTool {
    pub fn new(
        program: impl Into<PathBuf>,
        policy: SuccessPolicy,
        runner: Arc<CommandRunner>,
    ) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            policy,
            timeout: None,
            runner,
        }
    }

    /// Build from a launcher command line such as `python3 -m kube_hunter`.
    /// The first word is the program and the rest become leading arguments.
    pub fn from_command_line(
        command: &str,
        policy: SuccessPolicy,
        runner: Arc<CommandRunner>,
    ) -> Self {
        let mut words = command.split_whitespace();
        let program = words.next().unwrap_or(command).to_string();
        Self::new(program, policy, runner).with_base_args(words)
    }

    /// Leading arguments placed before every invocation's own arguments.
    pub fn with_base_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.base_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Default timeout for this tool's operations.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Prepare a spec carrying the tool's program, base args, policy and timeout.
    pub fn command<I, A>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        let spec = CommandSpec::new(self.program.clone())
            .args(self.base_args.iter().cloned())
            .args(args)
            .policy(self.policy.clone());
        match self.timeout {
            Some(timeout) => spec.timeout(timeout),
            None => spec,
        }
    }

    pub async fn run<I, A>(&self, args: I) -> Result<ProcessOutput, ExecError>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.runner.run(self.command(args)).await
    }

    pub async fn run_spec(&self, spec: CommandSpec) -> Result<ProcessOutput, ExecError> {
        self.runner.run(spec).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fake tools for adapter tests: `/bin/sh -c <script>` with the
    //! handler's argv exposed as `$@`.

    use super::*;
    use crate::core::config::ExecutionConfig;

    pub fn runner() -> Arc<CommandRunner> {
        Arc::new(CommandRunner::new(&ExecutionConfig::default()))
    }

    pub fn fake_tool(script: &str, policy: SuccessPolicy) -> ExternalTool {
        ExternalTool::new("/bin/sh", policy, runner()).with_base_args(["-c", script, "fake-tool"])
    }

    /// A tool that prints each received argument on its own line.
    pub fn echo_args_tool(policy: SuccessPolicy) -> ExternalTool {
        fake_tool(r#"for a in "$@"; do printf '%s\n' "$a"; done"#, policy)
    }

    /// A binary path that cannot be spawned.
    pub fn missing_tool(policy: SuccessPolicy) -> ExternalTool {
        ExternalTool::new("/nonexistent/security-tool", policy, runner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_prepends_base_args() {
        let tool = ExternalTool::new("python3", SuccessPolicy::ExitCodeZero, testing::runner())
            .with_base_args(["/opt/commix/commix.py"]);
        let spec = tool.command(["-u", "http://target"]);
        assert_eq!(spec.program, PathBuf::from("python3"));
        assert_eq!(spec.args, vec!["/opt/commix/commix.py", "-u", "http://target"]);
    }

    #[test]
    fn test_from_command_line_splits_launcher() {
        let tool = ExternalTool::from_command_line(
            "python3 -m kube_hunter",
            SuccessPolicy::always(),
            testing::runner(),
        );
        let spec = tool.command(["--pod"]);
        assert_eq!(spec.program, PathBuf::from("python3"));
        assert_eq!(spec.args, vec!["-m", "kube_hunter", "--pod"]);
    }

    #[test]
    fn test_notice_and_annotate() {
        let clean = ProcessOutput::default();
        assert_eq!(clean.annotate("done".into()), "done");

        let partial = ProcessOutput {
            timed_out: true,
            elapsed: Duration::from_secs(600),
            ..ProcessOutput::default()
        };
        assert_eq!(
            partial.annotate("Nmap scan report".into()),
            "Nmap scan report\n\n[timed out after 600s; output may be incomplete]"
        );
    }

    #[test]
    fn test_failed_message_mentions_code_and_stderr() {
        let err = ExecError::Failed {
            program: "nmap".into(),
            code: Some(255),
            stderr: "Failed to resolve \"nohost\"".into(),
            stdout: String::new(),
        };
        assert_eq!(err.to_string(), "nmap exited with code 255: Failed to resolve \"nohost\"");
    }
}
