//! The run-external-command primitive.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::{CommandSpec, ExecError, ProcessOutput};
use crate::core::config::ExecutionConfig;

/// How long to keep draining pipes after a timeout kill.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Runs subprocesses under a shared concurrency cap.
#[derive(Debug)]
pub struct CommandRunner {
    permits: Arc<Semaphore>,
    max_output_bytes: usize,
    default_timeout: Duration,
}

impl CommandRunner {
    pub fn new(config: &ExecutionConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            max_output_bytes: config.max_output_bytes,
            default_timeout: config.default_timeout(),
        }
    }

    /// Spawn `spec`, capture its output and apply its success policy.
    ///
    /// A timeout is not an error: the child is killed and whatever it printed
    /// is returned with `timed_out` set.
    pub async fn run(&self, spec: CommandSpec) -> Result<ProcessOutput, ExecError> {
        let program = spec.display_name();
        let _permit = self.permits.acquire().await.map_err(|e| ExecError::Io {
            program: program.clone(),
            source: std::io::Error::other(e),
        })?;

        debug!(program = %spec.program.display(), args = ?spec.args, "Spawning");
        let started = Instant::now();

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: program.clone(),
                source,
            })?;

        if let (Some(input), Some(mut stdin)) = (spec.stdin, child.stdin.take()) {
            // Written from a task so a child that prints before reading cannot deadlock us.
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    debug!("stdin write ended early: {}", e);
                }
                let _ = stdin.shutdown().await;
            });
        }

        let stdout_buf = Arc::new(Mutex::new(CappedBuffer::new(self.max_output_bytes)));
        let stderr_buf = Arc::new(Mutex::new(CappedBuffer::new(self.max_output_bytes)));
        let mut stdout_task = tokio::spawn(drain(child.stdout.take(), stdout_buf.clone()));
        let mut stderr_task = tokio::spawn(drain(child.stderr.take(), stderr_buf.clone()));

        let limit = spec.timeout.unwrap_or(self.default_timeout);
        let finished = tokio::time::timeout(limit, async {
            let status = child.wait().await;
            let _ = (&mut stdout_task).await;
            let _ = (&mut stderr_task).await;
            status
        })
        .await;

        let (exit_code, timed_out) = match finished {
            Ok(Ok(status)) => (status.code(), false),
            Ok(Err(source)) => return Err(ExecError::Io { program, source }),
            Err(_) => {
                warn!(
                    program = %program,
                    timeout_secs = limit.as_secs(),
                    "Timed out, killing process"
                );
                if let Err(e) = child.kill().await {
                    debug!("kill after timeout failed: {}", e);
                }
                let _ = tokio::time::timeout(KILL_GRACE, async {
                    let _ = (&mut stdout_task).await;
                    let _ = (&mut stderr_task).await;
                })
                .await;
                stdout_task.abort();
                stderr_task.abort();
                (None, true)
            }
        };

        let (stdout, stdout_truncated) = take_text(&stdout_buf);
        let (stderr, stderr_truncated) = take_text(&stderr_buf);
        let output = ProcessOutput {
            stdout,
            stderr,
            exit_code,
            timed_out,
            truncated: stdout_truncated || stderr_truncated,
            elapsed: started.elapsed(),
        };

        debug!(
            program = %program,
            exit_code = ?output.exit_code,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "Process finished"
        );

        if output.timed_out || spec.policy.accepts(&output) {
            return Ok(output);
        }

        let stderr = if output.stderr.trim().is_empty() {
            match output.exit_code {
                Some(code) => format!("Process exited with code {code}"),
                None => "Process terminated by signal".to_string(),
            }
        } else {
            output.stderr
        };
        Err(ExecError::Failed {
            program,
            code: output.exit_code,
            stderr,
            stdout: output.stdout,
        })
    }
}

/// Byte sink that keeps at most `cap` bytes and remembers whether it dropped any.
#[derive(Debug)]
struct CappedBuffer {
    data: Vec<u8>,
    cap: usize,
    truncated: bool,
}

impl CappedBuffer {
    fn new(cap: usize) -> Self {
        Self {
            data: Vec::new(),
            cap,
            truncated: false,
        }
    }

    fn extend(&mut self, chunk: &[u8]) {
        let room = self.cap.saturating_sub(self.data.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.data.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }
}

/// Read a pipe to EOF. Bytes past the cap are still read so the child never
/// blocks on a full pipe. A read error ends the stream like EOF.
async fn drain<R>(reader: Option<R>, sink: Arc<Mutex<CappedBuffer>>)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else { return };
    let mut chunk = vec![0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if let Ok(mut buf) = sink.lock() {
                    buf.extend(&chunk[..n]);
                }
            }
            Err(e) => {
                debug!("pipe closed early: {}", e);
                break;
            }
        }
    }
}

fn take_text(buf: &Arc<Mutex<CappedBuffer>>) -> (String, bool) {
    match buf.lock() {
        Ok(mut buf) => {
            let data = std::mem::take(&mut buf.data);
            (String::from_utf8_lossy(&data).into_owned(), buf.truncated)
        }
        Err(_) => (String::new(), false),
    }
}
