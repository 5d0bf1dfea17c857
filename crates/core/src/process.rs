//! Child process execution
//!
//! Spawns child programs in capture or interactive mode. Every spawn is a
//! cancellation checkpoint: when the token fires, the child's whole
//! process subtree is killed before the call returns.

use crate::errors::{CaiError, Result};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Output of a captured child process.
#[derive(Debug, Clone, Default)]
pub struct CaptureOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CaptureOutput {
    /// Whether the child exited 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Spawns children under a shared cancellation token.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    cancel: CancellationToken,
}

impl ProcessRunner {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// The token this runner propagates to every child.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run a program, capturing stdout and stderr.
    pub async fn capture(&self, program: &str, args: &[String]) -> Result<CaptureOutput> {
        self.capture_with_stdin(program, args, None).await
    }

    /// Run a program, optionally feeding `stdin` and capturing output.
    pub async fn capture_with_stdin(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&str>,
    ) -> Result<CaptureOutput> {
        debug!(program, ?args, "spawning (capture)");
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        configure_process_group(&mut cmd);

        let mut child = spawn(cmd, program)?;

        if let (Some(data), Some(mut sink)) = (stdin, child.stdin.take()) {
            use tokio::io::AsyncWriteExt;
            let bytes = data.as_bytes().to_vec();
            tokio::spawn(async move {
                let _ = sink.write_all(&bytes).await;
                let _ = sink.shutdown().await;
            });
        }

        let out_task = tokio::spawn(drain(child.stdout.take()));
        let err_task = tokio::spawn(drain(child.stderr.take()));

        tokio::select! {
            _ = self.cancel.cancelled() => {
                kill_tree(&mut child).await;
                Err(CaiError::Cancelled)
            }
            status = child.wait() => {
                let status = status?;
                let stdout = out_task.await.unwrap_or_default();
                let stderr = err_task.await.unwrap_or_default();
                Ok(CaptureOutput {
                    exit_code: status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                })
            }
        }
    }

    /// Run a program with inherited stdio, returning its exit code.
    pub async fn interactive(&self, program: &str, args: &[String]) -> Result<i32> {
        debug!(program, ?args, "spawning (interactive)");
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        configure_process_group(&mut cmd);

        let mut child = spawn(cmd, program)?;

        tokio::select! {
            _ = self.cancel.cancelled() => {
                kill_tree(&mut child).await;
                Err(CaiError::Cancelled)
            }
            status = child.wait() => Ok(status?.code().unwrap_or(-1)),
        }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

fn spawn(mut cmd: Command, program: &str) -> Result<Child> {
    cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CaiError::ChildMissing {
                program: program.to_string(),
            }
        } else {
            e.into()
        }
    })
}

async fn drain(reader: Option<impl AsyncRead + Unpin>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut r) = reader {
        let _ = r.read_to_end(&mut buf).await;
    }
    buf
}

#[cfg(unix)]
fn configure_process_group(cmd: &mut Command) {
    // The child leads its own process group so the whole subtree can be
    // signalled at once on cancellation.
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn configure_process_group(_cmd: &mut Command) {}

/// Kill the child together with its process subtree, bounded-time.
async fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // Signal the whole group the child leads.
        let status = Command::new("kill")
            .arg("-KILL")
            .arg("--")
            .arg(format!("-{pid}"))
            .status()
            .await;
        if let Err(e) = status {
            warn!("group kill failed: {e}");
        }
    }
    if let Err(e) = child.kill().await {
        warn!("child kill failed: {e}");
    }
    let _ = child.wait().await;
}
