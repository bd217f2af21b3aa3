//! One `toolscout serve` child driven over its stdio.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::ipc::client::RpcClient;

/// Stderr marker written by `serve` once it accepts frames.
pub const READY_MARKER: &str = "toolscout ready";

pub type ChildClient = RpcClient<ChildStdout, ChildStdin>;

pub struct ServerProcess {
    label: String,
    child: Child,
    client: Option<ChildClient>,
    stderr_task: tokio::task::JoinHandle<()>,
}

impl ServerProcess {
    /// Spawn this executable as `serve <args>` and wait for the readiness line.
    pub async fn spawn(label: &str, args: &[String], ready_timeout: Duration) -> Result<Self> {
        let exe = std::env::current_exe().context("Cannot locate toolscout executable")?;
        let mut child = Command::new(&exe)
            .arg("serve")
            .args(args)
            .env("TOOLSCOUT_LOG_TEXT", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {:?} serve", exe))?;

        let stdin = child.stdin.take().context("child stdin not captured")?;
        let stdout = child.stdout.take().context("child stdout not captured")?;
        let stderr = child.stderr.take().context("child stderr not captured")?;
        let mut stderr_lines = BufReader::new(stderr).lines();

        let wait_ready = async {
            while let Some(line) = stderr_lines.next_line().await? {
                if line.contains(READY_MARKER) {
                    return Ok::<bool, std::io::Error>(true);
                }
                tracing::debug!(server = label, "{}", line);
            }
            Ok(false)
        };
        match tokio::time::timeout(ready_timeout, wait_ready).await {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => anyhow::bail!("{} server exited before becoming ready", label),
            Ok(Err(e)) => return Err(e).context("Reading server stderr"),
            Err(_) => anyhow::bail!("{} server not ready after {:?}", label, ready_timeout),
        }
        tracing::info!(server = label, pid = ?child.id(), "Server ready");

        // keep draining so the child never blocks on a full stderr pipe
        let drain_label = label.to_string();
        let stderr_task = tokio::spawn(async move {
            while let Ok(Some(line)) = stderr_lines.next_line().await {
                tracing::trace!(server = %drain_label, "{}", line);
            }
        });

        Ok(Self {
            label: label.to_string(),
            child,
            client: Some(RpcClient::new(stdout, stdin)),
            stderr_task,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn client(&mut self) -> Result<&mut ChildClient> {
        self.client.as_mut().context("server already shut down")
    }

    /// Close stdin and send SIGTERM, wait up to `grace`, then kill.
    /// Returns the exit code if any.
    pub async fn shutdown(mut self, grace: Duration) -> Result<Option<i32>> {
        // dropping the client closes the child's stdin
        self.client.take();
        self.terminate().await;

        let status = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                tracing::warn!(server = %self.label, "No exit after {:?}, killing", grace);
                self.child.kill().await?;
                self.child.wait().await?
            }
        };
        self.stderr_task.abort();
        tracing::debug!(server = %self.label, ?status, "Server stopped");
        Ok(status.code())
    }

    /// Best-effort SIGTERM. The child is not reaped yet, so its pid is still ours.
    async fn terminate(&self) {
        let Some(pid) = self.child.id() else {
            return;
        };
        match Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) if status.success() => {
                tracing::debug!(server = %self.label, pid, "Sent SIGTERM");
            }
            Ok(status) => tracing::debug!(server = %self.label, pid, ?status, "SIGTERM not delivered"),
            Err(e) => tracing::debug!(server = %self.label, "Cannot run kill: {}", e),
        }
    }
}
