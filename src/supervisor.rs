//! Child-process lifecycle: crash-restart, backoff, coalesced explicit
//! restarts, graceful SIGTERM→SIGKILL shutdown, and log capture (§4.7).

use std::path::PathBuf;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};

/// Supervisor state machine states (§3, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Stopping,
    Backoff,
    Terminated,
}

/// Keeps exactly one child process alive under a config file, restarting
/// on crash with exponential backoff and honoring coalesced restart
/// requests and graceful shutdown.
pub struct Supervisor {
    binary: String,
    config_file: PathBuf,
    min_backoff: Duration,
    max_backoff: Duration,
    success_threshold: Duration,
    graceful_timeout: Duration,
    restart_tx: mpsc::Sender<()>,
    restart_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
}

impl Supervisor {
    pub fn new(
        binary: impl Into<String>,
        config_file: PathBuf,
        min_backoff: Duration,
        max_backoff: Duration,
        success_threshold: Duration,
        graceful_timeout: Duration,
    ) -> Self {
        let (restart_tx, restart_rx) = mpsc::channel(1);
        Supervisor {
            binary: binary.into(),
            config_file,
            min_backoff,
            max_backoff,
            success_threshold,
            graceful_timeout,
            restart_tx,
            restart_rx: tokio::sync::Mutex::new(restart_rx),
        }
    }

    /// Offer a restart request into the single-slot coalescing channel. A
    /// full slot is a successful no-op — multiple rapid calls collapse
    /// into one pending restart.
    pub fn restart(&self) {
        match self.restart_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => {
                debug!("restart requested after supervisor shutdown; dropped");
            }
        }
    }

    /// Run the supervisor until `cancel` fires. Always loops until
    /// shutdown (spec.md §9: the source's unreachable `else` branch is
    /// read as "no exit besides cancellation").
    pub async fn run(&self, cancel: &CancellationToken) -> SupervisorState {
        let mut backoff = self.min_backoff;
        let mut restart_rx = self.restart_rx.lock().await;

        loop {
            if cancel.is_cancelled() {
                return SupervisorState::Terminated;
            }

            let mut child = match self.spawn_child().await {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "failed to spawn child, entering backoff");
                    if sleep_cancellable(backoff, cancel, &mut restart_rx).await.is_err() {
                        return SupervisorState::Terminated;
                    }
                    backoff = next_backoff(backoff, self.max_backoff);
                    continue;
                }
            };
            let pid = child.id();
            let started_at = tokio::time::Instant::now();
            info!(?pid, "child started");

            let stdout = child.stdout.take();
            let stderr = child.stderr.take();
            if let Some(stdout) = stdout {
                tokio::spawn(forward_lines(stdout, pid, "stdout"));
            }
            if let Some(stderr) = stderr {
                tokio::spawn(forward_lines(stderr, pid, "stderr"));
            }

            let outcome = tokio::select! {
                status = child.wait() => Outcome::Exited(status),
                _ = restart_rx.recv() => Outcome::RestartRequested,
                _ = cancel.cancelled() => Outcome::Shutdown,
            };

            match outcome {
                Outcome::Shutdown => {
                    self.graceful_stop(&mut child).await;
                    return SupervisorState::Terminated;
                }
                Outcome::RestartRequested => {
                    info!(?pid, "restart requested, stopping child immediately");
                    self.graceful_stop(&mut child).await;
                    backoff = self.min_backoff;
                    continue;
                }
                Outcome::Exited(status) => {
                    let ran_for = started_at.elapsed();
                    let ok = matches!(&status, Ok(s) if s.success());
                    if ran_for >= self.success_threshold {
                        backoff = self.min_backoff;
                    }
                    if ok {
                        info!(?pid, ran_for_secs = ran_for.as_secs(), "child exited cleanly");
                    } else {
                        warn!(?pid, ?status, ran_for_secs = ran_for.as_secs(), "child exited with error");
                    }
                    if sleep_cancellable(backoff, cancel, &mut restart_rx).await.is_err() {
                        return SupervisorState::Terminated;
                    }
                    backoff = next_backoff(backoff, self.max_backoff);
                }
            }
        }
    }

    async fn spawn_child(&self) -> Result<Child> {
        Command::new(&self.binary)
            .arg("-config")
            .arg(&self.config_file)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(AgentError::from)
    }

    /// SIGTERM, then wait up to `graceful_timeout` before SIGKILL.
    async fn graceful_stop(&self, child: &mut Child) {
        let Some(pid) = child.id() else {
            return;
        };
        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!(error = %e, pid, "failed to send SIGTERM");
        }
        match tokio::time::timeout(self.graceful_timeout, child.wait()).await {
            Ok(_) => debug!(pid, "child exited after SIGTERM"),
            Err(_) => {
                warn!(pid, "graceful timeout elapsed, sending SIGKILL");
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
    }
}

enum Outcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    RestartRequested,
    Shutdown,
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}

/// Sleep out a backoff interval, discarding any restart request that
/// arrives during it: the Backoff state's transition for "restart request"
/// is "drop, no pending child" (spec.md §4.7) — a buffered request here
/// must not make the next freshly-started child get killed on sight.
async fn sleep_cancellable(
    duration: Duration,
    cancel: &CancellationToken,
    restart_rx: &mut mpsc::Receiver<()>,
) -> std::result::Result<(), ()> {
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(()),
            _ = &mut sleep => return Ok(()),
            _ = restart_rx.recv() => continue,
        }
    }
}

async fn forward_lines<R: tokio::io::AsyncRead + Unpin>(reader: R, pid: Option<u32>, stream: &'static str) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if stream == "stderr" {
                    warn!(pid, stream, "{line}");
                } else {
                    info!(pid, stream, "{line}");
                }
            }
            Ok(None) => return,
            Err(e) => {
                debug!(pid, stream, error = %e, "log forwarder stopped");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_script(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "#!/bin/sh").unwrap();
        write!(f, "{body}").unwrap();
        drop(f);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    #[tokio::test]
    async fn p9_runs_and_terminates_on_cancel() {
        let dir = tempdir().unwrap();
        let script = write_script(dir.path(), "sleeper.sh", "sleep 30\n");
        let config_file = dir.path().join("config.yml");
        std::fs::write(&config_file, "placeholder").unwrap();

        let sup = Supervisor::new(
            script.to_string_lossy().to_string(),
            config_file,
            Duration::from_millis(10),
            Duration::from_millis(100),
            Duration::from_secs(60),
            Duration::from_secs(2),
        );
        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();
        let handle = tokio::spawn(async move { sup.run(&cancel2).await });

        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        let state = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state, SupervisorState::Terminated);
    }

    #[tokio::test]
    async fn restarts_after_crash() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("runs");
        let script = write_script(
            dir.path(),
            "crasher.sh",
            &format!("echo run >> {}\nexit 1\n", marker.display()),
        );
        let config_file = dir.path().join("config.yml");
        std::fs::write(&config_file, "placeholder").unwrap();

        let sup = Supervisor::new(
            script.to_string_lossy().to_string(),
            config_file,
            Duration::from_millis(5),
            Duration::from_millis(20),
            Duration::from_secs(60),
            Duration::from_secs(1),
        );
        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();
        let handle = tokio::spawn(async move { sup.run(&cancel2).await });

        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;

        let runs = std::fs::read_to_string(&marker).unwrap_or_default();
        assert!(runs.lines().count() >= 2, "expected multiple crash-restarts, got: {runs:?}");
    }
}
