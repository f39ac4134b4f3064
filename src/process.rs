//! Server process supervision.
//!
//! The orchestrator talks to the process layer through the [`Launcher`] and
//! [`ProcessHandle`] traits so tests can substitute in-memory fakes. The
//! default implementation, [`MongodLauncher`], spawns a real `mongod`,
//! waits for it to accept TCP connections, and tears it down with SIGTERM
//! before escalating to SIGKILL.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::config::LaunchConfig;
use crate::error::{Error, Result};

/// How long to wait for a freshly spawned process to accept connections.
const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval while waiting for readiness or termination.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait after SIGTERM before escalating to SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(10);

/// Launches server processes from a resolved [`LaunchConfig`].
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Start a server process and wait until it accepts connections.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LaunchFailed`] if the process cannot be spawned,
    /// exits before becoming ready, or never becomes ready in time.
    async fn launch(&self, config: &LaunchConfig) -> Result<Box<dyn ProcessHandle>>;
}

/// Handle to one live server process.
#[async_trait]
pub trait ProcessHandle: Send + Sync + std::fmt::Debug {
    /// Terminate the process and wait for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KillFailed`] if the process cannot be terminated.
    async fn kill(&mut self) -> Result<()>;

    /// Operating-system process id.
    fn pid(&self) -> u32;
}

/// Default [`Launcher`] spawning a real `mongod` binary.
#[derive(Debug, Clone)]
pub struct MongodLauncher {
    binary: PathBuf,
}

impl MongodLauncher {
    /// Launcher using an explicit binary path, or `mongod` from `$PATH`.
    pub fn new(binary: Option<PathBuf>) -> Self {
        Self {
            binary: binary.unwrap_or_else(|| PathBuf::from("mongod")),
        }
    }

    fn build_args(config: &LaunchConfig) -> Vec<String> {
        let mut args = vec![
            "--port".to_string(),
            config.port.to_string(),
            "--dbpath".to_string(),
            config.db_path.display().to_string(),
            "--bind_ip".to_string(),
            config.ip.clone(),
            "--storageEngine".to_string(),
            config.storage_engine.as_str().to_string(),
        ];
        if config.auth_enabled {
            args.push("--auth".to_string());
        } else {
            args.push("--noauth".to_string());
        }
        if let Some(rs) = &config.replica_set {
            args.push("--replSet".to_string());
            args.push(rs.clone());
        }
        args.extend(config.args.iter().cloned());
        args
    }
}

#[async_trait]
impl Launcher for MongodLauncher {
    async fn launch(&self, config: &LaunchConfig) -> Result<Box<dyn ProcessHandle>> {
        let args = Self::build_args(config);
        debug!(binary = %self.binary.display(), ?args, "spawning server process");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            // Safety net: an un-stopped instance must not outlive the test
            // process that spawned it.
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                Error::launch_failed(format!("spawn {}: {err}", self.binary.display()))
            })?;

        let pid = child
            .id()
            .ok_or_else(|| Error::launch_failed("process exited before reporting a pid"))?;

        wait_until_ready(&mut child, config).await?;
        debug!(pid, port = config.port, "server process ready");

        Ok(Box::new(MongodProcess { child, pid }))
    }
}

/// Poll until the process accepts TCP connections, failing fast if it exits.
async fn wait_until_ready(child: &mut Child, config: &LaunchConfig) -> Result<()> {
    let deadline = tokio::time::Instant::now() + READY_TIMEOUT;

    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|err| Error::launch_failed(format!("waiting on child: {err}")))?
        {
            return Err(Error::launch_failed(format!(
                "process exited during startup with {status}"
            )));
        }

        if TcpStream::connect((config.ip.as_str(), config.port)).await.is_ok() {
            return Ok(());
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(Error::launch_failed(format!(
                "process not ready on port {} within {}s",
                config.port,
                READY_TIMEOUT.as_secs()
            )));
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// A live `mongod` child process.
#[derive(Debug)]
struct MongodProcess {
    child: Child,
    pid: u32,
}

#[async_trait]
impl ProcessHandle for MongodProcess {
    async fn kill(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            // SIGTERM first so the storage engine can flush and drop its
            // lock files; SIGKILL only after the grace period.
            match kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
                Ok(()) => {
                    let graceful =
                        tokio::time::timeout(TERM_GRACE, self.child.wait()).await;
                    match graceful {
                        Ok(Ok(status)) => {
                            debug!(pid = self.pid, %status, "server process terminated");
                            return Ok(());
                        }
                        Ok(Err(err)) => {
                            return Err(Error::KillFailed {
                                pid: self.pid,
                                reason: err.to_string(),
                            });
                        }
                        Err(_elapsed) => {
                            warn!(pid = self.pid, "SIGTERM timed out, escalating to SIGKILL");
                        }
                    }
                }
                Err(nix::errno::Errno::ESRCH) => return Ok(()),
                Err(err) => {
                    warn!(pid = self.pid, %err, "SIGTERM failed, escalating to SIGKILL");
                }
            }
        }

        self.child.kill().await.map_err(|err| Error::KillFailed {
            pid: self.pid,
            reason: err.to_string(),
        })?;
        self.child.wait().await.map_err(|err| Error::KillFailed {
            pid: self.pid,
            reason: err.to_string(),
        })?;
        Ok(())
    }

    fn pid(&self) -> u32 {
        self.pid
    }
}
