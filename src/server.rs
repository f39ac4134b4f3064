//! The instance lifecycle orchestrator.
//!
//! [`MongoServer`] owns one ephemeral database server subprocess and walks it
//! through `new → starting → running → stopped`. The startup protocol runs
//! strictly in sequence within one attempt: acquire a port, resolve the data
//! directory, launch without auth, bootstrap credentials if configured, then
//! (for persistent storage engines) relaunch with auth enforced on the same
//! port and data directory.
//!
//! Concurrent callers converge on a single startup attempt: the `Starting`
//! state is the only guard, and waiters subscribe to the state notification
//! channel instead of taking locks across suspension points.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::bootstrap;
use crate::client::Connector;
use crate::config::{LaunchConfig, ServerOpts};
use crate::error::{Error, Result};
use crate::port;
use crate::process::{Launcher, MongodLauncher, ProcessHandle};
use crate::workspace;

/// Lifecycle state of the orchestrator.
///
/// There is no terminal state; a stopped orchestrator can be started again,
/// generating a fresh port and data directory unless explicit ones were
/// configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Constructed, never started.
    New,
    /// A startup attempt is in flight.
    Starting,
    /// An instance is running; [`MongoServer::instance_info`] is `Some`.
    Running,
    /// Stopped after running; restartable.
    Stopped,
}

/// Caller-visible snapshot of a running instance.
///
/// The process and temp-directory handles stay inside the orchestrator; this
/// snapshot carries everything a test needs to connect.
#[derive(Debug, Clone)]
pub struct InstanceInfo {
    /// Actual TCP port (may differ from the preferred one).
    pub port: u16,
    /// Default database name.
    pub db_name: String,
    /// Bind address.
    pub ip: String,
    /// Resolved data directory.
    pub db_path: PathBuf,
    /// Process id of the server subprocess.
    pub pid: u32,
    /// Whether the running process actually enforces authentication.
    ///
    /// False after a bootstrap on an ephemeral storage engine: the users
    /// exist, but the process still accepts unauthenticated commands.
    pub auth_enforced: bool,
    /// Replica set name passed through, if any.
    pub replica_set: Option<String>,
}

/// Everything owned for one live instance. Exists iff state == Running.
struct RunningInstance {
    config: LaunchConfig,
    handle: Box<dyn ProcessHandle>,
    workspace: Option<TempDir>,
    auth_enforced: bool,
}

impl RunningInstance {
    fn info(&self) -> InstanceInfo {
        InstanceInfo {
            port: self.config.port,
            db_name: self.config.db_name.clone(),
            ip: self.config.ip.clone(),
            db_path: self.config.db_path.clone(),
            pid: self.handle.pid(),
            auth_enforced: self.auth_enforced,
            replica_set: self.config.replica_set.clone(),
        }
    }
}

struct Inner {
    state: State,
    instance: Option<RunningInstance>,
}

/// Orchestrator for one ephemeral database server instance.
///
/// # Example
///
/// ```ignore
/// use mongolet::{MongoServer, ServerOpts};
///
/// let server = MongoServer::create(ServerOpts::default()).await?;
/// let uri = server.uri(None)?;
/// // ... run tests against `uri` ...
/// server.stop().await?;
/// ```
pub struct MongoServer {
    opts: ServerOpts,
    launcher: Arc<dyn Launcher>,
    connector: Option<Arc<dyn Connector>>,
    inner: Mutex<Inner>,
    notify: broadcast::Sender<State>,
}

impl MongoServer {
    /// Orchestrator with the default `mongod` launcher and no driver
    /// connector (credential bootstrap requires one; see
    /// [`Self::with_collaborators`]).
    pub fn new(opts: ServerOpts) -> Self {
        let launcher = Arc::new(MongodLauncher::new(opts.instance.binary.clone()));
        Self::with_collaborators(opts, launcher, None)
    }

    /// Orchestrator with explicit collaborators.
    ///
    /// The seam for tests (fake launchers and connectors) and for wiring in a
    /// real driver when credential bootstrap is configured.
    pub fn with_collaborators(
        opts: ServerOpts,
        launcher: Arc<dyn Launcher>,
        connector: Option<Arc<dyn Connector>>,
    ) -> Self {
        let (notify, _) = broadcast::channel(16);
        Self {
            opts,
            launcher,
            connector,
            inner: Mutex::new(Inner {
                state: State::New,
                instance: None,
            }),
            notify,
        }
    }

    /// Construct and start in one call.
    ///
    /// # Errors
    ///
    /// Propagates any startup failure; the returned orchestrator is dropped
    /// in that case.
    pub async fn create(opts: ServerOpts) -> Result<Self> {
        let server = Self::new(opts);
        server.start().await?;
        Ok(server)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.inner.lock().state
    }

    /// Snapshot of the running instance, or `None` when not running.
    pub fn instance_info(&self) -> Option<InstanceInfo> {
        self.inner.lock().instance.as_ref().map(RunningInstance::info)
    }

    /// Subscribe to state-change notifications. Each transition is delivered
    /// exactly once per subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<State> {
        self.notify.subscribe()
    }

    /// Connection URI of the running instance, optionally overriding the
    /// database name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRunning`] when no instance is active.
    pub fn uri(&self, db_override: Option<&str>) -> Result<String> {
        let inner = self.inner.lock();
        inner
            .instance
            .as_ref()
            .map(|instance| instance.config.uri(db_override))
            .ok_or(Error::NotRunning)
    }

    /// Start the instance.
    ///
    /// Runs the full startup protocol: port acquisition, data directory
    /// resolution, process launch, optional credential bootstrap and
    /// auth-enabling relaunch. On failure the orchestrator returns to the
    /// state it was in before the attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if an instance is running or a
    /// startup is already in flight; otherwise the first failing step's
    /// error.
    pub async fn start(&self) -> Result<()> {
        let prior = {
            let mut inner = self.inner.lock();
            // Running is rejected even when the instance record is absent:
            // a stop() may have extracted the record and be suspended on the
            // kill, and a second launch in that window would let its late
            // Stopped transition stomp a fresh instance.
            if inner.instance.is_some()
                || matches!(inner.state, State::Starting | State::Running)
            {
                return Err(Error::AlreadyRunning);
            }
            let prior = inner.state;
            self.transition(&mut inner, State::Starting);
            prior
        };

        match self.run_startup().await {
            Ok(instance) => {
                info!(
                    port = instance.config.port,
                    pid = instance.handle.pid(),
                    auth_enforced = instance.auth_enforced,
                    "instance running"
                );
                let mut inner = self.inner.lock();
                inner.instance = Some(instance);
                self.transition(&mut inner, State::Running);
                Ok(())
            }
            Err(err) => {
                warn!(%err, "startup attempt failed");
                let mut inner = self.inner.lock();
                self.transition(&mut inner, prior);
                Err(err)
            }
        }
    }

    /// Return the running instance, starting one first if needed.
    ///
    /// Concurrent callers converge on a single startup attempt: while a
    /// startup is in flight, additional callers wait for its terminal state
    /// notification instead of launching a second instance.
    ///
    /// # Errors
    ///
    /// Returns the startup error when starting fails,
    /// [`Error::StartupFailed`] when an awaited attempt ends in a
    /// non-running state, and [`Error::Inconsistent`] on internal invariant
    /// violations.
    pub async fn ensure_instance(&self) -> Result<InstanceInfo> {
        let waiter = {
            let inner = self.inner.lock();
            if let Some(instance) = &inner.instance {
                return Ok(instance.info());
            }
            match inner.state {
                State::Running => {
                    return Err(Error::inconsistent(
                        "state is running but no instance data is present",
                    ));
                }
                State::New | State::Stopped => None,
                // Subscribe while holding the lock so the terminal
                // notification of the in-flight attempt cannot be missed.
                State::Starting => Some(self.notify.subscribe()),
            }
        };

        let Some(mut rx) = waiter else {
            self.start().await?;
            return self.running_info();
        };

        debug!("startup in flight, waiting for its terminal state");
        match rx.recv().await {
            Ok(State::Running) => self.running_info(),
            Ok(state) => Err(Error::StartupFailed { state }),
            Err(_) => Err(Error::inconsistent("state notification channel closed")),
        }
    }

    /// Stop the running instance.
    ///
    /// Idempotent: returns success without side effects when nothing is
    /// running. Otherwise the process is killed (and confirmed terminated)
    /// before the temporary data directory is removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KillFailed`] if the process cannot be terminated; the
    /// instance record is kept so stop can be retried.
    pub async fn stop(&self) -> Result<()> {
        let mut instance = {
            let mut inner = self.inner.lock();
            match inner.instance.take() {
                None => {
                    debug!("stop called with no running instance");
                    return Ok(());
                }
                Some(instance) => instance,
            }
        };

        // The process must be confirmed dead before its data directory is
        // removed underneath it.
        if let Err(err) = instance.handle.kill().await {
            self.inner.lock().instance = Some(instance);
            return Err(err);
        }

        if let Some(dir) = instance.workspace.take() {
            let path = dir.path().to_path_buf();
            if let Err(err) = dir.close() {
                warn!(path = %path.display(), %err, "failed to remove temporary data directory");
            } else {
                debug!(path = %path.display(), "temporary data directory removed");
            }
        }

        let mut inner = self.inner.lock();
        self.transition(&mut inner, State::Stopped);
        Ok(())
    }

    fn running_info(&self) -> Result<InstanceInfo> {
        self.inner
            .lock()
            .instance
            .as_ref()
            .map(RunningInstance::info)
            .ok_or_else(|| {
                Error::inconsistent("startup reported success but no instance data is present")
            })
    }

    fn transition(&self, inner: &mut Inner, next: State) {
        debug!(from = ?inner.state, to = ?next, "state transition");
        inner.state = next;
        // A send error only means nobody is listening right now.
        let _ = self.notify.send(next);
    }

    /// The startup protocol. Runs outside the state lock; the `Starting`
    /// state guarantees at most one execution at a time.
    async fn run_startup(&self) -> Result<RunningInstance> {
        let instance_opts = &self.opts.instance;

        // 1. Port, honoring a preferred one when free.
        let port = port::acquire(instance_opts.port).await?;
        if let Some(preferred) = instance_opts.port {
            if preferred != port {
                info!(preferred, actual = port, "preferred port in use, substituted a free one");
            }
        }

        // 2. Data directory; decide fresh vs existing.
        let (db_path, workspace_dir, fresh) = match &instance_opts.db_path {
            Some(path) => (path.clone(), None, workspace::is_fresh(path)?),
            None => {
                let dir = workspace::provision()?;
                (dir.path().to_path_buf(), Some(dir), true)
            }
        };

        // 3. Bootstrap decision: auth configured and enabled, a fresh data
        // directory (or forced), and standalone only.
        let auth = self.opts.auth.as_ref().filter(|a| !a.disabled);
        let bootstrap_needed = match auth {
            Some(opts) if instance_opts.replica_set.is_none() => fresh || opts.force_bootstrap,
            _ => false,
        };
        if let Some(opts) = auth {
            if !bootstrap_needed {
                debug!(
                    fresh,
                    force = opts.force_bootstrap,
                    replica_set = ?instance_opts.replica_set,
                    "credential bootstrap skipped"
                );
            }
        }

        // 4. Launch config. Auth stays off at the process level while the
        // bootstrap needs its unauthenticated connection window.
        let config = LaunchConfig {
            port,
            db_path,
            db_name: instance_opts
                .db_name
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            ip: instance_opts.ip.clone(),
            storage_engine: instance_opts.storage_engine,
            replica_set: instance_opts.replica_set.clone(),
            auth_enabled: !bootstrap_needed && auth.is_some(),
            args: instance_opts.args.clone(),
        };

        // 5. Launch. No retry: port and path failures are not self-healing.
        let mut handle = self.launcher.launch(&config).await?;

        // 6. Bootstrap, then the auth-enabling relaunch for persistent
        // engines.
        let mut final_config = config;
        let mut auth_enforced = final_config.auth_enabled;
        if bootstrap_needed {
            let auth_opts = auth.ok_or_else(|| {
                Error::inconsistent("bootstrap required without auth configuration")
            })?;
            let connector = self.connector.as_ref().ok_or(Error::NoConnector)?;
            bootstrap::run(
                connector.as_ref(),
                &final_config.ip,
                final_config.port,
                auth_opts,
            )
            .await?;

            if final_config.storage_engine.is_persistent() {
                debug!("relaunching with authentication enforced");
                handle.kill().await?;
                let relaunch = final_config.with_auth(true);
                handle = self.launcher.launch(&relaunch).await?;
                final_config = relaunch;
                auth_enforced = true;
            } else {
                // Restarting an ephemeral-storage instance would discard the
                // users just created, and auth cannot be toggled on a running
                // process, so the instance keeps accepting unauthenticated
                // commands.
                warn!(
                    "ephemeral storage engine: users were created but authentication \
                     is not enforced"
                );
            }
        }

        Ok(RunningInstance {
            config: final_config,
            handle,
            workspace: workspace_dir,
            auth_enforced,
        })
    }
}
