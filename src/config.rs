//! Configuration types for the instance lifecycle.
//!
//! This module provides the caller-facing option structs and the resolved
//! per-attempt launch configuration:
//!
//! - [`ServerOpts`] - Root options struct passed to the orchestrator
//! - [`InstanceOpts`] - Server instance settings (port, paths, engine)
//! - [`StorageEngine`] - Persistent vs ephemeral storage selection
//! - [`LaunchConfig`] - Fully resolved configuration for one process launch
//!
//! All option types support serde deserialization and provide defaults
//! suitable for test use: OS-assigned port, auto-cleaned temp directory,
//! generated database name, loopback bind address.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::auth::AuthOpts;

/// Default bind address for test instances.
pub const DEFAULT_IP: &str = "127.0.0.1";

/// Administrative database name; the default target for created users.
pub const ADMIN_DB: &str = "admin";

/// Root options for an ephemeral server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerOpts {
    /// Instance settings (port, data directory, storage engine, ...).
    pub instance: InstanceOpts,
    /// Authentication bootstrap settings. `None` means no auth at all.
    pub auth: Option<AuthOpts>,
}

/// Settings for the underlying server instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstanceOpts {
    /// Preferred TCP port. If taken (or unset), a free port is used instead;
    /// read the actual port back from the running instance info.
    pub port: Option<u16>,
    /// Explicit data directory. When unset, an auto-cleaned temporary
    /// directory is provisioned per startup attempt.
    pub db_path: Option<PathBuf>,
    /// Default database name. Generated (UUID v4) when unset.
    pub db_name: Option<String>,
    /// Bind address for the server process.
    #[serde(default = "default_ip")]
    pub ip: String,
    /// Storage engine; controls whether the auth-enabling restart is possible.
    pub storage_engine: StorageEngine,
    /// Replica set name, passed through to the process verbatim. Setting this
    /// disables credential bootstrap (only defined for standalone instances).
    pub replica_set: Option<String>,
    /// Extra command-line arguments appended to the server invocation.
    pub args: Vec<String>,
    /// Explicit path to the server binary. Defaults to `mongod` on `$PATH`.
    pub binary: Option<PathBuf>,
}

impl Default for InstanceOpts {
    fn default() -> Self {
        Self {
            port: None,
            db_path: None,
            db_name: None,
            ip: default_ip(),
            storage_engine: StorageEngine::default(),
            replica_set: None,
            args: Vec::new(),
            binary: None,
        }
    }
}

fn default_ip() -> String {
    DEFAULT_IP.to_string()
}

/// Storage engine selection for the server process.
///
/// The ephemeral engine keeps all data in memory and discards it on process
/// exit, which makes it fast for tests but rules out the restart used to
/// enable authentication enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageEngine {
    /// Durable on-disk engine (the server default).
    #[default]
    #[serde(rename = "wiredTiger")]
    WiredTiger,
    /// In-memory engine; all data is lost when the process exits.
    #[serde(rename = "ephemeralForTest")]
    EphemeralForTest,
}

impl StorageEngine {
    /// Whether data written by this engine survives a process restart.
    pub fn is_persistent(self) -> bool {
        matches!(self, Self::WiredTiger)
    }

    /// The engine name as passed on the server command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WiredTiger => "wiredTiger",
            Self::EphemeralForTest => "ephemeralForTest",
        }
    }
}

/// Fully resolved configuration for one server process launch.
///
/// Built once per startup attempt from [`InstanceOpts`] plus the acquired
/// port and resolved data directory. Immutable after creation; the one
/// derived variant is the auth-enabled relaunch produced by [`Self::with_auth`].
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Actual TCP port the process will listen on.
    pub port: u16,
    /// Resolved data directory (always set, unlike `InstanceOpts::db_path`).
    pub db_path: PathBuf,
    /// Default database name for connection URIs.
    pub db_name: String,
    /// Bind address.
    pub ip: String,
    /// Storage engine.
    pub storage_engine: StorageEngine,
    /// Replica set name, if any.
    pub replica_set: Option<String>,
    /// Whether the process enforces authentication (`--auth` vs `--noauth`).
    pub auth_enabled: bool,
    /// Extra command-line arguments.
    pub args: Vec<String>,
}

impl LaunchConfig {
    /// Derive the relaunch variant with a different auth setting; everything
    /// else (port, data directory) is reused verbatim.
    pub fn with_auth(&self, auth_enabled: bool) -> Self {
        Self {
            auth_enabled,
            ..self.clone()
        }
    }

    /// Connection URI for this configuration, optionally overriding the
    /// database name.
    pub fn uri(&self, db_override: Option<&str>) -> String {
        let db = db_override.unwrap_or(&self.db_name);
        format!("mongodb://{}:{}/{}", self.ip, self.port, db)
    }
}
