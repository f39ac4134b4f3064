//! Ephemeral MongoDB server instances for integration tests.
//!
//! `mongolet` manages the full lifecycle of a single throwaway `mongod`
//! process: it allocates a free port, provisions an auto-cleaned data
//! directory, launches and supervises the subprocess, optionally bootstraps
//! authentication credentials, and hands back a connection URI.
//!
//! ## Quick start
//!
//! ```ignore
//! use mongolet::{MongoServer, ServerOpts};
//!
//! #[tokio::test]
//! async fn my_test() -> anyhow::Result<()> {
//!     let server = MongoServer::create(ServerOpts::default()).await?;
//!     let uri = server.uri(None)?;
//!     // connect your driver to `uri` ...
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Lifecycle
//!
//! The orchestrator is a restartable state machine
//! (`new → starting → running → stopped`); every transition is published on a
//! notification channel. Concurrent [`MongoServer::ensure_instance`] callers
//! converge on a single startup attempt by waiting on that channel, so a
//! shared fixture can be raced from many test tasks safely.
//!
//! ## Authentication
//!
//! With [`AuthOpts`] configured, a fresh instance is launched without auth,
//! the root and extra users are created over an unauthenticated connection,
//! and the process is relaunched with `--auth` on the same port and data
//! directory. With the ephemeral storage engine the relaunch would discard
//! the just-created users, so it is skipped and authentication is reported as
//! not enforced (see [`InstanceInfo::auth_enforced`]).
//!
//! ## Scope
//!
//! Binary download and version management are out of scope: `mongod` must be
//! on `$PATH` or supplied via [`InstanceOpts::binary`]. The wire protocol is
//! out of scope too; credential bootstrap plugs a driver in through the
//! narrow [`client::Connector`] trait.

pub mod auth;
mod bootstrap;
pub mod client;
pub mod config;
pub mod error;
pub mod port;
pub mod process;
pub mod server;
pub mod workspace;

pub use auth::{AuthMechanism, AuthOpts, RoleSpec, UserSpec};
pub use config::{InstanceOpts, LaunchConfig, ServerOpts, StorageEngine};
pub use error::{Error, Result};
pub use server::{InstanceInfo, MongoServer, State};
