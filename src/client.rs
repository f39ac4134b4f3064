//! Driver seam for the credential bootstrap.
//!
//! The orchestrator never speaks the database wire protocol itself; it issues
//! commands through the [`Connector`] and [`Connection`] traits. Command
//! documents cross this boundary as `serde_json::Value`, built from fixed
//! structs in [`crate::bootstrap`] and converted to the driver's native
//! document type on the far side of the trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Opens connections to a running instance.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to the instance at `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ConnectFailed`] if no connection can be
    /// established.
    async fn connect(&self, uri: &str) -> Result<Box<dyn Connection>>;
}

/// One open connection to an instance.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run a command against `database` and return the server's reply.
    ///
    /// Administrative commands run against the `admin` database; user
    /// creation runs against the user's target database.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::CommandFailed`] if the server rejects the
    /// command.
    async fn run_command(&self, database: &str, command: Value) -> Result<Value>;

    /// Close the connection. Best-effort; never fails.
    async fn close(&mut self);
}
