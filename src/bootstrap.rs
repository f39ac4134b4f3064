//! Credential bootstrap against a fresh, unauthenticated instance.
//!
//! Creates exactly one root user, then every configured extra user in stable
//! admin-database-first order. Any failure aborts the remaining creations and
//! surfaces as a bootstrap failure; a partially created user set is a known,
//! surfaced condition. The connection is closed on every exit path.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::auth::{sorted_for_creation, AuthMechanism, AuthOpts, RoleSpec, UserSpec};
use crate::client::{Connection, Connector};
use crate::config::ADMIN_DB;
use crate::error::Result;

/// Wire shape of the `createUser` command. Built from a [`UserSpec`] (or the
/// root-user fields of [`AuthOpts`]) and serialized to a document only at the
/// driver boundary.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserCommand<'a> {
    create_user: &'a str,
    pwd: &'a str,
    roles: Vec<RoleSpec>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    authentication_restrictions: &'a [Value],
    mechanisms: Vec<AuthMechanism>,
    digest_password: bool,
}

impl<'a> CreateUserCommand<'a> {
    fn root(opts: &'a AuthOpts) -> Self {
        Self {
            create_user: &opts.root_username,
            pwd: &opts.root_password,
            roles: vec![RoleSpec::new("root", ADMIN_DB)],
            authentication_restrictions: &[],
            mechanisms: vec![AuthMechanism::ScramSha256],
            digest_password: true,
        }
    }

    fn extra(user: &'a UserSpec) -> Self {
        Self {
            create_user: &user.username,
            pwd: &user.password,
            roles: user.roles.clone(),
            authentication_restrictions: &user.auth_restrictions,
            mechanisms: user
                .mechanisms
                .clone()
                .unwrap_or_else(|| vec![AuthMechanism::ScramSha256]),
            digest_password: user.digest_password.unwrap_or(true),
        }
    }

    fn into_document(self) -> Value {
        // Serialization of these fixed fields cannot fail.
        serde_json::to_value(&self).unwrap_or(Value::Null)
    }
}

/// Create the root user and all configured extra users on the instance
/// listening at `ip:port`.
///
/// # Errors
///
/// Propagates connection and command failures; the first failure aborts the
/// remaining user creations.
pub(crate) async fn run(
    connector: &dyn Connector,
    ip: &str,
    port: u16,
    opts: &AuthOpts,
) -> Result<()> {
    let uri = format!("mongodb://{ip}:{port}/");
    let mut conn = connector.connect(&uri).await?;

    let outcome = create_users(conn.as_ref(), opts).await;
    conn.close().await;
    outcome
}

async fn create_users(conn: &dyn Connection, opts: &AuthOpts) -> Result<()> {
    debug!(user = %opts.root_username, "creating root user");
    conn.run_command(ADMIN_DB, CreateUserCommand::root(opts).into_document())
        .await?;

    for user in sorted_for_creation(&opts.extra_users) {
        debug!(user = %user.username, db = %user.database(), "creating extra user");
        conn.run_command(user.database(), CreateUserCommand::extra(&user).into_document())
            .await?;
    }

    info!(
        users = opts.extra_users.len() + 1,
        "credential bootstrap complete"
    );
    Ok(())
}
