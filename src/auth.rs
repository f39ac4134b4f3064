//! Authentication bootstrap options.
//!
//! These types describe the users created against a fresh instance before
//! authentication is enforced. They are resolved once at orchestrator
//! construction and read-only afterwards; the bootstrap itself runs inside
//! the orchestrator's startup protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ADMIN_DB;

/// Default root username for bootstrapped instances.
pub const DEFAULT_ROOT_USERNAME: &str = "mongolet-root";

/// Default root password for bootstrapped instances.
pub const DEFAULT_ROOT_PASSWORD: &str = "rootuser";

/// Authentication bootstrap settings.
///
/// Supplying an `AuthOpts` (with `disabled: false`) asks the orchestrator to
/// create a root user plus any `extra_users` on a fresh instance, then restart
/// the process with authentication enforced. See the crate docs for the
/// ephemeral-storage caveat.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthOpts {
    /// Disable the bootstrap entirely while keeping the struct around.
    pub disabled: bool,
    /// Username of the unrestricted root user created first.
    pub root_username: String,
    /// Password of the root user.
    pub root_password: String,
    /// Run the bootstrap even against a non-empty (existing) data directory.
    /// Off by default: re-creating users that already exist fails.
    pub force_bootstrap: bool,
    /// Additional users created after the root user, in stable
    /// admin-database-first order.
    pub extra_users: Vec<UserSpec>,
}

impl Default for AuthOpts {
    fn default() -> Self {
        Self {
            disabled: false,
            root_username: DEFAULT_ROOT_USERNAME.to_string(),
            root_password: DEFAULT_ROOT_PASSWORD.to_string(),
            force_bootstrap: false,
            extra_users: Vec::new(),
        }
    }
}

/// One additional user to create during bootstrap.
#[derive(Debug, Clone, Deserialize)]
pub struct UserSpec {
    /// Login name.
    pub username: String,
    /// Password, digested by the server by default.
    pub password: String,
    /// Database the user is created in. Defaults to `admin` when unset.
    #[serde(default)]
    pub database: Option<String>,
    /// Roles granted to the user.
    #[serde(default)]
    pub roles: Vec<RoleSpec>,
    /// Raw `authenticationRestrictions` documents, passed through verbatim.
    #[serde(default)]
    pub auth_restrictions: Vec<Value>,
    /// SCRAM mechanisms the user may authenticate with.
    /// Defaults to SCRAM-SHA-256 only.
    #[serde(default)]
    pub mechanisms: Option<Vec<AuthMechanism>>,
    /// Whether the server digests the password. Defaults to true.
    #[serde(default)]
    pub digest_password: Option<bool>,
}

impl UserSpec {
    /// The database this user is created in, applying the `admin` default.
    pub fn database(&self) -> &str {
        self.database.as_deref().unwrap_or(ADMIN_DB)
    }
}

/// A role grant: role name plus the database it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    /// Role name (e.g. `readWrite`, `dbAdmin`, `root`).
    pub role: String,
    /// Database the role applies to.
    pub db: String,
}

impl RoleSpec {
    /// Convenience constructor.
    pub fn new(role: impl Into<String>, db: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            db: db.into(),
        }
    }
}

/// SCRAM authentication mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMechanism {
    /// SCRAM with SHA-1. Weaker; not part of any default.
    #[serde(rename = "SCRAM-SHA-1")]
    ScramSha1,
    /// SCRAM with SHA-256. The only mechanism granted by default.
    #[serde(rename = "SCRAM-SHA-256")]
    ScramSha256,
}

/// Stable ordering of extra users: all users targeting the admin database
/// first, then everyone else, ties broken by original position.
///
/// Role grants for non-admin databases are only meaningful once the admin
/// database has at least one user, and grouping by database keeps connection
/// reuse cheap during bootstrap.
pub(crate) fn sorted_for_creation(users: &[UserSpec]) -> Vec<UserSpec> {
    let mut sorted = users.to_vec();
    sorted.sort_by_key(|user| user.database() != ADMIN_DB);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str, database: Option<&str>) -> UserSpec {
        UserSpec {
            username: name.to_string(),
            password: "pw".to_string(),
            database: database.map(str::to_string),
            roles: vec![],
            auth_restrictions: vec![],
            mechanisms: None,
            digest_password: None,
        }
    }

    #[test]
    fn test_defaults() {
        let opts = AuthOpts::default();
        assert!(!opts.disabled);
        assert_eq!(opts.root_username, DEFAULT_ROOT_USERNAME);
        assert_eq!(opts.root_password, DEFAULT_ROOT_PASSWORD);
        assert!(!opts.force_bootstrap);
        assert!(opts.extra_users.is_empty());
    }

    #[test]
    fn test_user_database_defaults_to_admin() {
        assert_eq!(user("a", None).database(), "admin");
        assert_eq!(user("b", Some("app")).database(), "app");
    }

    #[test]
    fn test_sort_admin_first_preserves_relative_order() {
        let users = vec![
            user("u1", Some("app")),
            user("u2", None),
            user("u3", Some("other")),
            user("u4", Some("admin")),
            user("u5", Some("app")),
        ];
        let sorted = sorted_for_creation(&users);
        let names: Vec<&str> = sorted.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["u2", "u4", "u1", "u3", "u5"]);
    }

    #[test]
    fn test_mechanism_wire_names() {
        let json = serde_json::to_string(&AuthMechanism::ScramSha256).unwrap();
        assert_eq!(json, "\"SCRAM-SHA-256\"");
        let json = serde_json::to_string(&AuthMechanism::ScramSha1).unwrap();
        assert_eq!(json, "\"SCRAM-SHA-1\"");
    }
}
