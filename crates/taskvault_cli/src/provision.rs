//! Out-of-band user provisioning.
//!
//! # Responsibility
//! - Insert internal user records linked to identity-provider accounts.
//! - Surface duplicate identities as `RepoError::Conflict` instead of
//!   overwriting the existing record.
//!
//! # Invariants
//! - Provisioning never updates or deletes an existing user.

use log::{info, warn};
use taskvault_core::{NewUser, RepoError, RepoResult, User, UserRepository, UserRole};

/// Accounts created by `seed-demo-users` for local development.
pub const DEMO_USERS: &[(&str, &str, UserRole)] = &[
    ("keycloak-user-1", "user1@example.com", UserRole::User),
    ("keycloak-admin-1", "admin1@example.com", UserRole::Admin),
];

/// Outcome of seeding the demo accounts.
#[derive(Debug, Default)]
pub struct SeedReport {
    pub created: Vec<User>,
    /// External identities that were already provisioned.
    pub skipped: Vec<String>,
}

/// Inserts one user. A duplicate external identity is returned as
/// `RepoError::Conflict`.
pub fn provision_user<U: UserRepository>(users: &U, new_user: &NewUser) -> RepoResult<User> {
    match users.insert_user(new_user) {
        Ok(user) => {
            info!(
                "event=user_provision module=cli status=ok owner_id={} role={}",
                user.id,
                user.role.as_str()
            );
            Ok(user)
        }
        Err(err) => {
            warn!(
                "event=user_provision module=cli status=error external_identity={} error={err}",
                new_user.external_identity
            );
            Err(err)
        }
    }
}

/// Provisions `DEMO_USERS`, skipping accounts that already exist.
pub fn seed_demo_users<U: UserRepository>(users: &U) -> RepoResult<SeedReport> {
    let mut report = SeedReport::default();
    for (external_identity, email, role) in DEMO_USERS {
        let new_user = NewUser::new(*external_identity, *email, *role);
        match provision_user(users, &new_user) {
            Ok(user) => report.created.push(user),
            Err(RepoError::Conflict(_)) => report.skipped.push(new_user.external_identity),
            Err(err) => return Err(err),
        }
    }
    Ok(report)
}

pub fn parse_role(value: &str) -> Result<UserRole, String> {
    UserRole::parse(value).ok_or_else(|| format!("unknown role `{value}`, expected user or admin"))
}
