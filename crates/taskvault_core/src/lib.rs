//! Core domain logic for TaskVault.
//! This crate owns the request-security boundary: owner resolution,
//! owner-scoped task CRUD, session-bound CSRF protection and notes
//! encryption.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod security;
pub mod service;

pub use config::{AppConfig, ConfigError, IdentityProviderConfig, Secret};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::task::{
    NewTask, Task, TaskId, TaskPatch, TaskStatus, TaskValidationError, TaskView,
};
pub use model::user::{NewUser, OwnerId, User, UserRole};
pub use repo::task_repo::{SqliteTaskRepository, TaskChanges, TaskRepository};
pub use repo::user_repo::{SqliteUserRepository, UserRepository};
pub use repo::{RepoError, RepoResult};
pub use security::cipher::{DecryptionError, EncryptionError, FieldCipher};
pub use security::csrf::{
    requires_csrf, CsrfError, CsrfGuard, CsrfToken, CSRF_COOKIE_NAME, CSRF_HEADER_NAME,
};
pub use security::identity::{
    AuthContext, AuthError, IdentityError, IdentityResolver, TokenVerifier, REQUIRED_REALM_ROLE,
};
pub use security::session::{SessionId, SessionState, SessionStore, DEFAULT_MAX_SESSIONS};
pub use service::task_store::{StoreError, StoreResult, TaskStore};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
