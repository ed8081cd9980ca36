//! Authentication context and owner resolution.
//!
//! # Responsibility
//! - Carry verified token claims explicitly through each request
//!   (`AuthContext`), produced once by a `TokenVerifier`.
//! - Resolve the external identity in those claims to an internal
//!   `OwnerId` (`IdentityResolver`).
//!
//! # Invariants
//! - Token signature checks happen in the `TokenVerifier`; nothing here
//!   inspects raw tokens.
//! - Unknown identities are never provisioned on the fly.

use crate::model::user::OwnerId;
use crate::repo::user_repo::UserRepository;
use crate::repo::RepoError;
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Realm role every task route requires.
pub const REQUIRED_REALM_ROLE: &str = "user";

/// Claims of a bearer token that the identity provider already verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    subject: String,
    preferred_username: Option<String>,
    realm_roles: Vec<String>,
}

impl AuthContext {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            preferred_username: None,
            realm_roles: Vec::new(),
        }
    }

    pub fn with_preferred_username(mut self, username: impl Into<String>) -> Self {
        self.preferred_username = Some(username.into());
        self
    }

    pub fn with_realm_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.realm_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Identity used for owner lookup: the preferred username when the
    /// provider sent a non-empty one, otherwise the subject.
    pub fn external_identity(&self) -> &str {
        self.preferred_username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.subject.as_str())
    }

    pub fn has_realm_role(&self, role: &str) -> bool {
        self.realm_roles.iter().any(|held| held == role)
    }
}

/// Bearer-token verification failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidToken(String),
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingToken => write!(f, "bearer token is missing"),
            Self::InvalidToken(reason) => write!(f, "bearer token rejected: {reason}"),
        }
    }
}

impl Error for AuthError {}

/// Verifies a raw bearer token against the identity provider.
///
/// Implementations own signature, expiry and audience checks.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, bearer_token: &str) -> Result<AuthContext, AuthError>;
}

/// Owner resolution failures.
#[derive(Debug)]
pub enum IdentityError {
    /// No internal user matches the authenticated identity.
    OwnerNotFound(String),
    Repo(RepoError),
}

impl Display for IdentityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OwnerNotFound(identity) => {
                write!(f, "no internal user for external identity `{identity}`")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for IdentityError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::OwnerNotFound(_) => None,
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for IdentityError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Read-only mapping from external identity to internal owner.
pub struct IdentityResolver<U: UserRepository> {
    users: U,
}

impl<U: UserRepository> IdentityResolver<U> {
    pub fn new(users: U) -> Self {
        Self { users }
    }

    pub fn resolve(&self, external_identity: &str) -> Result<OwnerId, IdentityError> {
        match self.users.find_by_external_identity(external_identity)? {
            Some(user) => Ok(user.id),
            None => {
                warn!(
                    "event=owner_resolve module=security status=error error_code=owner_not_found"
                );
                Err(IdentityError::OwnerNotFound(external_identity.to_string()))
            }
        }
    }

    pub fn resolve_context(&self, auth: &AuthContext) -> Result<OwnerId, IdentityError> {
        self.resolve(auth.external_identity())
    }
}
