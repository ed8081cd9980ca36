//! User (owner) domain model.
//!
//! Users are provisioned out-of-band; the request path only reads them.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Internal owner identity resolved from an external token identity.
///
/// Not constructible from a raw integer outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(i64);

impl OwnerId {
    pub(crate) fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw database key.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role tag carried on the internal user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Internal user record linked to an identity-provider account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: OwnerId,
    /// Subject or username claim issued by the identity provider. Unique.
    pub external_identity: String,
    pub email: String,
    pub role: UserRole,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
}

/// Input for out-of-band provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub external_identity: String,
    pub email: String,
    pub role: UserRole,
}

impl NewUser {
    pub fn new(
        external_identity: impl Into<String>,
        email: impl Into<String>,
        role: UserRole,
    ) -> Self {
        Self {
            external_identity: external_identity.into(),
            email: email.into(),
            role,
        }
    }
}
