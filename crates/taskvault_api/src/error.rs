//! Boundary error taxonomy and its HTTP mapping.
//!
//! # Invariants
//! - CSRF and authentication failures are client errors distinct from 404.
//! - Missing and foreign tasks share one 404 body.
//! - Decryption failures are reported as such, never as empty notes.
//! - Internal detail is logged, not returned.

use http::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::{Display, Formatter};
use taskvault_core::{AuthError, CsrfError, StoreError};

/// Field-level validation detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Every way a request can be rejected.
#[derive(Debug)]
pub enum ApiError {
    Validation(Vec<FieldError>),
    Unauthenticated(AuthError),
    MissingRole(&'static str),
    OwnerNotFound,
    Csrf(CsrfError),
    SessionUnavailable,
    TaskNotFound,
    RouteNotFound,
    MethodNotAllowed,
    Decryption,
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::MissingRole(_) | Self::OwnerNotFound | Self::Csrf(_) => StatusCode::FORBIDDEN,
            Self::TaskNotFound | Self::RouteNotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::SessionUnavailable | Self::Decryption | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::MissingRole(_) => "missing_role",
            Self::OwnerNotFound => "owner_not_found",
            Self::Csrf(_) => "csrf_rejected",
            Self::SessionUnavailable => "session_unavailable",
            Self::TaskNotFound => "task_not_found",
            Self::RouteNotFound => "route_not_found",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::Decryption => "decryption_failed",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn body(&self) -> Value {
        match self {
            Self::Validation(errors) => json!({ "errors": errors }),
            Self::Unauthenticated(_) => json!({ "error": "Access denied" }),
            Self::MissingRole(role) => json!({ "error": format!("Missing realm role `{role}`") }),
            Self::OwnerNotFound => json!({ "error": "No account is linked to this identity" }),
            Self::Csrf(_) => json!({ "error": "invalid csrf token" }),
            Self::SessionUnavailable => json!({ "error": "Session not initialized" }),
            Self::TaskNotFound => json!({ "message": "Task not found" }),
            Self::RouteNotFound => json!({ "error": "Not found" }),
            Self::MethodNotAllowed => json!({ "error": "Method not allowed" }),
            Self::Decryption => json!({ "error": "notes could not be decrypted" }),
            Self::Internal(_) => json!({ "error": "Internal server error" }),
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(errors) => write!(f, "{} invalid field(s)", errors.len()),
            Self::Unauthenticated(err) => write!(f, "{err}"),
            Self::MissingRole(role) => write!(f, "missing realm role {role}"),
            Self::Csrf(err) => write!(f, "{err}"),
            Self::Internal(message) => write!(f, "{message}"),
            other => f.write_str(other.code()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::OwnerNotFound(_) => Self::OwnerNotFound,
            StoreError::Validation(err) => {
                Self::Validation(vec![FieldError::new(err.field(), err.to_string())])
            }
            StoreError::Decryption { .. } => Self::Decryption,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<CsrfError> for ApiError {
    fn from(value: CsrfError) -> Self {
        Self::Csrf(value)
    }
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        Self::Unauthenticated(value)
    }
}

#[cfg(test)]
mod tests {
    use super::ApiError;
    use http::StatusCode;
    use taskvault_core::{CsrfError, DecryptionError, StoreError, TaskValidationError};

    #[test]
    fn store_errors_map_to_distinct_statuses() {
        let owner: ApiError = StoreError::OwnerNotFound("ghost".to_string()).into();
        assert_eq!(owner.status(), StatusCode::FORBIDDEN);

        let validation: ApiError = StoreError::Validation(TaskValidationError::EmptyTitle).into();
        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(validation.body()["errors"][0]["field"], "title");

        let decryption: ApiError = StoreError::Decryption {
            task_id: 3,
            source: DecryptionError::AuthenticationFailed,
        }
        .into();
        assert_eq!(decryption.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(decryption.code(), "decryption_failed");
    }

    #[test]
    fn csrf_rejection_is_not_a_not_found() {
        let csrf: ApiError = CsrfError::TokenMismatch.into();
        assert_eq!(csrf.status(), StatusCode::FORBIDDEN);
        assert_ne!(csrf.status(), ApiError::TaskNotFound.status());
    }
}
