//! HTTP boundary for TaskVault.
//!
//! # Responsibility
//! - Translate `http::Request` values into owner-scoped task operations.
//! - Map every failure to a stable status code and JSON body.
//!
//! # Invariants
//! - Handlers never panic on client input.
//! - No transport server lives here; callers own sockets and TLS.
//!
//! # See also
//! - `taskvault_core::security` for session, CSRF and cipher primitives.

mod cookie;
mod error;
mod router;
mod validate;

pub use cookie::{read_cookie, restricted_cookie, SESSION_COOKIE_NAME};
pub use error::{ApiError, FieldError};
pub use router::TaskApi;
pub use validate::{parse_bearer, parse_new_task, parse_task_id, parse_task_patch};
