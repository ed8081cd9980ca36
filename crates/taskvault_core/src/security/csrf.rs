//! Session-bound double-submit CSRF protection.
//!
//! # Responsibility
//! - Issue a token per session, delivered both as a restricted cookie and
//!   as a response value the client echoes in a header.
//! - Validate that cookie and echoed values agree and were minted for the
//!   current session under the CSRF secret.
//!
//! # Invariants
//! - Token text is `<nonce_b64url>.<hex(HMAC-SHA256(secret, session_id || 0 || nonce))>`.
//! - The nonce is stored in the session, so a restart or session removal
//!   invalidates every outstanding token.
//! - All comparisons involving token material are constant-time.

use super::random_token;
use super::session::{SessionId, SessionStore};
use hmac::{Hmac, Mac};
use log::{info, warn};
use sha2::Sha256;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const NONCE_BYTES: usize = 32;

/// Cookie carrying the token half of the double submit.
pub const CSRF_COOKIE_NAME: &str = "csrf-token";
/// Request header carrying the echoed token.
pub const CSRF_HEADER_NAME: &str = "x-csrf-token";

/// Returns whether requests with `method` change state and need a token.
pub fn requires_csrf(method: &str) -> bool {
    matches!(
        method.to_ascii_uppercase().as_str(),
        "POST" | "PUT" | "PATCH" | "DELETE"
    )
}

/// Issued token value.
#[derive(Clone, PartialEq, Eq)]
pub struct CsrfToken(String);

impl CsrfToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Debug for CsrfToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("CsrfToken([redacted])")
    }
}

/// Why a CSRF check (or issuance) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfError {
    /// No session id, or it does not name a live session.
    MissingSession,
    /// Cookie or echoed value absent.
    MissingToken,
    /// Cookie and echoed value differ.
    TokenMismatch,
    /// Malformed, stale, or minted for another session/secret.
    InvalidToken,
}

impl CsrfError {
    pub fn reason(self) -> &'static str {
        match self {
            Self::MissingSession => "missing_session",
            Self::MissingToken => "missing_token",
            Self::TokenMismatch => "token_mismatch",
            Self::InvalidToken => "invalid_token",
        }
    }
}

impl Display for CsrfError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "csrf validation failed: {}", self.reason())
    }
}

impl Error for CsrfError {}

/// Double-submit token issuer and validator.
pub struct CsrfGuard {
    secret: Vec<u8>,
    sessions: Arc<SessionStore>,
}

impl Debug for CsrfGuard {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfGuard").finish_non_exhaustive()
    }
}

impl CsrfGuard {
    pub fn new(secret: &str, sessions: Arc<SessionStore>) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            sessions,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Returns the token for `session_id`, minting a nonce on first use.
    ///
    /// Concurrent callers on one session all receive the same token.
    pub fn issue(&self, session_id: &SessionId) -> Result<CsrfToken, CsrfError> {
        let (nonce, minted) = self
            .sessions
            .update_with(session_id, |state| match state.csrf_nonce.as_ref() {
                Some(nonce) => (nonce.clone(), false),
                None => {
                    let nonce = random_token(NONCE_BYTES);
                    state.csrf_nonce = Some(nonce.clone());
                    (nonce, true)
                }
            })
            .ok_or(CsrfError::MissingSession)?;
        if minted {
            info!("event=csrf_issue module=security status=ok");
        }

        let mac = self.sign(session_id, &nonce)?;
        Ok(CsrfToken(format!("{nonce}.{}", hex::encode(mac))))
    }

    /// Validates the double submit for a state-changing request.
    pub fn validate(
        &self,
        session_id: Option<&SessionId>,
        cookie_token: Option<&str>,
        echoed_token: Option<&str>,
    ) -> Result<(), CsrfError> {
        let result = self.check(session_id, cookie_token, echoed_token);
        if let Err(err) = result {
            warn!(
                "event=csrf_reject module=security status=error reason={}",
                err.reason()
            );
        }
        result
    }

    fn check(
        &self,
        session_id: Option<&SessionId>,
        cookie_token: Option<&str>,
        echoed_token: Option<&str>,
    ) -> Result<(), CsrfError> {
        let session_id = session_id.ok_or(CsrfError::MissingSession)?;
        let state = self
            .sessions
            .get(session_id)
            .ok_or(CsrfError::MissingSession)?;

        let cookie_token = non_empty(cookie_token).ok_or(CsrfError::MissingToken)?;
        let echoed_token = non_empty(echoed_token).ok_or(CsrfError::MissingToken)?;
        if !bool::from(cookie_token.as_bytes().ct_eq(echoed_token.as_bytes())) {
            return Err(CsrfError::TokenMismatch);
        }

        let (nonce, mac_hex) = cookie_token
            .split_once('.')
            .ok_or(CsrfError::InvalidToken)?;
        let provided_mac = hex::decode(mac_hex).map_err(|_| CsrfError::InvalidToken)?;

        let current_nonce = state.csrf_nonce.as_deref().ok_or(CsrfError::InvalidToken)?;
        if !bool::from(current_nonce.as_bytes().ct_eq(nonce.as_bytes())) {
            return Err(CsrfError::InvalidToken);
        }

        self.mac(session_id, nonce)?
            .verify_slice(&provided_mac)
            .map_err(|_| CsrfError::InvalidToken)
    }

    fn sign(&self, session_id: &SessionId, nonce: &str) -> Result<Vec<u8>, CsrfError> {
        Ok(self.mac(session_id, nonce)?.finalize().into_bytes().to_vec())
    }

    fn mac(&self, session_id: &SessionId, nonce: &str) -> Result<HmacSha256, CsrfError> {
        // HMAC accepts keys of any length; the error arm is unreachable in practice.
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| CsrfError::InvalidToken)?;
        mac.update(session_id.as_str().as_bytes());
        mac.update(&[0]);
        mac.update(nonce.as_bytes());
        Ok(mac)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
