//! Request-security boundary components.
//!
//! # Responsibility
//! - Encrypt the sensitive notes field before persistence (`cipher`).
//! - Keep volatile per-client session state (`session`).
//! - Issue and verify session-bound double-submit CSRF tokens (`csrf`).
//! - Map verified token claims to internal owners (`identity`).
//!
//! # Invariants
//! - Field-encryption and CSRF secrets are distinct keys, loaded once.
//! - Secret-dependent comparisons are constant-time.

pub mod cipher;
pub mod csrf;
pub mod identity;
pub mod session;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;

/// Returns `len` bytes from the thread-local CSPRNG, base64url encoded.
pub(crate) fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
