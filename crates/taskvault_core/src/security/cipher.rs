//! Field-level encryption for task notes.
//!
//! # Responsibility
//! - Turn plaintext notes into self-describing ciphertext envelopes.
//! - Report every decrypt failure as a distinct `DecryptionError`.
//!
//! # Invariants
//! - Each call to `encrypt` draws a fresh 96-bit nonce, so equal plaintexts
//!   produce different envelopes.
//! - `decrypt(encrypt(s)) == s` under the same key.
//! - Envelope format: `enc:v1:<nonce_b64url>:<ciphertext_b64url>`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

const ENVELOPE_TAG: &str = "enc";
const ENVELOPE_VERSION: &str = "v1";
const NONCE_LEN: usize = 12;
const KEY_DERIVATION_LABEL: &[u8] = b"taskvault.field-cipher.v1\0";

/// Failure to produce a ciphertext envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionError;

impl Display for EncryptionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "field encryption failed")
    }
}

impl Error for EncryptionError {}

/// Failure to recover plaintext from a stored envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptionError {
    /// Not an `enc:v1:<nonce>:<payload>` envelope.
    MalformedEnvelope,
    UnsupportedVersion(String),
    InvalidEncoding(String),
    InvalidNonceLength(usize),
    /// Wrong key or tampered ciphertext.
    AuthenticationFailed,
    InvalidUtf8,
}

impl Display for DecryptionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedEnvelope => write!(f, "ciphertext envelope is malformed"),
            Self::UnsupportedVersion(version) => {
                write!(f, "ciphertext envelope version `{version}` is unsupported")
            }
            Self::InvalidEncoding(message) => {
                write!(f, "ciphertext envelope is not valid base64: {message}")
            }
            Self::InvalidNonceLength(len) => {
                write!(f, "ciphertext nonce has {len} bytes, expected {NONCE_LEN}")
            }
            Self::AuthenticationFailed => {
                write!(f, "ciphertext failed authentication (wrong key or corrupted data)")
            }
            Self::InvalidUtf8 => write!(f, "decrypted notes are not valid UTF-8"),
        }
    }
}

impl Error for DecryptionError {}

/// Symmetric AEAD cipher for a single sensitive text field.
#[derive(Clone)]
pub struct FieldCipher {
    aead: ChaCha20Poly1305,
}

impl Debug for FieldCipher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}

impl FieldCipher {
    /// Derives the 256-bit key from the configured field secret.
    pub fn from_secret(secret: &str) -> Self {
        let digest = Sha256::new()
            .chain_update(KEY_DERIVATION_LABEL)
            .chain_update(secret.as_bytes())
            .finalize();
        Self {
            aead: ChaCha20Poly1305::new(Key::from_slice(digest.as_slice())),
        }
    }

    /// Encrypts `plaintext` under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .aead
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| EncryptionError)?;

        Ok(format!(
            "{ENVELOPE_TAG}:{ENVELOPE_VERSION}:{}:{}",
            URL_SAFE_NO_PAD.encode(nonce),
            URL_SAFE_NO_PAD.encode(ciphertext)
        ))
    }

    /// Recovers plaintext from an envelope produced by `encrypt`.
    pub fn decrypt(&self, envelope: &str) -> Result<String, DecryptionError> {
        let mut parts = envelope.split(':');
        let (Some(tag), Some(version), Some(nonce_b64), Some(payload_b64), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(DecryptionError::MalformedEnvelope);
        };

        if tag != ENVELOPE_TAG {
            return Err(DecryptionError::MalformedEnvelope);
        }
        if version != ENVELOPE_VERSION {
            return Err(DecryptionError::UnsupportedVersion(version.to_string()));
        }

        let nonce = URL_SAFE_NO_PAD
            .decode(nonce_b64)
            .map_err(|err| DecryptionError::InvalidEncoding(err.to_string()))?;
        if nonce.len() != NONCE_LEN {
            return Err(DecryptionError::InvalidNonceLength(nonce.len()));
        }
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|err| DecryptionError::InvalidEncoding(err.to_string()))?;

        let plaintext = self
            .aead
            .decrypt(Nonce::from_slice(&nonce), payload.as_slice())
            .map_err(|_| DecryptionError::AuthenticationFailed)?;

        String::from_utf8(plaintext).map_err(|_| DecryptionError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::{DecryptionError, FieldCipher};

    fn is_v1_envelope(value: &str) -> bool {
        value.starts_with("enc:v1:") && value.matches(':').count() == 3
    }

    fn cipher() -> FieldCipher {
        FieldCipher::from_secret("field-secret-for-tests")
    }

    #[test]
    fn round_trips_text_including_empty_and_unicode() {
        let cipher = cipher();
        for plaintext in ["call mom", "", "ノート: ☕ and \"quotes\"", "a:b:c:d"] {
            let envelope = cipher.encrypt(plaintext).expect("encrypt");
            assert!(is_v1_envelope(&envelope), "envelope shape: {envelope}");
            assert_eq!(cipher.decrypt(&envelope).expect("decrypt"), plaintext);
        }
    }

    #[test]
    fn encryption_is_not_deterministic() {
        let cipher = cipher();
        let first = cipher.encrypt("same text").expect("encrypt first");
        let second = cipher.encrypt("same text").expect("encrypt second");
        assert_ne!(first, second);
        assert!(!first.contains("same text"));
    }

    #[test]
    fn wrong_key_is_an_authentication_failure() {
        let envelope = cipher().encrypt("secret").expect("encrypt");
        let other = FieldCipher::from_secret("another-secret");
        assert_eq!(
            other.decrypt(&envelope),
            Err(DecryptionError::AuthenticationFailed)
        );
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let cipher = cipher();
        let envelope = cipher.encrypt("secret").expect("encrypt");
        let (prefix, payload) = envelope.rsplit_once(':').expect("payload segment");
        let flipped = if payload.starts_with('A') { "B" } else { "A" };
        let tampered = format!("{prefix}:{flipped}{}", &payload[1..]);
        assert!(cipher.decrypt(&tampered).is_err());
    }

    #[test]
    fn foreign_inputs_never_decrypt_to_text() {
        let cipher = cipher();
        assert_eq!(
            cipher.decrypt("call mom"),
            Err(DecryptionError::MalformedEnvelope)
        );
        assert_eq!(
            cipher.decrypt("U2FsdGVkX1+legacyCryptoJs"),
            Err(DecryptionError::MalformedEnvelope)
        );
        assert_eq!(
            cipher.decrypt("enc:v2:AAAA:AAAA"),
            Err(DecryptionError::UnsupportedVersion("v2".to_string()))
        );
        assert!(matches!(
            cipher.decrypt("enc:v1:!!!:AAAA"),
            Err(DecryptionError::InvalidEncoding(_))
        ));
        assert_eq!(
            cipher.decrypt("enc:v1:AAAA:AAAA"),
            Err(DecryptionError::InvalidNonceLength(3))
        );
        assert_eq!(
            cipher.decrypt("enc:v1:AAAAAAAAAAAAAAAA:AAAA"),
            Err(DecryptionError::AuthenticationFailed)
        );
    }
}
