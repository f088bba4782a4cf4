//! Encrypt session payloads and digest messages.
//!
//! # Status
//!
//! The symmetric cipher shipped here ([Additive]) preserves the shape of an
//! encrypted session (deterministic encrypt/decrypt under a negotiated key) but
//! offers no meaningful confidentiality. Deployments that need real secrecy
//! should provide an authenticated cipher through the [Cipher] trait.

use thiserror::Error;

pub mod additive;
pub use additive::Additive;
pub mod sha256;
pub use sha256::{hash, hash_hex, hash_password, verify_password, Digest};

/// Errors that can occur when working with cryptographic primitives.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("invalid digest length: {0}")]
    InvalidDigestLength(usize),
    #[error("invalid digest encoding")]
    InvalidDigestEncoding,
}

/// Largest ratio of ciphertext bytes to plaintext bytes a [Cipher] may produce.
///
/// Any character encodes to at most four bytes of UTF-8.
pub const MAX_EXPANSION: usize = 4;

/// Symmetric cipher over text keyed by the negotiated session key.
///
/// Both directions must be deterministic for a given key and total over any
/// valid UTF-8 input: `decrypt(encrypt(m, k), k) == m`. A ciphertext must not
/// exceed [MAX_EXPANSION] bytes per byte of plaintext.
pub trait Cipher: Send + Sync + 'static {
    /// Encrypts `plaintext` under `key`.
    fn encrypt(&self, plaintext: &str, key: &str) -> String;

    /// Decrypts `ciphertext` under `key`.
    fn decrypt(&self, ciphertext: &str, key: &str) -> String;
}
