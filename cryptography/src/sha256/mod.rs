//! SHA-256 digests of message payloads and salted passwords.
//!
//! This implementation uses the `sha2` crate to generate SHA-256 digests.
//!
//! # Example
//! ```rust
//! use parley_cryptography::sha256::{hash, hash_password, verify_password};
//!
//! // Digest a payload
//! let digest = hash(b"hello world");
//! assert_eq!(
//!     digest.to_string(),
//!     "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
//! );
//!
//! // Salt and check a password
//! let stored = hash_password("hunter2", "pepper");
//! assert!(verify_password("hunter2", "pepper", &stored));
//! ```

use crate::Error;
use parley_utils::{from_hex, hex};
use sha2::{Digest as _, Sha256};
use std::{
    fmt::{Debug, Display},
    ops::Deref,
    str::FromStr,
};

const DIGEST_LENGTH: usize = 32;

/// Generate a SHA-256 digest from a message.
pub fn hash(message: &[u8]) -> Digest {
    let array: [u8; DIGEST_LENGTH] = Sha256::digest(message).into();
    Digest::from(array)
}

/// Generate the lowercase hex SHA-256 digest of a string.
pub fn hash_hex(message: &str) -> String {
    hash(message.as_bytes()).to_string()
}

/// Hash `password` concatenated with `salt`, rendered as lowercase hex.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    let array: [u8; DIGEST_LENGTH] = hasher.finalize().into();
    hex(&array)
}

/// Returns `true` if `password` and `salt` hash to `expected` (case-insensitive hex).
pub fn verify_password(password: &str, salt: &str, expected: &str) -> bool {
    hash_password(password, salt).eq_ignore_ascii_case(expected)
}

/// Digest of a SHA-256 hashing operation.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Digest([u8; DIGEST_LENGTH]);

impl Digest {
    pub const SIZE: usize = DIGEST_LENGTH;
}

impl From<[u8; DIGEST_LENGTH]> for Digest {
    fn from(value: [u8; DIGEST_LENGTH]) -> Self {
        Self(value)
    }
}

impl TryFrom<&[u8]> for Digest {
    type Error = Error;
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; DIGEST_LENGTH] = value
            .try_into()
            .map_err(|_| Error::InvalidDigestLength(value.len()))?;
        Ok(Self(array))
    }
}

impl FromStr for Digest {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = from_hex(s).ok_or(Error::InvalidDigestEncoding)?;
        Self::try_from(bytes.as_slice())
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Digest {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}
