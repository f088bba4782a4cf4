//! Wrap encrypted payloads with a digest of their ciphertext.
//!
//! A framed message is rendered as
//!
//! ```text
//! frame{payload:"<hex ciphertext>";digest:"<hex sha256(ciphertext)>";}
//! ```
//!
//! This layout is only a contract between [pack] and [unpack]; no other
//! implementation is expected to produce it.

use crate::Error;
use bytes::Bytes;
use parley_codec::{parse, Object, Value};
use parley_cryptography::{sha256::hash, Cipher, Digest, MAX_EXPANSION};
use parley_utils::{from_hex, hex};

const FRAME: &str = "frame";
const PAYLOAD: &str = "payload";
const DIGEST: &str = "digest";

/// Bytes [pack] adds around the hex ciphertext: names, punctuation and the hex digest.
const OVERHEAD: usize = FRAME.len() + PAYLOAD.len() + DIGEST.len() + 10 + 2 * Digest::SIZE;

/// Upper bound on the length of [pack] applied to `plaintext_len` bytes.
///
/// Transport frames carrying framed messages must accept at least this many bytes.
pub const fn max_packed_len(plaintext_len: usize) -> usize {
    plaintext_len
        .saturating_mul(2 * MAX_EXPANSION)
        .saturating_add(OVERHEAD)
}

/// A message received from the wire, not yet checked or decrypted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FramedMessage {
    ciphertext: Bytes,
    digest: Digest,
}

impl FramedMessage {
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Verifies the digest and decrypts the payload.
    pub fn accept<C: Cipher + ?Sized>(&self, cipher: &C, key: &str) -> Result<String, Error> {
        if hash(&self.ciphertext) != self.digest {
            return Err(Error::Tampered);
        }
        let ciphertext = std::str::from_utf8(&self.ciphertext).map_err(|_| Error::InvalidUtf8)?;
        Ok(cipher.decrypt(ciphertext, key))
    }
}

/// Encrypts `plaintext` under `key` and frames it for the wire.
pub fn pack<C: Cipher + ?Sized>(plaintext: &str, cipher: &C, key: &str) -> String {
    let ciphertext = cipher.encrypt(plaintext, key);
    let digest = hash(ciphertext.as_bytes());
    Object::new()
        .with(PAYLOAD, hex(ciphertext.as_bytes()))
        .with(DIGEST, digest.to_string())
        .encode(FRAME)
}

fn text<'a>(object: &'a Object, name: &str) -> Option<&'a str> {
    match object.field(name)? {
        Value::Text(value) => Some(value),
        _ => None,
    }
}

/// Parses a framed message, returning `None` if `wire` is not one.
pub fn unpack(wire: &str) -> Option<FramedMessage> {
    let root = parse(wire).ok()?;
    if root.field_names().next().is_some() || root.object_names().count() != 1 {
        return None;
    }
    let frame = root.object(FRAME)?;
    if frame.object_names().next().is_some() || frame.field_names().count() != 2 {
        return None;
    }
    let ciphertext = from_hex(text(frame, PAYLOAD)?)?;
    let digest = text(frame, DIGEST)?.parse().ok()?;
    Some(FramedMessage {
        ciphertext: Bytes::from(ciphertext),
        digest,
    })
}

/// Interprets a received message given the session key, if one is committed.
///
/// Without a key (encryption disabled or handshake in flight) the message is
/// plaintext. With a key the message must be framed.
pub fn open<C: Cipher + ?Sized>(wire: &str, cipher: &C, key: Option<&str>) -> Result<String, Error> {
    let Some(key) = key else {
        return Ok(wire.to_string());
    };
    unpack(wire).ok_or(Error::Unframed)?.accept(cipher, key)
}
