//! Negotiate session keys and exchange framed messages over arbitrary transport.
//!
//! A session begins with a key exchange driven by a [handshake::TransactionManager]
//! on each side (one [handshake::Role::Initiator], one [handshake::Role::Listener]).
//! Once both sides hold the same key, application payloads are encrypted and
//! wrapped by [frame::pack] with a digest of the ciphertext, and checked and
//! decrypted on receipt by [frame::FramedMessage::accept].
//!
//! Every unit written to a socket (handshake message or framed payload) is carried
//! in a length-prefixed transport frame (see [utils::codec]).
//!
//! # Status
//!
//! The key-exchange group is a 32-bit prime field and the default cipher is
//! [parley_cryptography::Additive]. Neither offers meaningful security.

pub mod frame;
pub mod handshake;
pub mod utils;

use thiserror::Error;

/// Errors that can occur when interacting with a stream.
#[derive(Error, Debug)]
pub enum Error {
    // Handshake errors
    #[error("handshake failed")]
    HandshakeFailed,
    #[error("handshake timeout")]
    HandshakeTimeout,

    // Framing errors
    #[error("digest mismatch")]
    Tampered,
    #[error("unframed message after handshake")]
    Unframed,
    #[error("invalid utf-8")]
    InvalidUtf8,

    // Connection errors
    #[error("recv failed")]
    RecvFailed(#[source] std::io::Error),
    #[error("recv zero size")]
    RecvZeroSize,
    #[error("recv too large: {0} bytes")]
    RecvTooLarge(usize),
    #[error("send failed")]
    SendFailed(#[source] std::io::Error),
    #[error("send zero size")]
    SendZeroSize,
    #[error("send too large: {0} bytes")]
    SendTooLarge(usize),
    #[error("connection closed")]
    Closed,
}
