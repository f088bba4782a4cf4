//! Connect to a parley server and exchange encrypted messages.
//!
//! A [Client] opens a TCP connection, drives the key exchange as the
//! [parley_stream::handshake::Role::Initiator], and then frames and encrypts
//! everything passed to [Client::send]. Responses are decrypted in the
//! background and collected with [Client::try_receive] or
//! [Client::wait_for_response].
//!
//! # Example
//!
//! ```rust,no_run
//! use parley_client::{Client, Config};
//!
//! # async fn run() -> Result<(), parley_client::Error> {
//! let mut client = Client::connect(Config::default(), "127.0.0.1", 2525).await?;
//! client.wait_until_ready().await?;
//! client.send("PING", false)?;
//! println!("{}", client.wait_for_response().await);
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

mod client;
pub use client::{Client, Status};
mod config;
pub use config::Config;

use std::net::SocketAddr;
use thiserror::Error;

/// Errors that can occur when using a [Client].
#[derive(Error, Debug)]
pub enum Error {
    #[error("not connected")]
    NotConnected,
    #[error("message too large: {0} bytes")]
    TooLarge(usize),
    #[error("handshake failed")]
    HandshakeFailed,
    #[error("unable to resolve host: {0}")]
    Resolve(String),
    #[error("connect failed: {0}")]
    Connect(SocketAddr, #[source] std::io::Error),
    #[error("connect timeout: {0}")]
    ConnectTimeout(SocketAddr),
    #[error("invalid config: {0}")]
    Config(#[from] parley_codec::Error),
}
