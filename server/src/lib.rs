//! Serve encrypted sessions to many concurrent peers.
//!
//! A [Server] accepts TCP connections, negotiates a session key with each peer
//! (acting as the [parley_stream::handshake::Role::Listener]), and then relays
//! decrypted application messages to a shared [Handler], framing and encrypting
//! whatever the handler answers.
//!
//! # Example
//!
//! ```rust,no_run
//! use parley_server::{Config, ConnectionId, Handler, HandlerError, Server};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl Handler for Echo {
//!     fn handle_input(&self, _: ConnectionId, data: &str) -> Result<Option<String>, HandlerError> {
//!         Ok(Some(data.to_string()))
//!     }
//! }
//!
//! # async fn run() -> Result<(), parley_server::Error> {
//! let mut server = Server::new(Config::default());
//! server.load(Arc::new(Echo))?;
//! let address = server.start("127.0.0.1", 0).await?;
//! println!("listening on {address}");
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

mod actors;
mod config;
pub use config::Config;
mod handler;
pub use handler::{ConnectionId, Handler, HandlerError};
pub mod registry;
pub use registry::Registry;
mod server;
pub use server::Server;

use std::net::SocketAddr;
use thiserror::Error;

/// Errors that can occur when operating a [Server].
#[derive(Error, Debug)]
pub enum Error {
    #[error("no handler loaded")]
    NoHandler,
    #[error("server already running")]
    AlreadyRunning,
    #[error("server not running")]
    NotRunning,
    #[error("unable to resolve host: {0}")]
    Resolve(String),
    #[error("bind failed: {0}")]
    Bind(SocketAddr, #[source] std::io::Error),
    #[error("invalid config: {0}")]
    Config(#[from] parley_codec::Error),
}
