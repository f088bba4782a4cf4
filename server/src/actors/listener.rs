//! Listener

use super::connection;
use crate::{registry::Connection, ConnectionId, Handler, Registry};
use parley_cryptography::Cipher;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{net::TcpListener, task::JoinHandle, time::timeout};
use tracing::debug;

/// Configuration for the listener actor.
pub struct Config {
    pub max_clients: usize,
    pub poll_timeout: std::time::Duration,
    pub connection: connection::Config,
}

pub struct Actor {
    listener: TcpListener,
    running: Arc<AtomicBool>,
    registry: Registry,
    handler: Arc<dyn Handler>,
    cipher: Arc<dyn Cipher>,

    max_clients: usize,
    poll_timeout: std::time::Duration,
    connection: connection::Config,
    next_id: u64,
}

impl Actor {
    pub fn new(
        listener: TcpListener,
        running: Arc<AtomicBool>,
        registry: Registry,
        handler: Arc<dyn Handler>,
        cipher: Arc<dyn Cipher>,
        cfg: Config,
    ) -> Self {
        Self {
            listener,
            running,
            registry,
            handler,
            cipher,

            max_clients: cfg.max_clients,
            poll_timeout: cfg.poll_timeout,
            connection: cfg.connection,
            next_id: 0,
        }
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        // Poll for connections until asked to stop
        while self.running.load(Ordering::Acquire) {
            let (stream, address) = match timeout(self.poll_timeout, self.listener.accept()).await {
                Ok(Ok(accepted)) => accepted,
                Ok(Err(err)) => {
                    debug!(?err, "failed to accept connection");
                    continue;
                }
                Err(_) => continue,
            };
            debug!(ip = ?address.ip(), port = ?address.port(), "accepted incoming connection");

            // Stop may have been requested while we were accepting
            if !self.running.load(Ordering::Acquire) {
                debug!(?address, "refusing connection during shutdown");
                break;
            }
            if self.registry.len() >= self.max_clients {
                debug!(?address, max_clients = self.max_clients, "maximum clients reached");
                continue;
            }
            if let Err(err) = stream.set_nodelay(true) {
                debug!(?err, ?address, "failed to set nodelay");
            }

            // Register before spawning so the worker always finds itself
            let id = ConnectionId::new(self.next_id);
            self.next_id += 1;
            self.registry.insert(Connection::new(id, address));
            let (reader, worker) = connection::Actor::new(
                id,
                address,
                self.connection.clone(),
                self.registry.clone(),
                self.handler.clone(),
                self.cipher.clone(),
            )
            .start(stream);
            if !self.registry.attach(id, reader, worker) {
                debug!(%id, ?address, "connection removed before start");
            }
        }
        debug!("listener stopped");
    }
}
