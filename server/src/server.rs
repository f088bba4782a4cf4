use crate::{
    actors::{connection, listener},
    Config, Error, Handler, Registry,
};
use parley_cryptography::{Additive, Cipher};
use std::{
    net::{IpAddr, SocketAddr},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{
    net::{lookup_host, TcpSocket},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};

/// Accepts connections and serves them with a loaded [Handler].
pub struct Server {
    cfg: Config,
    handler: Option<Arc<dyn Handler>>,
    cipher: Arc<dyn Cipher>,

    registry: Registry,
    running: Arc<AtomicBool>,
    listener: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    /// Creates a stopped server using the [Additive] cipher.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            handler: None,
            cipher: Arc::new(Additive),

            registry: Registry::new(),
            running: Arc::new(AtomicBool::new(false)),
            listener: None,
            local_addr: None,
        }
    }

    /// Replaces the cipher used for application messages.
    pub fn with_cipher(mut self, cipher: impl Cipher) -> Self {
        self.cipher = Arc::new(cipher);
        self
    }

    /// Loads the handler that will serve connections.
    ///
    /// The handler can only be replaced while the server is stopped.
    pub fn load(&mut self, handler: Arc<dyn Handler>) -> Result<(), Error> {
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }
        self.handler = Some(handler);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.listener.is_some()
    }

    /// Number of live connections.
    pub fn connections(&self) -> usize {
        self.registry.len()
    }

    /// Address the server is bound to, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    async fn resolve(host: &str, port: u16) -> Result<SocketAddr, Error> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, port));
        }
        lookup_host((host, port))
            .await
            .map_err(|err| {
                debug!(?err, host, "failed to resolve host");
                Error::Resolve(host.to_string())
            })?
            .next()
            .ok_or_else(|| Error::Resolve(host.to_string()))
    }

    fn bind(&self, address: SocketAddr) -> Result<tokio::net::TcpListener, std::io::Error> {
        let socket = match address {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(address)?;
        let backlog = u32::try_from(self.cfg.max_clients).unwrap_or(u32::MAX).max(1);
        socket.listen(backlog)
    }

    /// Binds `host:port` and starts accepting connections, returning the bound address.
    pub async fn start(&mut self, host: &str, port: u16) -> Result<SocketAddr, Error> {
        let handler = self.handler.clone().ok_or(Error::NoHandler)?;
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }
        let address = Self::resolve(host, port).await?;
        let listener = self.bind(address).map_err(|err| Error::Bind(address, err))?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| Error::Bind(address, err))?;

        // Each run gets its own flag so a lingering listener never observes a restart
        self.running = Arc::new(AtomicBool::new(true));
        let actor = listener::Actor::new(
            listener,
            self.running.clone(),
            self.registry.clone(),
            handler,
            self.cipher.clone(),
            listener::Config {
                max_clients: self.cfg.max_clients,
                poll_timeout: self.cfg.poll_timeout,
                connection: connection::Config {
                    buffer_size: self.cfg.buffer_size,
                    encryption: self.cfg.encryption,
                    send_timeout: self.cfg.send_timeout,
                    handshake_timeout: self.cfg.handshake_timeout,
                    split_responses: self.cfg.split_responses,
                    mailbox_size: self.cfg.mailbox_size,
                },
            },
        );
        self.listener = Some(actor.start());
        self.local_addr = Some(local_addr);
        info!(address = ?local_addr, encryption = self.cfg.encryption, "server started");
        Ok(local_addr)
    }

    /// Stops accepting connections and closes every live connection.
    ///
    /// Returns the number of connections closed.
    pub async fn stop(&mut self) -> Result<usize, Error> {
        let Some(mut listener) = self.listener.take() else {
            return Err(Error::NotRunning);
        };
        self.running.store(false, Ordering::Release);

        // Wait for the listener to observe the flag (and drop the listening socket)
        if timeout(self.cfg.stop_timeout, &mut listener).await.is_err() {
            warn!("listener did not exit in time, aborting");
            listener.abort();
        }

        let connections = self.registry.drain();
        let mut closed = 0;
        for mut connection in connections {
            if connection.dispose() {
                closed += 1;
                debug!(id = %connection.id(), address = ?connection.address(), "closed connection");
            }
            if let Some(handler) = &self.handler {
                handler.on_disconnect(connection.id());
            }
        }
        self.local_addr = None;
        info!(connections = closed, "server stopped");
        Ok(closed)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        self.running.store(false, Ordering::Release);
        listener.abort();
        for mut connection in self.registry.drain() {
            connection.dispose();
        }
    }
}
