//! Serve a single accepted connection.
//!
//! A reader task pulls transport frames off the socket and pushes them, in arrival
//! order, into the connection's mailbox. A single worker consumes the mailbox, so
//! messages from one peer are always processed one at a time.

use crate::{ConnectionId, Handler, Registry};
use bytes::Bytes;
use futures::{channel::mpsc, FutureExt, SinkExt, StreamExt};
use parley_cryptography::Cipher;
use parley_stream::{
    frame::{max_packed_len, open, pack},
    handshake::TransactionManager,
    utils::codec::{recv_frame, send_frame},
    Error,
};
use parley_utils::decode_text;
use std::{net::SocketAddr, panic::AssertUnwindSafe, sync::Arc, time::Duration};
use tokio::{
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    task::JoinHandle,
    time::{timeout, timeout_at, Instant},
};
use tracing::{debug, warn};

/// Configuration for a connection actor.
#[derive(Clone, Debug)]
pub struct Config {
    /// Largest application message, in bytes, before framing.
    pub buffer_size: usize,
    pub encryption: bool,
    pub send_timeout: Duration,
    pub handshake_timeout: Duration,
    pub split_responses: bool,
    pub mailbox_size: usize,
}

/// Events delivered from the reader to the worker.
#[derive(Debug)]
enum Event {
    Data(Bytes),
    Closed,
    Failed(Error),
}

/// Lifecycle of a connection as seen by its worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Handshaking,
    Ready,
    Closed,
}

/// Why a worker stopped serving its connection.
#[derive(Debug)]
enum Reason {
    Closed,
    Transport(Error),
    HandshakeFailed,
    HandshakeTimeout,
    Requested,
    Unregistered,
    Panicked,
}

/// Per-connection state owned by the worker.
struct Session {
    handshake: Option<TransactionManager>,
    phase: Phase,
}

impl Session {
    fn new(encryption: bool) -> Self {
        if encryption {
            Self {
                handshake: Some(TransactionManager::listener()),
                phase: Phase::Handshaking,
            }
        } else {
            Self {
                handshake: None,
                phase: Phase::Ready,
            }
        }
    }

    fn key(&self) -> Option<&str> {
        self.handshake.as_ref().and_then(|handshake| handshake.encryption_key())
    }
}

pub struct Actor {
    id: ConnectionId,
    address: SocketAddr,
    cfg: Config,
    registry: Registry,
    handler: Arc<dyn Handler>,
    cipher: Arc<dyn Cipher>,
}

impl Actor {
    pub fn new(
        id: ConnectionId,
        address: SocketAddr,
        cfg: Config,
        registry: Registry,
        handler: Arc<dyn Handler>,
        cipher: Arc<dyn Cipher>,
    ) -> Self {
        Self {
            id,
            address,
            cfg,
            registry,
            handler,
            cipher,
        }
    }

    /// Spawns the reader and worker tasks, returning their handles.
    pub fn start(self, stream: TcpStream) -> (JoinHandle<()>, JoinHandle<()>) {
        let (stream, sink) = stream.into_split();
        let (sender, receiver) = mpsc::channel(self.cfg.mailbox_size);
        let reader = tokio::spawn(Self::read(stream, max_packed_len(self.cfg.buffer_size), sender));
        let worker = tokio::spawn(self.run(sink, receiver));
        (reader, worker)
    }

    async fn read(mut stream: OwnedReadHalf, frame_size: usize, mut mailbox: mpsc::Sender<Event>) {
        let mut buffer = vec![0u8; frame_size];
        loop {
            let event = match recv_frame(&mut stream, &mut buffer).await {
                Ok(n) => Event::Data(Bytes::copy_from_slice(&buffer[..n])),
                Err(Error::Closed) => Event::Closed,
                Err(err) => Event::Failed(err),
            };
            let last = !matches!(event, Event::Data(_));
            if mailbox.send(event).await.is_err() || last {
                return;
            }
        }
    }

    async fn run(self, mut sink: OwnedWriteHalf, mut mailbox: mpsc::Receiver<Event>) {
        let mut session = Session::new(self.cfg.encryption);
        let deadline = Instant::now() + self.cfg.handshake_timeout;
        // A panicking handler takes down this connection only
        let served = AssertUnwindSafe(self.serve(&mut session, &mut sink, &mut mailbox, deadline))
            .catch_unwind()
            .await;
        let reason = match served {
            Ok(Ok(reason)) => reason,
            Ok(Err(err)) => Reason::Transport(err),
            Err(_) => Reason::Panicked,
        };
        session.phase = Phase::Closed;
        self.close(reason);
    }

    async fn serve(
        &self,
        session: &mut Session,
        sink: &mut OwnedWriteHalf,
        mailbox: &mut mpsc::Receiver<Event>,
        deadline: Instant,
    ) -> Result<Reason, Error> {
        // Without encryption the connection is ready immediately
        if session.phase == Phase::Ready {
            self.announce(session, sink).await?;
        }

        loop {
            let event = if session.phase == Phase::Handshaking {
                match timeout_at(deadline, mailbox.next()).await {
                    Ok(event) => event,
                    Err(_) => return Ok(Reason::HandshakeTimeout),
                }
            } else {
                mailbox.next().await
            };
            let Some(event) = event else {
                return Ok(Reason::Closed);
            };
            if !self.registry.contains(self.id) {
                return Ok(Reason::Unregistered);
            }
            let data = match event {
                Event::Data(data) => data,
                Event::Closed => return Ok(Reason::Closed),
                Event::Failed(err) => return Ok(Reason::Transport(err)),
            };
            let text = match decode_text(&data) {
                Ok(text) => text,
                Err(err) => {
                    debug!(?err, id = %self.id, "discarding invalid message");
                    continue;
                }
            };

            match session.phase {
                Phase::Handshaking => {
                    if let Some(reason) = self.handshake(session, sink, &text).await? {
                        return Ok(reason);
                    }
                }
                Phase::Ready => {
                    if let Some(reason) = self.dispatch(session, sink, &text).await? {
                        return Ok(reason);
                    }
                }
                Phase::Closed => return Ok(Reason::Closed),
            }
        }
    }

    /// Advances the key exchange with one message from the peer.
    async fn handshake(
        &self,
        session: &mut Session,
        sink: &mut OwnedWriteHalf,
        text: &str,
    ) -> Result<Option<Reason>, Error> {
        let Some(handshake) = session.handshake.as_mut() else {
            return Ok(Some(Reason::HandshakeFailed));
        };
        let reply = handshake.evaluate(text);
        if let Some(reply) = reply {
            self.send_raw(sink, &reply).await?;
        }
        if handshake.has_failed() {
            return Ok(Some(Reason::HandshakeFailed));
        }
        if handshake.is_ready() {
            debug!(id = %self.id, address = ?self.address, "completed handshake");
            session.phase = Phase::Ready;
            self.announce(session, sink).await?;
        }
        Ok(None)
    }

    /// Delivers one application message to the handler and sends its response.
    async fn dispatch(
        &self,
        session: &Session,
        sink: &mut OwnedWriteHalf,
        text: &str,
    ) -> Result<Option<Reason>, Error> {
        let data = match open(text, self.cipher.as_ref(), session.key()) {
            Ok(data) => data,
            Err(err) => {
                warn!(?err, id = %self.id, "discarding message");
                return Ok(None);
            }
        };
        match self.handler.handle_input(self.id, &data) {
            Ok(Some(response)) => self.respond(session, sink, &response).await?,
            Ok(None) => {}
            Err(err) => warn!(?err, id = %self.id, "handler failed"),
        }

        // Apply teardown requested by the handler
        let mut requested = false;
        for id in self.handler.take_disconnected() {
            if id == self.id {
                requested = true;
                continue;
            }
            if let Some(mut connection) = self.registry.remove(id) {
                connection.dispose();
                debug!(%id, by = %self.id, "closed connection at handler request");
            }
        }
        Ok(requested.then_some(Reason::Requested))
    }

    /// Announces a ready connection to the handler and sends its greeting.
    async fn announce(&self, session: &Session, sink: &mut OwnedWriteHalf) -> Result<(), Error> {
        if let Some(greeting) = self.handler.on_connection(self.id) {
            self.respond(session, sink, &greeting).await?;
        }
        Ok(())
    }

    /// Sends an application message, framed if a session key is committed.
    async fn respond(&self, session: &Session, sink: &mut OwnedWriteHalf, text: &str) -> Result<(), Error> {
        let units: Vec<&str> = if self.cfg.split_responses {
            text.lines().collect()
        } else {
            vec![text]
        };
        for unit in units.into_iter().filter(|unit| !unit.is_empty()) {
            if unit.len() > self.cfg.buffer_size {
                warn!(id = %self.id, size = unit.len(), "dropping oversized response");
                continue;
            }
            match session.key() {
                Some(key) => self.send_raw(sink, &pack(unit, self.cipher.as_ref(), key)).await?,
                None => self.send_raw(sink, unit).await?,
            }
        }
        Ok(())
    }

    async fn send_raw(&self, sink: &mut OwnedWriteHalf, text: &str) -> Result<(), Error> {
        let result = timeout(
            self.cfg.send_timeout,
            send_frame(sink, text.as_bytes(), max_packed_len(self.cfg.buffer_size)),
        )
        .await
        .map_err(|_| Error::SendFailed(std::io::ErrorKind::TimedOut.into()))?;
        match result {
            Err(Error::SendTooLarge(n)) => {
                warn!(id = %self.id, size = n, "dropping oversized message");
                Ok(())
            }
            result => result,
        }
    }

    /// Removes the connection from the registry (if still present) and releases it.
    fn close(&self, reason: Reason) {
        match &reason {
            Reason::Transport(err) => debug!(?err, id = %self.id, address = ?self.address, "connection failed"),
            reason => debug!(?reason, id = %self.id, address = ?self.address, "connection closed"),
        }

        // Whoever removes the connection disposes it
        let Some(mut connection) = self.registry.remove(self.id) else {
            return;
        };
        if !matches!(reason, Reason::Requested) {
            self.handler.on_disconnect(self.id);
        }
        connection.dispose();
    }
}
