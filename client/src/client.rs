use crate::{Config, Error};
use futures::{channel::mpsc, StreamExt};
use parley_cryptography::{Additive, Cipher};
use parley_stream::{
    frame::{max_packed_len, open, pack},
    handshake::TransactionManager,
    utils::codec::{recv_frame, send_frame},
    Error as StreamError,
};
use parley_utils::decode_text;
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};
use tokio::{
    io::AsyncWriteExt,
    net::{
        lookup_host,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::watch,
    task::{AbortHandle, JoinHandle},
    time::timeout,
};
use tracing::{debug, warn};

/// Connection status of a [Client].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Connected, key exchange in flight.
    Handshaking,
    /// Connected and ready for application messages.
    Ready,
    /// The key exchange was rejected and the connection closed.
    Failed,
    /// The connection is closed.
    Disconnected,
}

/// State published by the background tasks.
#[derive(Clone, Debug)]
struct State {
    status: Status,
    key: Option<String>,
}

impl State {
    fn close(&mut self) {
        if self.status != Status::Failed {
            self.status = Status::Disconnected;
        }
        self.key = None;
    }
}

/// A message waiting to be written.
#[derive(Debug)]
enum Outbound {
    /// Written as is (handshake messages and explicitly unframed sends).
    Raw(String),
    /// Framed and encrypted if a session key is committed when it is written.
    Application(String),
}

/// A connection to a parley server.
///
/// Outbound messages are written in order by a background sender task. Inbound
/// messages are read (and the key exchange answered) by a background listener task.
pub struct Client {
    cfg: Config,
    peer_addr: SocketAddr,

    state: Arc<watch::Sender<State>>,
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::UnboundedReceiver<String>,

    sender: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
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

impl Client {
    /// Connects to `host:port` using the [Additive] cipher.
    ///
    /// With encryption enabled the key exchange starts immediately; use
    /// [Client::wait_until_ready] before sending application messages.
    pub async fn connect(cfg: Config, host: &str, port: u16) -> Result<Self, Error> {
        Self::connect_with_cipher(cfg, Arc::new(Additive), host, port).await
    }

    pub async fn connect_with_cipher(
        cfg: Config,
        cipher: Arc<dyn Cipher>,
        host: &str,
        port: u16,
    ) -> Result<Self, Error> {
        let address = resolve(host, port).await?;
        let stream = timeout(cfg.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| Error::ConnectTimeout(address))?
            .map_err(|err| Error::Connect(address, err))?;
        if let Err(err) = stream.set_nodelay(true) {
            debug!(?err, ?address, "failed to set nodelay");
        }
        debug!(?address, encryption = cfg.encryption, "connected");
        let (stream, sink) = stream.into_split();

        let (outbound, outbound_receiver) = mpsc::unbounded();
        let (inbound_sender, inbound) = mpsc::unbounded();

        // Open the key exchange before anything else is queued
        let (handshake, status) = if cfg.encryption {
            let mut manager = TransactionManager::initiator();
            let primer = manager.initiate().ok_or(Error::HandshakeFailed)?;
            outbound
                .unbounded_send(Outbound::Raw(primer))
                .map_err(|_| Error::NotConnected)?;
            (Some(manager), Status::Handshaking)
        } else {
            (None, Status::Ready)
        };
        let (state, _) = watch::channel(State { status, key: None });
        let state = Arc::new(state);

        let listener = tokio::spawn(listen(
            stream,
            cfg.buffer_size,
            handshake,
            cipher.clone(),
            state.clone(),
            outbound.clone(),
            inbound_sender,
        ));
        let sender = tokio::spawn(send(
            sink,
            cfg.clone(),
            cipher,
            state.clone(),
            outbound_receiver,
            listener.abort_handle(),
        ));

        Ok(Self {
            cfg,
            peer_addr: address,
            state,
            outbound,
            inbound,
            sender: Some(sender),
            listener: Some(listener),
        })
    }

    pub fn status(&self) -> Status {
        self.state.borrow().status
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.status(), Status::Handshaking | Status::Ready)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Resolves once the key exchange has completed.
    ///
    /// Returns immediately when encryption is disabled.
    pub async fn wait_until_ready(&self) -> Result<(), Error> {
        let mut state = self.state.subscribe();
        let status = match state.wait_for(|state| state.status != Status::Handshaking).await {
            Ok(state) => state.status,
            Err(_) => Status::Disconnected,
        };
        match status {
            Status::Ready => Ok(()),
            Status::Failed => Err(Error::HandshakeFailed),
            Status::Handshaking | Status::Disconnected => Err(Error::NotConnected),
        }
    }

    /// Queues `message` for sending.
    ///
    /// Application messages get the configured line terminator and are framed once
    /// the session is ready. With `ignore_framing` the message is sent exactly as given.
    /// Messages longer than [Config::buffer_size] are rejected.
    pub fn send(&self, message: &str, ignore_framing: bool) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let message = if ignore_framing {
            Outbound::Raw(message.to_string())
        } else {
            Outbound::Application(format!("{message}{}", self.cfg.terminator()))
        };
        let size = match &message {
            Outbound::Raw(text) | Outbound::Application(text) => text.len(),
        };
        if size > self.cfg.buffer_size {
            return Err(Error::TooLarge(size));
        }
        self.outbound
            .unbounded_send(message)
            .map_err(|_| Error::NotConnected)
    }

    /// Returns everything received so far, concatenated, without waiting.
    pub fn try_receive(&mut self) -> Option<String> {
        let mut received: Option<String> = None;
        while let Ok(Some(message)) = self.inbound.try_next() {
            received.get_or_insert_with(String::new).push_str(&message);
        }
        received
    }

    /// Waits for at least one message and returns everything received so far.
    ///
    /// Returns an empty string if the connection closes first.
    pub async fn wait_for_response(&mut self) -> String {
        let Some(first) = self.inbound.next().await else {
            return String::new();
        };
        match self.try_receive() {
            Some(rest) => first + &rest,
            None => first,
        }
    }

    /// Flushes queued messages and closes the connection.
    ///
    /// Calling this on a closed client does nothing.
    pub async fn disconnect(&mut self) {
        let (Some(mut sender), Some(listener)) = (self.sender.take(), self.listener.take()) else {
            return;
        };
        self.outbound.close_channel();
        if timeout(self.cfg.send_timeout, &mut sender).await.is_err() {
            debug!("sender did not finish in time, aborting");
            sender.abort();
            let _ = sender.await;
        }
        listener.abort();
        self.state.send_modify(State::close);
        debug!(address = ?self.peer_addr, "disconnected");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            sender.abort();
        }
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

/// Writes queued messages in order until the queue closes or a write fails.
async fn send(
    mut sink: OwnedWriteHalf,
    cfg: Config,
    cipher: Arc<dyn Cipher>,
    state: Arc<watch::Sender<State>>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    listener: AbortHandle,
) {
    while let Some(message) = outbound.next().await {
        let wire = match message {
            Outbound::Raw(text) => text,
            Outbound::Application(text) => {
                let key = state.borrow().key.clone();
                match key {
                    Some(key) => pack(&text, cipher.as_ref(), &key),
                    None => text,
                }
            }
        };
        if wire.is_empty() {
            continue;
        }
        let limit = max_packed_len(cfg.buffer_size);
        match timeout(cfg.send_timeout, send_frame(&mut sink, wire.as_bytes(), limit)).await {
            Ok(Ok(())) => {}
            Ok(Err(StreamError::SendTooLarge(n))) => {
                warn!(size = n, "dropping oversized message");
            }
            Ok(Err(err)) => {
                debug!(?err, "failed to send message");
                break;
            }
            Err(_) => {
                debug!("send timed out");
                break;
            }
        }
    }

    // Either the queue closed or the connection broke
    let _ = sink.shutdown().await;
    outbound.close();
    listener.abort();
    state.send_modify(State::close);
}

/// Reads messages until the connection closes, answering the key exchange while it is in flight.
async fn listen(
    mut stream: OwnedReadHalf,
    buffer_size: usize,
    mut handshake: Option<TransactionManager>,
    cipher: Arc<dyn Cipher>,
    state: Arc<watch::Sender<State>>,
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::UnboundedSender<String>,
) {
    let mut buffer = vec![0u8; max_packed_len(buffer_size)];
    loop {
        let n = match recv_frame(&mut stream, &mut buffer).await {
            Ok(n) => n,
            Err(StreamError::Closed) => {
                debug!("connection closed by peer");
                break;
            }
            Err(err) => {
                debug!(?err, "failed to receive message");
                break;
            }
        };
        let text = match decode_text(&buffer[..n]) {
            Ok(text) => text,
            Err(err) => {
                debug!(?err, "discarding invalid message");
                continue;
            }
        };

        // Route to the key exchange until a key is committed
        if let Some(manager) = handshake.as_mut().filter(|manager| !manager.is_ready()) {
            if let Some(reply) = manager.evaluate(&text) {
                let _ = outbound.unbounded_send(Outbound::Raw(reply));
            }
            if manager.has_failed() {
                state.send_modify(|state| state.status = Status::Failed);
                break;
            }
            if manager.ready_to_apply() {
                manager.apply();
                let key = manager.encryption_key().map(str::to_string);
                debug!("completed handshake");
                state.send_modify(|state| {
                    state.status = Status::Ready;
                    state.key = key;
                });
            }
            continue;
        }

        let key = state.borrow().key.clone();
        match open(&text, cipher.as_ref(), key.as_deref()) {
            Ok(message) => {
                if inbound.unbounded_send(message).is_err() {
                    break;
                }
            }
            Err(err) => warn!(?err, "discarding message"),
        }
    }

    // Stop the sender once it has flushed what is already queued
    outbound.close_channel();
    state.send_modify(State::close);
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_server::{
        Config as ServerConfig, ConnectionId, Handler, HandlerError, Server,
    };
    use std::time::Duration;
    use tokio::net::TcpListener;

    const WAIT: Duration = Duration::from_secs(5);

    /// Answers `PING` with `PONG` and echoes anything else verbatim.
    struct Ping;

    impl Handler for Ping {
        fn handle_input(&self, _: ConnectionId, data: &str) -> Result<Option<String>, HandlerError> {
            match data.trim_end() {
                "PING" => Ok(Some("PONG".to_string())),
                "LINES" => Ok(Some("one\ntwo\nthree".to_string())),
                _ => Ok(Some(data.to_string())),
            }
        }
    }

    async fn serve(cfg: ServerConfig) -> (Server, SocketAddr) {
        let mut server = Server::new(cfg);
        server.load(Arc::new(Ping)).unwrap();
        let address = server.start("127.0.0.1", 0).await.unwrap();
        (server, address)
    }

    async fn connect(cfg: Config, address: SocketAddr) -> Client {
        Client::connect(cfg, &address.ip().to_string(), address.port())
            .await
            .unwrap()
    }

    async fn response(client: &mut Client) -> String {
        timeout(WAIT, client.wait_for_response())
            .await
            .expect("timed out waiting for response")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ping_pong_encrypted() {
        let (mut server, address) = serve(ServerConfig::default()).await;

        let mut client = connect(Config::default(), address).await;
        assert_eq!(client.peer_addr(), address);
        timeout(WAIT, client.wait_until_ready()).await.unwrap().unwrap();
        assert_eq!(client.status(), Status::Ready);

        client.send("PING", false).unwrap();
        assert_eq!(response(&mut client).await, "PONG");

        // Terminator is part of the application message
        client.send("hello", false).unwrap();
        assert_eq!(response(&mut client).await, "hello\r\n");

        client.disconnect().await;
        server.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ping_pong_plaintext() {
        let (mut server, address) = serve(ServerConfig::default().with_encryption(false)).await;

        let cfg = Config::default()
            .with_encryption(false)
            .with_add_carriage_return(false);
        let mut client = connect(cfg, address).await;
        assert_eq!(client.status(), Status::Ready);
        client.wait_until_ready().await.unwrap();

        client.send("PING", false).unwrap();
        assert_eq!(response(&mut client).await, "PONG");
        client.send("hello", false).unwrap();
        assert_eq!(response(&mut client).await, "hello");

        client.disconnect().await;
        server.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_try_receive_concatenates() {
        let (mut server, address) =
            serve(ServerConfig::default().with_split_responses(true)).await;

        let mut client = connect(Config::default(), address).await;
        client.wait_until_ready().await.unwrap();
        assert_eq!(client.try_receive(), None);

        client.send("LINES", false).unwrap();
        let mut received = String::new();
        let start = std::time::Instant::now();
        while received.len() < "onetwothree".len() {
            assert!(start.elapsed() < WAIT, "timed out waiting for lines");
            if let Some(more) = client.try_receive() {
                received.push_str(&more);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(received, "onetwothree");
        assert_eq!(client.try_receive(), None);

        client.disconnect().await;
        server.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ignore_framing() {
        let (mut server, address) = serve(ServerConfig::default()).await;

        let mut client = connect(Config::default(), address).await;
        client.wait_until_ready().await.unwrap();

        // Unframed input is discarded by an encrypted session
        client.send("PING", true).unwrap();
        client.send("PING", false).unwrap();
        assert_eq!(response(&mut client).await, "PONG");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.try_receive(), None);

        client.disconnect().await;
        server.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_message_at_buffer_size() {
        let (mut server, address) = serve(ServerConfig::default()).await;

        let cfg = Config::default();
        let limit = cfg.buffer_size;
        let mut client = connect(cfg, address).await;
        client.wait_until_ready().await.unwrap();

        // Largest message that fits, terminator included, survives encryption and framing
        let message = "a".repeat(limit - 2);
        client.send(&message, false).unwrap();
        assert_eq!(response(&mut client).await, format!("{message}\r\n"));

        // Anything larger is refused up front
        let message = "a".repeat(limit - 1);
        assert!(matches!(
            client.send(&message, false),
            Err(Error::TooLarge(n)) if n == limit + 1
        ));
        assert!(matches!(
            client.send(&"a".repeat(limit + 1), true),
            Err(Error::TooLarge(_))
        ));

        // The connection is unaffected
        client.send("PING", false).unwrap();
        assert_eq!(response(&mut client).await, "PONG");

        client.disconnect().await;
        server.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_disconnect_stalled_peer() {
        // A peer that stops reading until told otherwise
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let (resume, resumed) = tokio::sync::oneshot::channel::<()>();
        let peer = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = resumed.await;
            let mut drained = Vec::new();
            let _ = tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut drained).await;
        });

        let mut cfg = Config::default().with_encryption(false);
        cfg.buffer_size = 64 * 1024;
        cfg.send_timeout = Duration::from_millis(200);
        let mut client = connect(cfg, address).await;

        // Queue far more than the socket buffers can hold
        let message = "a".repeat(64 * 1024 - 2);
        client.send(&message, false).unwrap();
        for _ in 0..128 {
            if client.send(&message, false).is_err() {
                break;
            }
        }

        timeout(WAIT, client.disconnect()).await.unwrap();
        assert_eq!(client.status(), Status::Disconnected);
        assert!(client.sender.is_none());

        // Every task holding the socket is gone, so the peer reaches the end of the stream
        resume.send(()).unwrap();
        timeout(WAIT, peer).await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_disconnect_idempotent() {
        let (mut server, address) = serve(ServerConfig::default()).await;

        let mut client = connect(Config::default(), address).await;
        client.wait_until_ready().await.unwrap();
        client.disconnect().await;
        assert_eq!(client.status(), Status::Disconnected);
        assert!(!client.is_connected());
        assert!(matches!(client.send("PING", false), Err(Error::NotConnected)));

        client.disconnect().await;
        assert_eq!(client.status(), Status::Disconnected);
        assert_eq!(response(&mut client).await, "");

        server.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_server_stop() {
        let (mut server, address) = serve(ServerConfig::default()).await;

        let mut client = connect(Config::default(), address).await;
        client.wait_until_ready().await.unwrap();
        client.send("PING", false).unwrap();
        assert_eq!(response(&mut client).await, "PONG");

        assert_eq!(server.stop().await.unwrap(), 1);
        assert_eq!(response(&mut client).await, "");
        let mut state = client.state.subscribe();
        timeout(WAIT, state.wait_for(|state| state.status == Status::Disconnected))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(client.send("PING", false), Err(Error::NotConnected)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_handshake_failure() {
        // A listener that answers the primer with garbage
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buffer = [0u8; 1024];
            recv_frame(&mut stream, &mut buffer).await.unwrap();
            send_frame(&mut stream, b"exchange{base:2;prime:3;}", 1024)
                .await
                .unwrap();
            // Hold the connection open until the client gives up
            let _ = recv_frame(&mut stream, &mut buffer).await;
        });

        let client = connect(Config::default(), address).await;
        let result = timeout(WAIT, client.wait_until_ready()).await.unwrap();
        assert!(matches!(result, Err(Error::HandshakeFailed)));
        assert_eq!(client.status(), Status::Failed);
        assert!(matches!(client.send("PING", false), Err(Error::NotConnected)));

        timeout(WAIT, server).await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_connect_refused() {
        // Reserve a port, then free it
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let result = Client::connect(Config::default(), "127.0.0.1", address.port()).await;
        assert!(matches!(result, Err(Error::Connect(a, _)) if a == address));
    }

    #[tokio::test]
    async fn test_resolve() {
        let address = resolve("127.0.0.1", 25).await.unwrap();
        assert_eq!(address, SocketAddr::from(([127, 0, 0, 1], 25)));
        assert!(resolve("localhost", 25).await.unwrap().ip().is_loopback());
        assert!(matches!(
            resolve("invalid host name", 25).await,
            Err(Error::Resolve(_))
        ));
    }
}
