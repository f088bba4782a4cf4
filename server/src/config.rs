use parley_codec::{Document, Error};
use std::time::Duration;

/// Configuration for a [crate::Server].
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum time allowed to write a frame to a peer, after which the connection is closed.
    pub send_timeout: Duration,

    /// Largest application message, in bytes. Transport frames are sized to carry a
    /// message of this size once framed, and larger responses are dropped.
    pub buffer_size: usize,

    /// Whether peers must complete a key exchange before exchanging application messages.
    pub encryption: bool,

    /// Maximum number of concurrent connections. Connections beyond this are refused.
    pub max_clients: usize,

    /// How long a single accept poll may block before the running flag is checked again.
    pub poll_timeout: Duration,

    /// Maximum time allowed for a peer to complete the key exchange.
    pub handshake_timeout: Duration,

    /// Whether multi-line responses are sent as one frame per line.
    pub split_responses: bool,

    /// Maximum time [crate::Server::stop] waits for the listener to exit before aborting it.
    pub stop_timeout: Duration,

    /// Capacity of each connection's inbound mailbox.
    pub mailbox_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(5),
            buffer_size: 4_096,
            encryption: true,
            max_clients: 64,
            poll_timeout: Duration::from_millis(50),
            handshake_timeout: Duration::from_secs(10),
            split_responses: false,
            stop_timeout: Duration::from_secs(5),
            mailbox_size: 64,
        }
    }
}

impl Config {
    /// Reads the `network.*` section of a configuration document.
    ///
    /// `network.timeout` (milliseconds), `network.buffer_size`, `network.encryption`,
    /// `network.max_clients` and `network.select_timeout` (microseconds) are required.
    /// `network.handshake_timeout` and `network.stop_timeout` (milliseconds) and
    /// `network.split_responses` fall back to [Config::default].
    pub fn from_document(doc: &Document) -> Result<Self, Error> {
        let defaults = Self::default();
        Ok(Self {
            send_timeout: doc.get_duration_ms("network.timeout")?,
            buffer_size: doc.get_usize("network.buffer_size")?,
            encryption: doc.get_bool("network.encryption")?,
            max_clients: doc.get_usize("network.max_clients")?,
            poll_timeout: Duration::from_micros(doc.get_u64("network.select_timeout")?),
            handshake_timeout: doc
                .optional("network.handshake_timeout", Document::get_duration_ms)?
                .unwrap_or(defaults.handshake_timeout),
            split_responses: doc
                .optional("network.split_responses", Document::get_bool)?
                .unwrap_or(defaults.split_responses),
            stop_timeout: doc
                .optional("network.stop_timeout", Document::get_duration_ms)?
                .unwrap_or(defaults.stop_timeout),
            mailbox_size: defaults.mailbox_size,
        })
    }

    /// See [Config]
    pub const fn with_encryption(mut self, encryption: bool) -> Self {
        self.encryption = encryption;
        self
    }
    /// See [Config]
    pub const fn with_max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients;
        self
    }
    /// See [Config]
    pub const fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }
    /// See [Config]
    pub const fn with_split_responses(mut self, split_responses: bool) -> Self {
        self.split_responses = split_responses;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = "
        network {
            timeout: 2500;
            buffer_size: 1024;
            encryption: true;
            max_clients: 8;
            select_timeout: 20000;
            add_carriage_return: true;
        }
    ";

    #[test]
    fn test_from_document() {
        let doc = Document::parse(CONFIG).unwrap();
        let cfg = Config::from_document(&doc).unwrap();
        assert_eq!(cfg.send_timeout, Duration::from_millis(2500));
        assert_eq!(cfg.buffer_size, 1024);
        assert!(cfg.encryption);
        assert_eq!(cfg.max_clients, 8);
        assert_eq!(cfg.poll_timeout, Duration::from_millis(20));

        // Optional keys fall back to defaults
        let defaults = Config::default();
        assert_eq!(cfg.handshake_timeout, defaults.handshake_timeout);
        assert_eq!(cfg.split_responses, defaults.split_responses);
        assert_eq!(cfg.stop_timeout, defaults.stop_timeout);
    }

    #[test]
    fn test_optional_keys() {
        let doc = Document::parse(
            "network { timeout: 1; buffer_size: 2; encryption: false; max_clients: 3;
             select_timeout: 4; handshake_timeout: 5; split_responses: true; stop_timeout: 6; }",
        )
        .unwrap();
        let cfg = Config::from_document(&doc).unwrap();
        assert_eq!(cfg.handshake_timeout, Duration::from_millis(5));
        assert!(cfg.split_responses);
        assert_eq!(cfg.stop_timeout, Duration::from_millis(6));
        assert_eq!(cfg.poll_timeout, Duration::from_micros(4));
    }

    #[test]
    fn test_missing_key() {
        let doc = Document::parse("network { timeout: 2500; }").unwrap();
        assert!(matches!(
            Config::from_document(&doc),
            Err(Error::Missing(key)) if key == "network.buffer_size"
        ));
    }

    #[test]
    fn test_mistyped_key() {
        let doc = Document::parse(
            "network { timeout: 1; buffer_size: 2; encryption: yes; max_clients: 3; select_timeout: 4; }",
        )
        .unwrap();
        assert!(matches!(
            Config::from_document(&doc),
            Err(Error::InvalidType(key, "bool")) if key == "network.encryption"
        ));
    }
}
