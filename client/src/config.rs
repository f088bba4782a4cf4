use parley_codec::{Document, Error};
use std::time::Duration;

/// Configuration for a [crate::Client].
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum time allowed to establish the connection.
    pub connect_timeout: Duration,

    /// Maximum time allowed to write a frame, after which the connection is closed.
    pub send_timeout: Duration,

    /// Largest application message, in bytes, including the line terminator.
    /// [crate::Client::send] rejects anything larger.
    pub buffer_size: usize,

    /// Whether to negotiate a session key and encrypt application messages.
    pub encryption: bool,

    /// Whether application messages are terminated with `\r\n`.
    pub add_carriage_return: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(5),
            buffer_size: 4_096,
            encryption: true,
            add_carriage_return: true,
        }
    }
}

impl Config {
    /// Reads `network.timeout` (milliseconds, used for both connecting and sending),
    /// `network.buffer_size`, `network.encryption` and `network.add_carriage_return`.
    pub fn from_document(doc: &Document) -> Result<Self, Error> {
        let timeout = doc.get_duration_ms("network.timeout")?;
        Ok(Self {
            connect_timeout: timeout,
            send_timeout: timeout,
            buffer_size: doc.get_usize("network.buffer_size")?,
            encryption: doc.get_bool("network.encryption")?,
            add_carriage_return: doc.get_bool("network.add_carriage_return")?,
        })
    }

    /// See [Config]
    pub const fn with_encryption(mut self, encryption: bool) -> Self {
        self.encryption = encryption;
        self
    }
    /// See [Config]
    pub const fn with_add_carriage_return(mut self, add_carriage_return: bool) -> Self {
        self.add_carriage_return = add_carriage_return;
        self
    }

    /// Line terminator appended to application messages.
    pub fn terminator(&self) -> &'static str {
        if self.add_carriage_return {
            "\r\n"
        } else {
            ""
        }
    }
}
