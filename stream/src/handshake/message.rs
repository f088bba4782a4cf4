//! Control messages exchanged during the handshake.
//!
//! ```text
//! exchange{base:<generator>;prime:<modulus>;}   primer (and its confirmation)
//! exchange{key:<public value>;}                 public key
//! end{status:"OK";}                             acknowledgement
//! ```
//!
//! Classification is strict: a message is recognized only if it is a single
//! top-level object carrying exactly the fields of one of the shapes above.

use parley_codec::{parse, Object, Value};
use std::fmt;

const EXCHANGE: &str = "exchange";
const END: &str = "end";
const BASE: &str = "base";
const PRIME: &str = "prime";
const KEY: &str = "key";
const STATUS: &str = "status";

/// Status carried by a positive acknowledgement.
pub const STATUS_OK: &str = "OK";

/// Group parameters proposed by the initiator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Primer {
    pub base: u32,
    pub prime: u32,
}

/// The kind of a [Message], used to index the transition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Primer,
    PublicKey,
    End,
}

/// A parsed handshake message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Primer(Primer),
    PublicKey(u32),
    End(String),
}

fn integer(object: &Object, name: &str) -> Option<u32> {
    match object.field(name)? {
        Value::Integer(value) => u32::try_from(*value).ok(),
        _ => None,
    }
}

fn has_exactly(object: &Object, names: &[&str]) -> bool {
    object.object_names().next().is_none()
        && object.field_names().count() == names.len()
        && names.iter().all(|name| object.field(name).is_some())
}

impl Message {
    /// Parses a handshake message, returning `None` if it is not one.
    pub fn parse(text: &str) -> Option<Self> {
        let root = parse(text).ok()?;
        if root.field_names().next().is_some() {
            return None;
        }
        let mut names = root.object_names();
        let name = names.next()?;
        if names.next().is_some() {
            return None;
        }
        let object = root.object(name)?;

        match name {
            EXCHANGE if has_exactly(object, &[BASE, PRIME]) => Some(Self::Primer(Primer {
                base: integer(object, BASE)?,
                prime: integer(object, PRIME)?,
            })),
            EXCHANGE if has_exactly(object, &[KEY]) => Some(Self::PublicKey(integer(object, KEY)?)),
            END if has_exactly(object, &[STATUS]) => match object.field(STATUS)? {
                Value::Text(status) => Some(Self::End(status.clone())),
                _ => None,
            },
            _ => None,
        }
    }

    /// A positive acknowledgement.
    pub fn ok() -> Self {
        Self::End(STATUS_OK.to_string())
    }

    pub fn kind(&self) -> Kind {
        match self {
            Self::Primer(_) => Kind::Primer,
            Self::PublicKey(_) => Kind::PublicKey,
            Self::End(_) => Kind::End,
        }
    }

    /// Renders the message in its wire form.
    pub fn encode(&self) -> String {
        match self {
            Self::Primer(primer) => Object::new()
                .with(BASE, primer.base)
                .with(PRIME, primer.prime)
                .encode(EXCHANGE),
            Self::PublicKey(key) => Object::new().with(KEY, *key).encode(EXCHANGE),
            Self::End(status) => Object::new().with(STATUS, status.as_str()).encode(END),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
