//! Serialize structured control messages and configuration as object text.
//!
//! # Overview
//!
//! Object text is a small, line-agnostic grammar of named objects holding
//! `name:value;` fields:
//!
//! ```text
//! exchange{base:263;prime:4294967291;}
//! end{status:"OK";}
//! network { timeout: 5000; encryption: true; }
//! ```
//!
//! The same grammar carries handshake control messages on the wire and the
//! settings consumed by the server and client engines.
//!
//! # Example
//!
//! ```
//! use parley_codec::{Document, Object};
//!
//! let packed = Object::new().with("key", 42i64).encode("exchange");
//! assert_eq!(packed, "exchange{key:42;}");
//!
//! let doc = Document::parse(&packed).unwrap();
//! assert_eq!(doc.get_int("exchange.key").unwrap(), 42);
//! ```

mod document;
mod error;
mod object;
mod parser;

pub use document::Document;
pub use error::Error;
pub use object::{Object, Value};
pub use parser::parse;
