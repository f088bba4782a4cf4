//! Error types for codec operations

use thiserror::Error;

/// Error type for codec operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("unexpected token {0:?} at position {1}")]
    UnexpectedToken(String, usize), // token, position
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unterminated string starting at position {0}")]
    UnterminatedString(usize),
    #[error("unbalanced closing brace at position {0}")]
    UnbalancedBrace(usize),
    #[error("missing key: {0}")]
    Missing(String),
    #[error("invalid type for {0}: expected {1}")]
    InvalidType(String, &'static str), // key, expected
    #[error("unable to read {0}: {1}")]
    Io(String, #[source] std::io::Error), // path, cause
}
