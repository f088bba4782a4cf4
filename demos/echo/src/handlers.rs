//! Protocol handlers served by the demo.

use parley_server::{ConnectionId, Handler, HandlerError};

/// Sends back every message unchanged.
pub struct Echo;

impl Handler for Echo {
    fn handle_input(&self, _: ConnectionId, data: &str) -> Result<Option<String>, HandlerError> {
        Ok(Some(data.to_string()))
    }
}

/// Answers `PING` with `PONG`, rejecting anything else.
pub struct Ping;

impl Handler for Ping {
    fn handle_input(&self, _: ConnectionId, data: &str) -> Result<Option<String>, HandlerError> {
        match data.trim_end() {
            "PING" => Ok(Some("PONG\r\n".to_string())),
            other => Err(HandlerError::new(format!("unknown command: {other}"))),
        }
    }

    fn on_connection(&self, id: ConnectionId) -> Option<String> {
        Some(format!("HELLO {id}\r\n"))
    }
}
