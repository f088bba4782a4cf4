//! Actors that serve the listening socket and each accepted connection.

pub mod connection;
pub mod listener;
