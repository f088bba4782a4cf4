//! Utility functions for exchanging messages with peers.

pub mod codec;
