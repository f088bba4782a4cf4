//! Agree on a session key with a peer.
//!
//! The exchange is a Diffie-Hellman-style agreement over a prime field chosen
//! by the initiator:
//!
//! ```text
//! Initiator                              Listener
//!   initiate()  -- exchange{base;prime} -->
//!               <-- exchange{base;prime} --  (confirmation)
//!               -- exchange{key}         -->
//!               <-- exchange{key}         --
//!               -- end{status:"OK"}      -->
//! ```
//!
//! Both sides are driven by a [TransactionManager] fed one message at a time via
//! [TransactionManager::evaluate].
//!
//! # Example
//!
//! ```rust
//! use parley_stream::handshake::TransactionManager;
//!
//! let mut initiator = TransactionManager::initiator();
//! let mut listener = TransactionManager::listener();
//!
//! let primer = initiator.initiate().unwrap();
//! let confirmation = listener.evaluate(&primer).unwrap();
//! let initiator_key = initiator.evaluate(&confirmation).unwrap();
//! let listener_key = listener.evaluate(&initiator_key).unwrap();
//! let end = initiator.evaluate(&listener_key).unwrap();
//! assert!(listener.evaluate(&end).is_none());
//!
//! assert!(initiator.ready_to_apply());
//! initiator.apply();
//! assert_eq!(initiator.encryption_key(), listener.encryption_key());
//! ```

pub mod group;
mod manager;
pub use manager::{Role, Stage, TransactionManager};
mod message;
pub use message::{Kind, Message, Primer, STATUS_OK};
