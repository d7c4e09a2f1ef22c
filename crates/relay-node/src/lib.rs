//! Peer-to-peer node runtime (component 4.E): connection handshake,
//! keep-alive, and command routing between attached objects, barriers, and
//! the wire.
//!
//! Grounded on `co/localNode.{h,cpp}` and `co/node.{h,cpp}`: a `LocalNode`
//! plays the role the reference implementation splits across `LocalNode`
//! (the process's own identity, owning the receiver/command threads) and
//! `Node` (a peer's proxy record) — here a single [`peer::Peer`] entry
//! stands in for the latter.

mod commands;
mod config;
mod error;
mod node;
mod peer;
mod wire;

pub use commands::QueuedCommand;
pub use config::RuntimeConfig;
pub use error::NodeError;
pub use node::{LocalNode, PushHandler, PushStream};
pub use peer::Peer;
