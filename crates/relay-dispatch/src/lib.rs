//! Thread-safe command dispatch queues.
//!
//! Mirrors `co::CommandQueue`/`lib::base::commandCache.cpp`: a blocking FIFO
//! per destination (per-object or the local node's own control queue), plus
//! a pending-command holding area for commands that arrive before their
//! destination object is attached.

mod error;
mod pending;
mod queue;

pub use error::DispatchError;
pub use pending::PendingCommands;
pub use queue::CommandQueue;
