//! The polymorphic [`Connection`] abstraction and the manager that drives
//! its transports (TCP, in-process pipe, in-process event) through a single
//! poll loop, assembling complete [`relay_proto::ICommand`]s from raw bytes.

mod connection;
mod error;
mod event;
mod framing;
mod manager;
mod pipe;
mod tcp;

pub use connection::{Connection, ConnState};
pub use error::ConnError;
pub use event::{EventConnection, EventHandle};
pub use framing::{FrameChannel, ReadOutcome};
pub use manager::{ConnectionHandle, ConnectionManager, PollEvent};
pub use pipe::PipeConnection;
pub use tcp::TcpConnection;
