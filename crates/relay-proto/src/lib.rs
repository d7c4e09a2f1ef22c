//! Shared wire vocabulary for the runtime: opaque identifiers, object
//! versions, connection descriptions, and the length-prefixed command
//! frame format that every transport in `relay-net` speaks.

mod command;
mod conn_desc;
mod error;
mod frame;
mod ids;
mod version;

pub use command::{CommandKind, ControlCommand, ObjectCommand, OBJECT_COMMAND_BIT};
pub use conn_desc::{ConnectionDescription, TransportKind};
pub use error::FrameError;
pub use frame::{encode_frame, FrameHeader, ICommand, HEADER_SIZE};
pub use ids::{NodeId, ObjectId};
pub use version::Version;
