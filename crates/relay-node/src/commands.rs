use relay_proto::{ICommand, NodeId};

/// A decoded object-kind command paired with the peer it arrived from,
/// exactly what an application thread pulls off an object's
/// [`relay_dispatch::CommandQueue`] or [`relay_dispatch::PendingCommands`]
/// holding area.
pub struct QueuedCommand {
    pub from: NodeId,
    pub command: ICommand,
}
