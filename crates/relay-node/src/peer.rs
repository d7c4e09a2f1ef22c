use relay_net::ConnectionHandle;
use relay_proto::{ConnectionDescription, NodeId};
use relay_timing::Instant;

/// A live peer connection, from handshake completion until disconnect.
pub struct Peer {
    pub id: NodeId,
    pub handle: ConnectionHandle,
    pub descriptions: Vec<ConnectionDescription>,
    pub last_seen: Instant,
}

impl Peer {
    pub fn new(id: NodeId, handle: ConnectionHandle, descriptions: Vec<ConnectionDescription>) -> Self {
        Self { id, handle, descriptions, last_seen: Instant::now() }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }
}
