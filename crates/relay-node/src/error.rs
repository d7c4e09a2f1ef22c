use relay_proto::{NodeId, ObjectId};
use thiserror::Error;

/// Top-level error type for `relay-node`'s public API. Aggregates every
/// lower crate's error via `#[from]` so callers see one error type
/// (mirroring how the reference workspace's `flux-communication::error`
/// centralizes per-concern errors instead of one giant enum, just one
/// level higher since this crate sits above the others in the stack).
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("connection error: {0}")]
    Conn(#[from] relay_net::ConnError),

    #[error("frame error: {0}")]
    Frame(#[from] relay_proto::FrameError),

    #[error("object error: {0}")]
    Object(#[from] relay_object::ObjectError),

    #[error("barrier error: {0}")]
    Barrier(#[from] relay_barrier::BarrierError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] relay_dispatch::DispatchError),

    #[error("malformed command payload: {0}")]
    Protocol(String),

    #[error("peer {0} is not known to this node")]
    UnknownPeer(NodeId),

    #[error("barrier {0} is not known to this node")]
    UnknownBarrier(ObjectId),

    #[error("connect to peer timed out")]
    TimeoutConnect,

    #[error("map of object {0} timed out waiting for the master's reply")]
    TimeoutMap,

    #[error("master denied mapping object {0}")]
    MapDenied(ObjectId),

    #[error("acquiring a send token timed out")]
    TimeoutSendToken,

    #[error("node is shutting down")]
    Closed,
}
