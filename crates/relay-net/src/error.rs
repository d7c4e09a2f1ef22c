use thiserror::Error;

/// Errors surfaced at the `relay-net` boundary.
///
/// Per the propagation policy, all of these close the offending connection
/// only; none of them escalate to the local node.
#[derive(Debug, Error)]
pub enum ConnError {
    #[error("connect to {0} failed: {1}")]
    Connect(std::net::SocketAddr, std::io::Error),

    #[error("bind to {0} failed: {1}")]
    Bind(std::net::SocketAddr, std::io::Error),

    #[error("write timed out")]
    TimeoutWrite,

    #[error("read timed out")]
    TimeoutRead,

    #[error("peer reset the connection")]
    ConnectionReset,

    #[error("transport {0} is not supported by this implementation")]
    UnsupportedTransport(relay_proto::TransportKind),

    #[error("frame error: {0}")]
    Frame(#[from] relay_proto::FrameError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
