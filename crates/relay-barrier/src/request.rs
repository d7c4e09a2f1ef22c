use relay_proto::NodeId;
use relay_timing::{Duration, Nanos};

/// One in-flight barrier round, keyed by version in the master's request
/// map.
pub struct Request {
    pub time: Nanos,
    pub timeout: Option<Duration>,
    pub incarnation: u32,
    pub nodes: Vec<NodeId>,
}

impl Request {
    pub fn new(incarnation: u32, timeout: Option<Duration>, time: Nanos) -> Self {
        Self { time, timeout, incarnation, nodes: Vec::new() }
    }
}
