use relay_proto::ConnectionDescription;
use relay_timing::Duration;
use serde::{Deserialize, Serialize};

/// Explicit, immutable runtime configuration for a [`crate::LocalNode`]
/// (Design Note 4: replaces the reference implementation's process-global
/// `Global` class with a single constructed-and-validated owner, threaded
/// through the node's constructor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// The application-defined peer-kind tag advertised during handshake.
    pub kind: u32,
    /// Addresses this node listens on when `listen()` is called.
    pub listen: Vec<ConnectionDescription>,
    /// Default timeout for blocking calls that don't specify their own
    /// (`IATTR_TIMEOUT_DEFAULT`).
    pub timeout_default: Duration,
    /// How long a peer may stay silent before it's considered dead and
    /// disconnected (`IATTR_KEEPALIVE_TIMEOUT`).
    pub keepalive_timeout: Duration,
    /// How often `ping_idle_nodes` is invoked by the command thread.
    pub keepalive_interval: Duration,
    /// Whether unsolicited instance data pushes populate the instance
    /// cache.
    pub instance_cache_enabled: bool,
    /// Entries untouched longer than this are evicted from the instance
    /// cache.
    pub instance_cache_max_age: Duration,
    /// Commands held on the pending list (unknown object id) older than
    /// this are discarded.
    pub pending_command_ttl: Duration,
    /// Poll timeout used by the receiver thread's event loop; bounds how
    /// promptly it notices a close/shutdown signal.
    pub receiver_poll_interval: Duration,
}

impl RuntimeConfig {
    pub fn new(listen: Vec<ConnectionDescription>) -> Self {
        Self {
            kind: 0,
            listen,
            timeout_default: Duration::from_millis(5_000),
            keepalive_timeout: Duration::from_millis(10_000),
            keepalive_interval: Duration::from_millis(2_000),
            instance_cache_enabled: true,
            instance_cache_max_age: Duration::from_millis(60_000),
            pending_command_ttl: Duration::from_millis(5_000),
            receiver_poll_interval: Duration::from_millis(20),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
