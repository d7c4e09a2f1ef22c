use std::time::Duration;

use thiserror::Error;

/// Error type for the operator CLI. Thin on purpose — it exists to attach a
/// couple of CLI-specific failure modes (bad hex ids, missing flag
/// combinations) to the errors bubbling up from `relay-node`/`relay-barrier`,
/// the same aggregation shape those crates use for their own boundaries.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Node(#[from] relay_node::NodeError),

    #[error(transparent)]
    Barrier(#[from] relay_barrier::BarrierError),

    #[error("{0} is not a valid 128-bit hex id")]
    BadId(String),

    #[error("--object-id and --master must be given together")]
    IncompleteSlaveArgs,

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}
