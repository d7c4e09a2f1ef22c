use thiserror::Error;

#[derive(Debug, Error)]
pub enum BarrierError {
    #[error("barrier enter timed out")]
    TimeoutBarrier,

    #[error("no reachable master for this barrier")]
    NoMaster,

    #[error("failed to deliver barrier command: {0}")]
    Transport(String),
}
