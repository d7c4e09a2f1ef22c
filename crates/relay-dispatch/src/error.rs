use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("command queue closed")]
    Closed,
}
