use relay_proto::ObjectId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("object {0} is not known to this registry")]
    UnknownObject(ObjectId),

    #[error("object {0} is not attached (already unmapped/deregistered)")]
    NotAttached(ObjectId),

    #[error("object {0} is already registered")]
    DuplicateRegister(ObjectId),

    #[error("requested version is no longer available")]
    VersionUnavailable,

    #[error("map timed out waiting for version to become available")]
    TimeoutMap,
}
