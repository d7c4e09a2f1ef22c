//! Object registry and versioning (component F): the non-owning arena of
//! attached objects a `LocalNode` maintains, each object's bounded version
//! history, and the instance-data cache that accelerates later maps.
//!
//! Grounded in `co/object.{h,cpp}`, `co/objectVersion.{h,cpp}`, and
//! `co/localNode.cpp`'s `_instanceDataCache` field from `original_source/`.

mod change_manager;
mod error;
mod instance_cache;
mod object;
mod registry;
mod ring;

pub use change_manager::ChangeManager;
pub use error::ObjectError;
pub use instance_cache::InstanceCache;
pub use object::AttachedObject;
pub use registry::ObjectRegistry;
pub use ring::InstanceData;
