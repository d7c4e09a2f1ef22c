use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use relay_proto::{NodeId, ObjectId};
use tracing::debug;

use crate::{change_manager::ChangeManager, error::ObjectError, object::AttachedObject};

/// The arena of object attachments a local node owns. Objects hold a
/// registry index rather than a direct back-reference to their node
/// (Design Note 2: breaks the node/object cycle that the reference
/// implementation ties with raw back-pointers).
pub struct ObjectRegistry {
    objects: RwLock<HashMap<ObjectId, Arc<AttachedObject>>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self { objects: RwLock::new(HashMap::new()) }
    }

    /// Registers a fresh master-owned object, assigning it a random id and
    /// [`relay_proto::Version::FIRST`].
    pub fn register(&self, local_node_id: NodeId, change_manager: ChangeManager) -> Arc<AttachedObject> {
        let id = ObjectId::random();
        let instance_id = 0;
        let attached = Arc::new(AttachedObject::register(id, instance_id, local_node_id, change_manager));
        self.objects.write().unwrap().insert(id, attached.clone());
        debug!(object_id = %id, "registered object");
        attached
    }

    /// Attaches a slave-side replica bound to an id already known to exist
    /// on `master_id`. This only installs the local attachment entry — the
    /// map-request/reply wire handshake that resolves a starting version
    /// happens before this is called (see `relay_node::LocalNode::map_object_sync`).
    pub fn map(
        &self,
        id: ObjectId,
        instance_id: u32,
        master_id: NodeId,
        change_manager: ChangeManager,
    ) -> Result<Arc<AttachedObject>, ObjectError> {
        let mut objects = self.objects.write().unwrap();
        if objects.contains_key(&id) {
            return Err(ObjectError::DuplicateRegister(id));
        }
        let attached = Arc::new(AttachedObject::map(id, instance_id, master_id, change_manager));
        objects.insert(id, attached.clone());
        debug!(object_id = %id, %master_id, "mapped object");
        Ok(attached)
    }

    pub fn get(&self, id: ObjectId) -> Result<Arc<AttachedObject>, ObjectError> {
        self.objects.read().unwrap().get(&id).cloned().ok_or(ObjectError::UnknownObject(id))
    }

    /// Removes a master-owned object's attachment (its local counterpart to
    /// `unmap`, since a master can't be "mapped away", only deregistered).
    pub fn deregister(&self, id: ObjectId) -> Result<(), ObjectError> {
        self.objects.write().unwrap().remove(&id).map(|_| ()).ok_or(ObjectError::NotAttached(id))
    }

    /// Removes a slave-side attachment.
    pub fn unmap(&self, id: ObjectId) -> Result<(), ObjectError> {
        self.objects.write().unwrap().remove(&id).map(|_| ()).ok_or(ObjectError::NotAttached(id))
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().unwrap().is_empty()
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use relay_proto::Version;

    use super::*;

    #[test]
    fn register_assigns_first_version() {
        let registry = ObjectRegistry::new();
        let local = NodeId::random();
        let obj = registry.register(local, ChangeManager::Unbuffered);
        assert_eq!(obj.version(), Version::FIRST);
        assert_eq!(obj.master_id, local);
    }

    #[test]
    fn mapping_a_duplicate_id_fails() {
        let registry = ObjectRegistry::new();
        let master = NodeId::random();
        let id = relay_proto::ObjectId::random();
        registry.map(id, 0, master, ChangeManager::VersionedSlave).unwrap();
        assert!(matches!(
            registry.map(id, 0, master, ChangeManager::VersionedSlave),
            Err(ObjectError::DuplicateRegister(_))
        ));
    }

    #[test]
    fn deregistering_an_unknown_object_fails() {
        let registry = ObjectRegistry::new();
        let id = relay_proto::ObjectId::random();
        assert!(matches!(registry.deregister(id), Err(ObjectError::NotAttached(_))));
    }
}
