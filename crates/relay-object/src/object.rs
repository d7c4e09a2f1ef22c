use std::sync::{Condvar, Mutex};

use relay_proto::{NodeId, ObjectId, Version};
use relay_timing::Duration;
use tracing::trace;

use crate::{
    change_manager::ChangeManager,
    error::ObjectError,
    ring::{InstanceData, VersionRing},
};

/// One object attachment: the registry's non-owning entry for a replicated
/// object, whatever role (master or slave) this node plays for it.
pub struct AttachedObject {
    pub id: ObjectId,
    pub instance_id: u32,
    pub master_id: NodeId,
    change_manager: Mutex<ChangeManager>,
    ring: Mutex<VersionRing>,
    head_changed: Condvar,
}

impl AttachedObject {
    /// Registers a new master-owned object: assigns it [`Version::FIRST`]
    /// with empty instance data, per the §3 lifecycle summary.
    pub fn register(id: ObjectId, instance_id: u32, local_node_id: NodeId, change_manager: ChangeManager) -> Self {
        let capacity = change_manager.ring_capacity();
        let mut ring = VersionRing::new(capacity);
        ring.push(Version::FIRST, InstanceData::from(Vec::new()));
        Self {
            id,
            instance_id,
            master_id: local_node_id,
            change_manager: Mutex::new(change_manager),
            ring: Mutex::new(ring),
            head_changed: Condvar::new(),
        }
    }

    /// Attaches a slave-side replica bound to `master_id`, with no instance
    /// data applied yet — the caller still has to resolve a starting
    /// version via [`Self::sync_to`] or [`Self::resolve`].
    pub fn map(id: ObjectId, instance_id: u32, master_id: NodeId, change_manager: ChangeManager) -> Self {
        let capacity = change_manager.ring_capacity();
        Self {
            id,
            instance_id,
            master_id,
            change_manager: Mutex::new(change_manager),
            ring: Mutex::new(VersionRing::new(capacity)),
            head_changed: Condvar::new(),
        }
    }

    pub fn is_slave(&self) -> bool {
        self.change_manager.lock().unwrap().is_slave()
    }

    pub fn version(&self) -> Version {
        self.ring.lock().unwrap().head()
    }

    /// Advances the object's head version, storing `data` in the ring and
    /// waking anyone blocked in [`Self::sync_to`] on a version at or below
    /// the new head.
    pub fn commit(&self, data: InstanceData) -> Version {
        let mut ring = self.ring.lock().unwrap();
        let next = ring.head().next_or_first();
        ring.push(next, data);
        drop(ring);
        self.head_changed.notify_all();
        trace!(object_id = %self.id, version = ?next, "committed");
        next
    }

    /// Non-blocking version resolution (§4.E rules that don't require
    /// waiting for the head to advance).
    pub fn resolve(&self, requested: Version) -> Result<Option<(Version, InstanceData)>, ObjectError> {
        self.ring.lock().unwrap().resolve(requested)
    }

    /// Blocking resolution: if `requested` is a concrete version above the
    /// current head, waits for a master's `commit()` to reach it (up to
    /// `timeout`, or indefinitely).
    pub fn sync_to(
        &self,
        requested: Version,
        timeout: Option<Duration>,
    ) -> Result<Option<(Version, InstanceData)>, ObjectError> {
        if !requested.is_concrete() {
            return self.resolve(requested);
        }

        let mut ring = self.ring.lock().unwrap();
        if requested <= ring.head() || ring.is_empty() {
            return ring.resolve(requested);
        }

        match timeout {
            None => {
                while requested > ring.head() {
                    ring = self.head_changed.wait(ring).unwrap();
                }
            }
            Some(t) => {
                let deadline = std::time::Instant::now() + std::time::Duration::from(t);
                while requested > ring.head() {
                    let now = std::time::Instant::now();
                    if now >= deadline {
                        return Err(ObjectError::TimeoutMap);
                    }
                    let (guard, result) = self.head_changed.wait_timeout(ring, deadline - now).unwrap();
                    ring = guard;
                    if result.timed_out() && requested > ring.head() {
                        return Err(ObjectError::TimeoutMap);
                    }
                }
            }
        }
        ring.resolve(requested)
    }
}

trait VersionExt {
    fn next_or_first(self) -> Version;
}

impl VersionExt for Version {
    fn next_or_first(self) -> Version {
        if self == Version::NONE { Version::FIRST } else { self.next() }
    }
}
