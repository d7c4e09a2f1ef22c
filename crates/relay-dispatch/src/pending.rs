use std::sync::Mutex;

use relay_proto::ObjectId;
use relay_timing::{Duration, Instant};
use tracing::debug;

struct Entry<T> {
    object_id: ObjectId,
    arrived_at: Instant,
    item: T,
}

/// Holding area for commands whose destination object isn't attached yet.
///
/// A command lands here keyed by the object ID it targets; `take_ready`
/// drains everything queued for an object once it becomes attached (a
/// mapping event), and `expire` discards entries older than a configurable
/// TTL so an object that never attaches doesn't leak memory forever.
pub struct PendingCommands<T> {
    entries: Mutex<Vec<Entry<T>>>,
}

impl<T> Default for PendingCommands<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PendingCommands<T> {
    pub fn new() -> Self {
        Self { entries: Mutex::new(Vec::new()) }
    }

    pub fn hold(&self, object_id: ObjectId, item: T) {
        self.entries.lock().unwrap().push(Entry { object_id, arrived_at: Instant::now(), item });
    }

    /// Removes and returns every command held for `object_id`, in arrival
    /// order.
    pub fn take_ready(&self, object_id: ObjectId) -> Vec<T> {
        let mut entries = self.entries.lock().unwrap();
        let mut ready = Vec::new();
        let mut i = 0;
        while i < entries.len() {
            if entries[i].object_id == object_id {
                ready.push(entries.remove(i).item);
            } else {
                i += 1;
            }
        }
        ready
    }

    /// Drops entries older than `ttl`, returning how many were discarded.
    pub fn expire(&self, ttl: Duration) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| e.arrived_at.elapsed() < ttl);
        let dropped = before - entries.len();
        if dropped > 0 {
            debug!(dropped, "discarded pending commands past ttl");
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_ready_drains_only_matching_object() {
        let pending: PendingCommands<u32> = PendingCommands::new();
        let a = ObjectId::from_u128(1);
        let b = ObjectId::from_u128(2);
        pending.hold(a, 1);
        pending.hold(b, 2);
        pending.hold(a, 3);

        let ready = pending.take_ready(a);
        assert_eq!(ready, vec![1, 3]);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn expire_drops_old_entries() {
        let pending: PendingCommands<u32> = PendingCommands::new();
        pending.hold(ObjectId::from_u128(1), 1);
        std::thread::sleep(std::time::Duration::from_millis(5));
        let dropped = pending.expire(Duration::ZERO);
        assert_eq!(dropped, 1);
        assert!(pending.is_empty());
    }
}
