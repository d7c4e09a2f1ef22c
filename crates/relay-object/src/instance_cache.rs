use std::{collections::HashMap, sync::Mutex};

use relay_proto::{ObjectId, Version};
use relay_timing::{Duration, Nanos};

use crate::ring::InstanceData;

struct CacheEntry {
    data: InstanceData,
    last_used: Nanos,
}

/// Per-id cache of instance data received unsolicited (pushed ahead of any
/// map request), keyed by `(object_id, version)`, used to accelerate a
/// later `map` that lands on a version this node already has in hand.
/// May be constructed disabled, in which case every operation is a no-op.
pub struct InstanceCache {
    entries: Mutex<HashMap<(ObjectId, Version), CacheEntry>>,
    enabled: bool,
}

impl InstanceCache {
    pub fn new(enabled: bool) -> Self {
        Self { entries: Mutex::new(HashMap::new()), enabled }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn insert(&self, id: ObjectId, version: Version, data: InstanceData) {
        if !self.enabled {
            return;
        }
        self.entries.lock().unwrap().insert((id, version), CacheEntry { data, last_used: Nanos::now() });
    }

    pub fn get(&self, id: ObjectId, version: Version) -> Option<InstanceData> {
        if !self.enabled {
            return None;
        }
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.get_mut(&(id, version))?;
        entry.last_used = Nanos::now();
        Some(entry.data.clone())
    }

    /// Evicts entries untouched for longer than `max_age`, returning the
    /// number evicted.
    pub fn expire_instance_data(&self, max_age: Duration) -> usize {
        let now = Nanos::now();
        let max_age = Nanos::from(max_age);
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_sub(entry.last_used) <= max_age);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_cache_never_retains_entries() {
        let cache = InstanceCache::disabled();
        let id = ObjectId::random();
        cache.insert(id, Version::FIRST, InstanceData::from(vec![1]));
        assert!(cache.get(id, Version::FIRST).is_none());
    }

    #[test]
    fn enabled_cache_round_trips_an_entry() {
        let cache = InstanceCache::new(true);
        let id = ObjectId::random();
        cache.insert(id, Version::FIRST, InstanceData::from(vec![9]));
        assert_eq!(cache.get(id, Version::FIRST).unwrap().as_ref(), &[9]);
    }
}
