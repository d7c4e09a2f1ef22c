use std::{collections::VecDeque, sync::Arc};

use relay_proto::Version;

use crate::error::ObjectError;

/// Opaque serialized instance data — the application payload format is out
/// of scope here (§1 Non-goals), so this crate only ever moves bytes
/// around, never interprets them.
pub type InstanceData = Arc<[u8]>;

/// A master's bounded history of committed versions. Oldest entries are
/// evicted once `capacity` is exceeded, backing the `OLDEST` version
/// resolution rule and the instance cache's fallback path.
pub struct VersionRing {
    capacity: usize,
    entries: VecDeque<(Version, InstanceData)>,
}

impl VersionRing {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: VecDeque::new() }
    }

    /// The most recently committed version, or [`Version::NONE`] if nothing
    /// has been committed yet.
    pub fn head(&self) -> Version {
        self.entries.back().map(|(v, _)| *v).unwrap_or(Version::NONE)
    }

    /// The oldest version still retained, or [`Version::NONE`] if empty.
    pub fn oldest(&self) -> Version {
        self.entries.front().map(|(v, _)| *v).unwrap_or(Version::NONE)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, version: Version) -> Option<&InstanceData> {
        self.entries.iter().find(|(v, _)| *v == version).map(|(_, d)| d)
    }

    /// Appends a new committed version, evicting the oldest entry if the
    /// ring is full.
    pub fn push(&mut self, version: Version, data: InstanceData) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((version, data));
    }

    /// Resolves the version-resolution rules from §4.E that don't require
    /// blocking: `NONE` (no data applies), `OLDEST` (oldest retained
    /// version), a concrete version (exact if retained, else the oldest),
    /// and anything at-or-below head. A concrete version strictly above
    /// head is the one case this can't resolve — the caller must wait for
    /// `head` to advance (see [`crate::AttachedObject::sync_to`]).
    pub fn resolve(&self, requested: Version) -> Result<Option<(Version, InstanceData)>, ObjectError> {
        if requested == Version::NONE {
            return Ok(None);
        }
        if self.is_empty() {
            return Err(ObjectError::VersionUnavailable);
        }
        if requested == Version::OLDEST {
            let (v, d) = self.entries.front().expect("checked non-empty above");
            return Ok(Some((*v, d.clone())));
        }
        if requested == Version::HEAD || requested == Version::NEXT {
            let (v, d) = self.entries.back().expect("checked non-empty above");
            return Ok(Some((*v, d.clone())));
        }
        if let Some(data) = self.get(requested) {
            return Ok(Some((requested, data.clone())));
        }
        if requested.is_concrete() && requested <= self.head() {
            // Evicted: fall back to the oldest still-retained version.
            let (v, d) = self.entries.front().expect("checked non-empty above");
            return Ok(Some((*v, d.clone())));
        }
        Err(ObjectError::VersionUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(n: u8) -> InstanceData {
        Arc::from(vec![n])
    }

    #[test]
    fn ring_evicts_oldest_past_capacity() {
        let mut ring = VersionRing::new(2);
        ring.push(Version::concrete(1), data(1));
        ring.push(Version::concrete(2), data(2));
        ring.push(Version::concrete(3), data(3));
        assert_eq!(ring.oldest(), Version::concrete(2));
        assert_eq!(ring.head(), Version::concrete(3));
    }

    #[test]
    fn oldest_resolves_to_front() {
        let mut ring = VersionRing::new(4);
        ring.push(Version::concrete(1), data(1));
        ring.push(Version::concrete(2), data(2));
        let (v, _) = ring.resolve(Version::OLDEST).unwrap().unwrap();
        assert_eq!(v, Version::concrete(1));
    }

    #[test]
    fn evicted_concrete_version_falls_back_to_oldest() {
        let mut ring = VersionRing::new(1);
        ring.push(Version::concrete(1), data(1));
        ring.push(Version::concrete(2), data(2));
        let (v, _) = ring.resolve(Version::concrete(1)).unwrap().unwrap();
        assert_eq!(v, Version::concrete(2));
    }

    #[test]
    fn version_above_head_is_unavailable_without_blocking() {
        let mut ring = VersionRing::new(4);
        ring.push(Version::concrete(1), data(1));
        assert!(matches!(ring.resolve(Version::concrete(5)), Err(ObjectError::VersionUnavailable)));
    }
}
