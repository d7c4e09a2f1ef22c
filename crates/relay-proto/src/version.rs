use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

/// A 128-bit object version: a monotonic `counter` for concrete versions,
/// plus a `tag` that is zero for concrete versions and non-zero for one of
/// the reserved sentinels (`NONE`, `OLDEST`, `NEXT`, `INVALID`, `HEAD`).
///
/// Sentinels compare greater than any concrete version, so `v < Version::HEAD`
/// always holds for a real, observed version.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    counter: u64,
    tag: u64,
}

impl Version {
    const TAG_NONE: u64 = 1;
    const TAG_OLDEST: u64 = 2;
    const TAG_NEXT: u64 = 3;
    const TAG_INVALID: u64 = 4;
    const TAG_HEAD: u64 = 5;

    /// `OBJECT_VERSION_NONE`: paired with `ObjectId::ZERO` to mean "no
    /// object".
    pub const NONE: Self = Self { counter: 0, tag: Self::TAG_NONE };
    /// The version assigned to a freshly registered (mastered) object.
    pub const FIRST: Self = Self::concrete(1);
    pub const OLDEST: Self = Self { counter: 0, tag: Self::TAG_OLDEST };
    pub const NEXT: Self = Self { counter: 0, tag: Self::TAG_NEXT };
    pub const INVALID: Self = Self { counter: 0, tag: Self::TAG_INVALID };
    pub const HEAD: Self = Self { counter: 0, tag: Self::TAG_HEAD };

    pub const fn concrete(counter: u64) -> Self {
        Self { counter, tag: 0 }
    }

    pub const fn is_concrete(self) -> bool {
        self.tag == 0
    }

    pub const fn is_sentinel(self) -> bool {
        self.tag != 0
    }

    /// `None` if this isn't a concrete version.
    pub const fn as_counter(self) -> Option<u64> {
        if self.is_concrete() { Some(self.counter) } else { None }
    }

    /// Panics (debug) / returns `self` unchanged (release, via
    /// `relay_utils::safe_panic!`-style contract at call sites) if called on
    /// a non-concrete version; callers only ever advance a master's own head.
    pub fn next(self) -> Self {
        debug_assert!(self.is_concrete(), "next() on a sentinel version");
        Self::concrete(self.counter.wrapping_add(1))
    }

    pub const fn to_le_parts(self) -> (u64, u64) {
        (self.counter, self.tag)
    }

    pub const fn from_le_parts(counter: u64, tag: u64) -> Self {
        Self { counter, tag }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_concrete(), other.is_concrete()) {
            (true, true) => self.counter.cmp(&other.counter),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.tag.cmp(&other.tag).then(self.counter.cmp(&other.counter)),
        }
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            0 => write!(f, "Version({})", self.counter),
            Self::TAG_NONE => write!(f, "Version::NONE"),
            Self::TAG_OLDEST => write!(f, "Version::OLDEST"),
            Self::TAG_NEXT => write!(f, "Version::NEXT"),
            Self::TAG_INVALID => write!(f, "Version::INVALID"),
            Self::TAG_HEAD => write!(f, "Version::HEAD"),
            other => write!(f, "Version(counter={}, tag={other})", self.counter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_outrank_any_concrete_version() {
        for v in [1u64, 2, 1000, u64::MAX] {
            assert!(Version::concrete(v) < Version::HEAD);
            assert!(Version::concrete(v) < Version::NEXT);
        }
    }

    #[test]
    fn concrete_versions_are_monotonic() {
        let v1 = Version::FIRST;
        let v2 = v1.next();
        let v3 = v2.next();
        assert!(v1 < v2 && v2 < v3);
    }

    #[test]
    fn le_parts_round_trip() {
        let v = Version::concrete(42);
        let (c, t) = v.to_le_parts();
        assert_eq!(Version::from_le_parts(c, t), v);
    }
}
