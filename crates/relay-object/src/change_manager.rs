/// Replication strategy for an attached object, collapsed from the
/// reference implementation's polymorphic change-manager hierarchy into a
/// tagged variant (Design Note 1): dispatch is a `match`, not a virtual
/// call, and each variant only carries the state its strategy needs.
#[derive(Debug, Clone)]
pub enum ChangeManager {
    /// Instance data never changes after registration; no ring is kept.
    Static,
    /// Every commit replaces the previous instance wholesale and only the
    /// latest version is retained — no history for slaves to map into.
    Unbuffered,
    /// Master keeps a bounded ring of full instance snapshots, one per
    /// committed version.
    DeltaFullMaster { ring_capacity: usize },
    /// Master keeps a bounded ring of incremental deltas; slaves apply them
    /// in order from whichever version they last synced.
    DeltaInstanceMaster { ring_capacity: usize },
    /// A slave-side replica: tracks only the version it last applied.
    VersionedSlave,
}

impl ChangeManager {
    /// The number of historical versions a master-side manager should keep
    /// before evicting the oldest. `Static`/`Unbuffered`/`VersionedSlave`
    /// have no history to speak of.
    pub fn ring_capacity(&self) -> usize {
        match self {
            ChangeManager::Static | ChangeManager::Unbuffered | ChangeManager::VersionedSlave => 1,
            ChangeManager::DeltaFullMaster { ring_capacity }
            | ChangeManager::DeltaInstanceMaster { ring_capacity } => (*ring_capacity).max(1),
        }
    }

    pub fn is_slave(&self) -> bool {
        matches!(self, ChangeManager::VersionedSlave)
    }
}
