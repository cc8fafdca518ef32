use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a snapshot source attached to a [`SnapshotPublisher`].
    ///
    /// [`SnapshotPublisher`]: crate::snapshot::SnapshotPublisher
    pub struct SourceHandle;
}

/// Identifies a placed entity. Assigned in increasing order by the
/// simulation and never reused for the lifetime of a world.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct EntityId(pub u64);

impl EntityId {
    /// The id that follows this one, or `None` once the id space is spent.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(EntityId)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_ordering_is_numeric() {
        let mut ids = vec![EntityId(10), EntityId(2), EntityId(33)];
        ids.sort();
        assert_eq!(ids, vec![EntityId(2), EntityId(10), EntityId(33)]);
    }

    #[test]
    fn entity_id_next() {
        assert_eq!(EntityId(0).next(), Some(EntityId(1)));
        assert_eq!(EntityId(41).next().and_then(EntityId::next), Some(EntityId(43)));
        assert_eq!(EntityId(u64::MAX).next(), None);
    }

    #[test]
    fn ids_are_hashable() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(EntityId(1), "miner");
        map.insert(EntityId(2), "belt");
        assert_eq!(map[&EntityId(2)], "belt");
    }

    #[test]
    fn display_uses_hash_prefix() {
        assert_eq!(EntityId(7).to_string(), "#7");
    }
}
