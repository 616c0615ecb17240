// THEORY:
// The `emit_controller` decides whether a ready cluster is worth composing again.
// Composition is the expensive step, so a cluster whose content has not moved since the
// last pass must not be re-rendered.
//
// Each cluster is reduced to a `Signature`: the ordered list of everything that shows up
// in the final pixels (slot, tile, rotation and the revision of the stored buffer). The
// `EmissionCache` remembers, per direction, the signatures confirmed by the most recent
// pass. Signatures are tracked per cluster, so a direction hosting several separate
// regions does not flip-flop between them.

use crate::core_modules::geometry::{Coordinate, Direction, TileId};
use std::collections::{BTreeMap, HashSet};

/// One tile's contribution to a cluster signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignatureEntry {
    pub coordinate: Coordinate,
    pub tile_id: TileId,
    pub rotation: u8,
    pub buffer_revision: u64,
}

/// Content fingerprint of a ready cluster, in traversal order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(pub Vec<SignatureEntry>);

impl Signature {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Direction -> signatures confirmed by the last recomputation pass.
#[derive(Debug, Default)]
pub struct EmissionCache {
    entries: BTreeMap<Direction, HashSet<Signature>>,
}

impl EmissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the cluster must be composed.
    pub fn should_emit(&self, direction: Direction, signature: &Signature, forced: bool) -> bool {
        if forced {
            return true;
        }
        match self.entries.get(&direction) {
            None => true,
            Some(known) => !known.contains(signature),
        }
    }

    /// Replaces everything known for `direction` with the signatures of this pass.
    pub fn replace(&mut self, direction: Direction, signatures: HashSet<Signature>) {
        if signatures.is_empty() {
            self.entries.remove(&direction);
        } else {
            self.entries.insert(direction, signatures);
        }
    }

    pub fn contains(&self, direction: Direction, signature: &Signature) -> bool {
        self.entries
            .get(&direction)
            .is_some_and(|known| known.contains(signature))
    }

    /// Drops one signature, so the next pass composes that cluster again.
    pub fn forget(&mut self, direction: Direction, signature: &Signature) {
        if let Some(known) = self.entries.get_mut(&direction) {
            known.remove(signature);
            if known.is_empty() {
                self.entries.remove(&direction);
            }
        }
    }

    pub fn invalidate(&mut self, direction: Direction) {
        self.entries.remove(&direction);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature(tile: u64, revision: u64) -> Signature {
        Signature(vec![SignatureEntry {
            coordinate: Coordinate::new(0, 0, 0),
            tile_id: TileId(tile),
            rotation: 0,
            buffer_revision: revision,
        }])
    }

    #[test]
    fn first_signature_for_a_direction_is_emitted() {
        let cache = EmissionCache::new();
        assert!(cache.should_emit(Direction::North, &signature(1, 1), false));
    }

    #[test]
    fn known_signature_is_suppressed_unless_forced() {
        let mut cache = EmissionCache::new();
        let sig = signature(1, 1);
        cache.replace(Direction::North, HashSet::from([sig.clone()]));

        assert!(!cache.should_emit(Direction::North, &sig, false));
        assert!(cache.should_emit(Direction::North, &sig, true));
        assert!(cache.should_emit(Direction::North, &signature(1, 2), false));
        assert!(cache.should_emit(Direction::South, &sig, false));
    }

    #[test]
    fn sibling_clusters_do_not_evict_each_other() {
        let mut cache = EmissionCache::new();
        let a = signature(1, 1);
        let b = signature(2, 2);
        cache.replace(Direction::Up, HashSet::from([a.clone(), b.clone()]));

        assert!(!cache.should_emit(Direction::Up, &a, false));
        assert!(!cache.should_emit(Direction::Up, &b, false));
    }

    #[test]
    fn forget_and_invalidate() {
        let mut cache = EmissionCache::new();
        let a = signature(1, 1);
        cache.replace(Direction::Up, HashSet::from([a.clone()]));
        cache.forget(Direction::Up, &a);
        assert!(cache.should_emit(Direction::Up, &a, false));

        cache.replace(Direction::Up, HashSet::from([a.clone()]));
        cache.invalidate(Direction::Up);
        assert!(!cache.contains(Direction::Up, &a));
        assert!(cache.is_empty());
    }
}
