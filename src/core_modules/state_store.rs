// THEORY:
// The `TileStore` is the memory of an aggregation session. Observations arrive piecemeal
// and out of order, so the store keeps each fact in its own map and only ever mutates
// them together when an operation touches more than one:
//
// - `placements`:      (Direction, Coordinate) -> which tile sits there and how it is turned.
// - `buffers`:         TileId -> raw RGBA pixels, with a revision stamp per write.
// - `bindings`:        EntityId -> (Coordinate, Direction), to resolve deletions by entity.
// - `direction_index`: Direction -> coordinates contributing to that direction, insertion order.
// - `emissions`:       the dedup cache, invalidated here whenever a placement is removed.
//
// The store has no behavior beyond keeping these invariants:
// 1.  The direction index never lists a coordinate without a live placement under it.
// 2.  Removing a placement removes every binding that points at it.
// 3.  Rewriting a buffer with identical bytes changes nothing, not even its revision.

use crate::core_modules::emit_controller::EmissionCache;
use crate::core_modules::geometry::{Coordinate, Direction, EntityId, TileId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// What sits at one (coordinate, direction) slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub tile_id: TileId,
    /// Quarter turns, always in `0..4`.
    pub rotation: u8,
}

impl Placement {
    pub fn new(tile_id: TileId, rotation: i32) -> Self {
        Self {
            tile_id,
            rotation: rotation.rem_euclid(4) as u8,
        }
    }
}

/// A stored pixel payload and the revision it was written at.
#[derive(Debug, Clone)]
pub struct StoredBuffer {
    pub pixels: Arc<[u8]>,
    pub revision: u64,
}

#[derive(Debug, Default)]
pub struct TileStore {
    placements: HashMap<(Direction, Coordinate), Placement>,
    buffers: HashMap<TileId, StoredBuffer>,
    bindings: HashMap<EntityId, (Coordinate, Direction)>,
    direction_index: BTreeMap<Direction, Vec<Coordinate>>,
    emissions: EmissionCache,
    next_revision: u64,
}

impl TileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or overwrites a placement. Returns false if the slot already held the same
    /// tile with the same rotation.
    pub fn upsert_rotation(
        &mut self,
        direction: Direction,
        coordinate: Coordinate,
        tile_id: TileId,
        rotation: i32,
    ) -> bool {
        let placement = Placement::new(tile_id, rotation);
        let previous = self.placements.insert((direction, coordinate), placement);
        previous != Some(placement)
    }

    /// Stores a tile's pixels. Returns false if byte-identical pixels were already stored.
    pub fn upsert_buffer(&mut self, tile_id: TileId, pixels: Vec<u8>) -> bool {
        if let Some(existing) = self.buffers.get(&tile_id) {
            if *existing.pixels == *pixels {
                return false;
            }
        }
        self.next_revision += 1;
        self.buffers.insert(
            tile_id,
            StoredBuffer {
                pixels: pixels.into(),
                revision: self.next_revision,
            },
        );
        true
    }

    /// Records a tile placed by an entity. Returns true if the slot already held the same
    /// tile and rotation, in which case nothing material changed.
    pub fn upsert_position(
        &mut self,
        entity_id: EntityId,
        direction: Direction,
        coordinate: Coordinate,
        tile_id: TileId,
        rotation: i32,
    ) -> bool {
        self.bindings.insert(entity_id, (coordinate, direction));

        let placement = Placement::new(tile_id, rotation);
        let key = (direction, coordinate);
        let indexed = self.is_indexed(direction, &coordinate);
        if indexed && self.placements.get(&key) == Some(&placement) {
            return true;
        }

        self.placements.insert(key, placement);
        if !indexed {
            self.direction_index
                .entry(direction)
                .or_default()
                .push(coordinate);
        }
        false
    }

    /// Removes the placement at a slot. Returns false if there was none.
    pub fn remove_by_coordinate(&mut self, direction: Direction, coordinate: Coordinate) -> bool {
        if self.placements.remove(&(direction, coordinate)).is_none() {
            return false;
        }

        if let Some(coordinates) = self.direction_index.get_mut(&direction) {
            coordinates.retain(|c| *c != coordinate);
            if coordinates.is_empty() {
                self.direction_index.remove(&direction);
            }
        }
        self.bindings
            .retain(|_, bound| *bound != (coordinate, direction));
        self.emissions.invalidate(direction);
        true
    }

    /// Removes the placement an entity was bound to, returning the slot it occupied.
    pub fn remove_by_entity(&mut self, entity_id: EntityId) -> Option<(Coordinate, Direction)> {
        let (coordinate, direction) = *self.bindings.get(&entity_id)?;
        if self.remove_by_coordinate(direction, coordinate) {
            Some((coordinate, direction))
        } else {
            // Binding outlived its placement (e.g. overwritten by a different slot); drop it.
            self.bindings.remove(&entity_id);
            None
        }
    }

    pub fn placement(&self, direction: Direction, coordinate: &Coordinate) -> Option<&Placement> {
        self.placements.get(&(direction, *coordinate))
    }

    pub fn buffer(&self, tile_id: TileId) -> Option<&StoredBuffer> {
        self.buffers.get(&tile_id)
    }

    pub fn binding(&self, entity_id: EntityId) -> Option<(Coordinate, Direction)> {
        self.bindings.get(&entity_id).copied()
    }

    /// Coordinates contributing to `direction`, in insertion order.
    pub fn coordinates(&self, direction: Direction) -> &[Coordinate] {
        self.direction_index
            .get(&direction)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Directions with at least one indexed coordinate, in a stable order.
    pub fn directions(&self) -> impl Iterator<Item = Direction> + '_ {
        self.direction_index.keys().copied()
    }

    pub fn emissions(&self) -> &EmissionCache {
        &self.emissions
    }

    pub fn emissions_mut(&mut self) -> &mut EmissionCache {
        &mut self.emissions
    }

    pub fn placement_count(&self) -> usize {
        self.placements.len()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
            && self.buffers.is_empty()
            && self.bindings.is_empty()
            && self.direction_index.is_empty()
            && self.emissions.is_empty()
    }

    /// Full reset of all five structures.
    pub fn clear(&mut self) {
        self.placements.clear();
        self.buffers.clear();
        self.bindings.clear();
        self.direction_index.clear();
        self.emissions.clear();
    }

    fn is_indexed(&self, direction: Direction, coordinate: &Coordinate) -> bool {
        self.direction_index
            .get(&direction)
            .is_some_and(|coordinates| coordinates.contains(coordinate))
    }
}
