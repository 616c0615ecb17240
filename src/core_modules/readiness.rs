// THEORY:
// The readiness gate is the all-or-nothing filter between layout and composition. A
// cluster is composed only when every one of its slots has a placement whose tile has
// pixels. A single missing buffer defers the whole cluster, so no visually incomplete
// composite ever leaves the pipeline; the next pass re-checks it.
//
// Gathering also snapshots everything composition needs (pixels are shared `Arc`s), so a
// composition job never reads the live store.

use crate::core_modules::emit_controller::{Signature, SignatureEntry};
use crate::core_modules::geometry::{Coordinate, Direction, TileId};
use crate::core_modules::state_store::TileStore;
use std::sync::Arc;

/// A snapshot of one slot, ready to be rotated and drawn.
#[derive(Debug, Clone)]
pub struct ReadyTile {
    pub coordinate: Coordinate,
    pub tile_id: TileId,
    pub rotation: u8,
    pub buffer_revision: u64,
    pub pixels: Arc<[u8]>,
}

/// A cluster whose every tile has image data.
#[derive(Debug, Clone)]
pub struct ReadyCluster {
    pub direction: Direction,
    pub tiles: Vec<ReadyTile>,
}

impl ReadyCluster {
    pub fn signature(&self) -> Signature {
        Signature(
            self.tiles
                .iter()
                .map(|tile| SignatureEntry {
                    coordinate: tile.coordinate,
                    tile_id: tile.tile_id,
                    rotation: tile.rotation,
                    buffer_revision: tile.buffer_revision,
                })
                .collect(),
        )
    }

    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.tiles.iter().map(|tile| tile.coordinate).collect()
    }
}

/// Returns the cluster's snapshot, or `None` if any slot lacks a placement or pixels.
pub fn gather(store: &TileStore, direction: Direction, cluster: &[Coordinate]) -> Option<ReadyCluster> {
    let mut tiles = Vec::with_capacity(cluster.len());
    for coordinate in cluster {
        let placement = store.placement(direction, coordinate)?;
        let buffer = store.buffer(placement.tile_id)?;
        tiles.push(ReadyTile {
            coordinate: *coordinate,
            tile_id: placement.tile_id,
            rotation: placement.rotation,
            buffer_revision: buffer.revision,
            pixels: Arc::clone(&buffer.pixels),
        });
    }
    Some(ReadyCluster { direction, tiles })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::geometry::EntityId;

    fn store_with_three_slots() -> (TileStore, Vec<Coordinate>) {
        let mut store = TileStore::new();
        let cluster: Vec<_> = (0..3).map(|x| Coordinate::new(x, 0, 0)).collect();
        for (i, coordinate) in cluster.iter().enumerate() {
            store.upsert_position(EntityId(i as u64), Direction::North, *coordinate, TileId(i as u64), 0);
        }
        (store, cluster)
    }

    #[test]
    fn one_missing_buffer_defers_the_whole_cluster() {
        let (mut store, cluster) = store_with_three_slots();
        store.upsert_buffer(TileId(0), vec![1; 4]);
        store.upsert_buffer(TileId(1), vec![2; 4]);
        assert!(gather(&store, Direction::North, &cluster).is_none());

        store.upsert_buffer(TileId(2), vec![3; 4]);
        let ready = gather(&store, Direction::North, &cluster).expect("all buffers present");
        assert_eq!(ready.tiles.len(), 3);
        assert_eq!(ready.coordinates(), cluster);
        assert_eq!(&*ready.tiles[2].pixels, &[3, 3, 3, 3]);
    }

    #[test]
    fn slot_without_placement_is_not_ready() {
        let (mut store, mut cluster) = store_with_three_slots();
        for id in 0..3 {
            store.upsert_buffer(TileId(id), vec![0; 4]);
        }
        cluster.push(Coordinate::new(9, 9, 9));
        assert!(gather(&store, Direction::North, &cluster).is_none());
    }

    #[test]
    fn signature_tracks_buffer_revisions() {
        let (mut store, cluster) = store_with_three_slots();
        for id in 0..3 {
            store.upsert_buffer(TileId(id), vec![0; 4]);
        }
        let before = gather(&store, Direction::North, &cluster).unwrap().signature();
        store.upsert_buffer(TileId(1), vec![5; 4]);
        let after = gather(&store, Direction::North, &cluster).unwrap().signature();
        assert_ne!(before, after);
        assert_eq!(before.len(), 3);
    }
}
