// THEORY:
// The `cluster_layout` engine turns a flat list of coordinates facing one direction into
// independent composite regions, and decides where each tile lands on its canvas.
//
// Algorithm:
// 1.  **Seeding**: The smallest unvisited coordinate opens a new cluster. Picking by value
//     rather than by arrival makes the result independent of insertion order.
// 2.  **Proximity Walk**: The cluster grows one coordinate at a time, always taking the
//     remaining coordinate closest to any member (Chebyshev distance). Ties prefer the one
//     closest to the last appended member, then the smallest coordinate. This is a
//     deterministic single-linkage traversal, so a contiguous shape is never split just
//     because the walk head wandered into a dead end.
// 3.  **Closing**: When the nearest remaining coordinate is farther than the link distance,
//     the cluster closes and the next unvisited coordinate seeds a new one.
// 4.  **Layout**: Each cluster is projected onto the two axes spanning its direction's image
//     plane. Distinct values are ranked ascending and offset by `rank * tile_size`, so tiles
//     abut with no gaps and the layout does not change when the whole set is translated.

use crate::core_modules::geometry::{Coordinate, Direction};
use std::collections::BTreeMap;

/// Where one tile lands on its canvas, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileOffset {
    pub coordinate: Coordinate,
    pub left: u32,
    pub top: u32,
}

/// Pixel layout for one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterLayout {
    pub direction: Direction,
    pub width: u32,
    pub height: u32,
    /// Offsets in the cluster's traversal order.
    pub offsets: Vec<TileOffset>,
}

impl ClusterLayout {
    pub fn offset_of(&self, coordinate: &Coordinate) -> Option<&TileOffset> {
        self.offsets.iter().find(|o| o.coordinate == *coordinate)
    }

    /// Canvas size in tiles.
    pub fn grid_size(&self, tile_size: u32) -> (u32, u32) {
        (self.width / tile_size, self.height / tile_size)
    }
}

pub mod cluster_layout {
    use super::*;

    /// Partitions `coordinates` into spatially coherent clusters, each in traversal order.
    pub fn find_clusters(coordinates: &[Coordinate], link_distance: u32) -> Vec<Vec<Coordinate>> {
        let mut remaining: Vec<Coordinate> = coordinates.to_vec();
        remaining.sort();
        remaining.dedup();

        let mut clusters = Vec::new();
        while !remaining.is_empty() {
            // --- 1. Seeding ---
            // `remaining` stays sorted, so the head is the smallest unvisited coordinate.
            let seed = remaining.remove(0);
            let mut cluster = vec![seed];
            // Distance from each remaining coordinate to its closest cluster member.
            let mut reach: Vec<u32> = remaining
                .iter()
                .map(|c| c.chebyshev_distance(&seed))
                .collect();

            // --- 2. Proximity Walk ---
            loop {
                let Some(next) = nearest(&remaining, &reach, cluster[cluster.len() - 1]) else {
                    break;
                };
                // --- 3. Closing ---
                if reach[next] > link_distance {
                    break;
                }

                let picked = remaining.remove(next);
                reach.remove(next);
                for (candidate, best) in remaining.iter().zip(reach.iter_mut()) {
                    *best = (*best).min(candidate.chebyshev_distance(&picked));
                }
                cluster.push(picked);
            }

            clusters.push(cluster);
        }

        clusters
    }

    fn nearest(remaining: &[Coordinate], reach: &[u32], last: Coordinate) -> Option<usize> {
        remaining
            .iter()
            .enumerate()
            .min_by_key(|(i, candidate)| (reach[*i], candidate.squared_distance(&last), **candidate))
            .map(|(i, _)| i)
    }

    /// Computes canvas size and per-tile pixel offsets for one cluster.
    pub fn build_layout(direction: Direction, cluster: &[Coordinate], tile_size: u32) -> ClusterLayout {
        let (width_axis, height_axis) = direction.layout_axes();

        let width_mapping = rank_offsets(cluster.iter().map(|c| c.along(width_axis)), tile_size);
        let height_mapping = rank_offsets(cluster.iter().map(|c| c.along(height_axis)), tile_size);

        let offsets = cluster
            .iter()
            .map(|coordinate| TileOffset {
                coordinate: *coordinate,
                left: width_mapping[&coordinate.along(width_axis)],
                top: height_mapping[&coordinate.along(height_axis)],
            })
            .collect();

        ClusterLayout {
            direction,
            width: width_mapping.len() as u32 * tile_size,
            height: height_mapping.len() as u32 * tile_size,
            offsets,
        }
    }

    /// Maps each distinct value to `rank * tile_size`, ranks ascending.
    fn rank_offsets(values: impl Iterator<Item = i32>, tile_size: u32) -> BTreeMap<i32, u32> {
        let mut mapping: BTreeMap<i32, u32> = values.map(|v| (v, 0)).collect();
        for (rank, offset) in mapping.values_mut().enumerate() {
            *offset = rank as u32 * tile_size;
        }
        mapping
    }
}

#[cfg(test)]
mod tests {
    use super::cluster_layout::*;
    use super::*;
    use std::collections::HashSet;

    fn c(x: i32, y: i32, z: i32) -> Coordinate {
        Coordinate::new(x, y, z)
    }

    #[test]
    fn square_on_xz_plane_lays_out_as_two_by_two() {
        let cluster = vec![c(0, 0, 0), c(1, 0, 0), c(0, 0, 1), c(1, 0, 1)];
        let layout = build_layout(Direction::Up, &cluster, 128);

        assert_eq!((layout.width, layout.height), (256, 256));
        assert_eq!(layout.grid_size(128), (2, 2));

        let pairs: HashSet<(u32, u32)> = layout.offsets.iter().map(|o| (o.left, o.top)).collect();
        assert_eq!(pairs.len(), 4);
        assert_eq!(
            pairs,
            HashSet::from([(0, 0), (128, 0), (0, 128), (128, 128)])
        );
        assert_eq!(layout.offset_of(&c(1, 0, 1)).map(|o| (o.left, o.top)), Some((128, 128)));

        assert_eq!(build_layout(Direction::Up, &cluster, 128), layout);
    }

    #[test]
    fn layout_is_translation_invariant() {
        let cluster = vec![c(0, 3, 0), c(1, 3, 0), c(1, 4, 0)];
        let moved: Vec<_> = cluster.iter().map(|p| c(p.x + 40, p.y - 9, p.z + 2)).collect();

        let a = build_layout(Direction::North, &cluster, 16);
        let b = build_layout(Direction::North, &moved, 16);
        let offsets = |l: &ClusterLayout| l.offsets.iter().map(|o| (o.left, o.top)).collect::<Vec<_>>();
        assert_eq!(offsets(&a), offsets(&b));
        assert_eq!((a.width, a.height), (32, 32));
    }

    #[test]
    fn east_facing_uses_z_for_width_and_y_for_height() {
        let cluster = vec![c(5, 0, 0), c(5, 0, 1), c(5, 0, 2)];
        let layout = build_layout(Direction::East, &cluster, 10);
        assert_eq!((layout.width, layout.height), (30, 10));
        assert_eq!(layout.offset_of(&c(5, 0, 2)).unwrap().left, 20);
    }

    #[test]
    fn separated_groups_become_independent_clusters() {
        let coordinates = vec![
            c(100, 0, 0),
            c(0, 0, 0),
            c(101, 0, 0),
            c(1, 0, 0),
        ];
        let clusters = find_clusters(&coordinates, 1);
        assert_eq!(clusters, vec![vec![c(0, 0, 0), c(1, 0, 0)], vec![c(100, 0, 0), c(101, 0, 0)]]);

        let first = build_layout(Direction::Up, &clusters[0], 8);
        let second = build_layout(Direction::Up, &clusters[1], 8);
        assert_eq!((first.width, first.height), (16, 8));
        assert_eq!((second.width, second.height), (16, 8));
        assert_eq!(second.offset_of(&c(100, 0, 0)).unwrap().left, 0);
    }

    #[test]
    fn traversal_is_independent_of_insertion_order() {
        let a = vec![c(0, 0, 0), c(2, 0, 0), c(1, 0, 0), c(1, 0, 1), c(0, 0, 1)];
        let mut b = a.clone();
        b.reverse();
        assert_eq!(find_clusters(&a, 1), find_clusters(&b, 1));
    }

    #[test]
    fn branching_shape_is_not_split_by_the_walk() {
        // The walk goes (0,0,0) -> (1,0,0) -> (1,0,1) -> (1,0,2), leaving (2,0,0) two steps
        // from the walk head but still adjacent to the cluster.
        let coordinates = vec![c(0, 0, 0), c(1, 0, 0), c(2, 0, 0), c(1, 0, 1), c(1, 0, 2)];
        let clusters = find_clusters(&coordinates, 1);
        assert_eq!(
            clusters,
            vec![vec![c(0, 0, 0), c(1, 0, 0), c(1, 0, 1), c(1, 0, 2), c(2, 0, 0)]]
        );
    }

    #[test]
    fn wider_link_distance_bridges_gaps() {
        let coordinates = vec![c(0, 0, 0), c(3, 0, 0)];
        assert_eq!(find_clusters(&coordinates, 1).len(), 2);
        assert_eq!(find_clusters(&coordinates, 3).len(), 1);
    }

    #[test]
    fn empty_input_has_no_clusters() {
        assert!(find_clusters(&[], 1).is_empty());
    }
}
