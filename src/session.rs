// THEORY:
// The `AggregationSession` is the explicit, synchronous heart of the system. It owns the
// `TileStore` (and through it the dedup cache) and knows how to:
//
// 1.  **Apply** one observation: validate it, mutate the store, and report whether a
//     recomputation is needed (and whether a direction must be force-emitted).
// 2.  **Plan** one recomputation pass: cluster every direction, gate on readiness, dedup
//     against the emission cache and produce detached `CompositionJob`s.
// 3.  **Reset**: clear all state at once and start a new epoch, so results of jobs planned
//     before the reset can be recognised as stale.
//
// The session never sleeps or spawns. Timing and concurrency belong to the pipeline actor.

use crate::core_modules::cluster_layout::cluster_layout;
use crate::core_modules::compositor::{CompositionJob, PlacedTile};
use crate::core_modules::emit_controller::Signature;
use crate::core_modules::geometry::Direction;
use crate::core_modules::observation::{Observation, PixelExtractor};
use crate::core_modules::readiness;
use crate::core_modules::state_store::TileStore;
use crate::error::MosaicError;
use crate::pipeline::MosaicConfig;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// What the caller should do after applying an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Nothing material changed.
    NoOp,
    /// Schedule a recomputation, optionally forcing one direction to re-emit.
    Recompute { forced: Option<Direction> },
}

/// Running counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Recomputation passes run (each one runs the cluster engine).
    pub passes: u64,
    /// Clusters handed to the compositor.
    pub emitted: u64,
    /// Clusters held back by the readiness gate.
    pub deferred: u64,
    /// Ready clusters skipped as unchanged.
    pub deduped: u64,
    /// Observations that changed nothing.
    pub no_ops: u64,
    /// Compositions that failed in the image collaborator.
    pub failed: u64,
    /// Composition results dropped because the state moved on.
    pub discarded: u64,
    /// Composites delivered to the caller.
    pub delivered: u64,
}

pub struct AggregationSession {
    config: MosaicConfig,
    extractor: Arc<dyn PixelExtractor>,
    store: TileStore,
    epoch: u64,
    stats: SessionStats,
}

impl AggregationSession {
    pub fn new(config: MosaicConfig, extractor: Arc<dyn PixelExtractor>) -> Self {
        Self {
            config,
            extractor,
            store: TileStore::new(),
            epoch: 0,
            stats: SessionStats::default(),
        }
    }

    /// Applies one observation. Malformed input is rejected before any mutation.
    pub fn apply(&mut self, observation: Observation) -> Result<Trigger, MosaicError> {
        let trigger = match observation {
            Observation::Placement {
                entity_id,
                coordinate,
                direction,
                tile_id,
                rotation,
            } => {
                let already_present =
                    self.store
                        .upsert_position(entity_id, direction, coordinate, tile_id, rotation);
                if already_present {
                    Trigger::NoOp
                } else {
                    Trigger::Recompute { forced: None }
                }
            }
            Observation::Rotation {
                coordinate,
                direction,
                tile_id,
                rotation,
            } => {
                if self.store.upsert_rotation(direction, coordinate, tile_id, rotation) {
                    Trigger::Recompute { forced: None }
                } else {
                    Trigger::NoOp
                }
            }
            Observation::Buffer { tile_id, payload } => {
                let pixels = self.extractor.extract(&payload, self.config.tile_size)?;
                if self.store.upsert_buffer(tile_id, pixels) {
                    Trigger::Recompute { forced: None }
                } else {
                    Trigger::NoOp
                }
            }
            Observation::RemoveEntity { entity_id } => match self.store.remove_by_entity(entity_id) {
                Some((_, direction)) => Trigger::Recompute {
                    forced: Some(direction),
                },
                None => Trigger::NoOp,
            },
            Observation::RemoveTile {
                coordinate,
                direction,
            } => {
                if self.store.remove_by_coordinate(direction, coordinate) {
                    Trigger::Recompute {
                        forced: Some(direction),
                    }
                } else {
                    Trigger::NoOp
                }
            }
        };

        if trigger == Trigger::NoOp {
            self.stats.no_ops += 1;
        }
        Ok(trigger)
    }

    /// Runs one recomputation pass and returns the clusters that must be composed.
    pub fn plan_pass(&mut self, forced: &BTreeSet<Direction>) -> Vec<CompositionJob> {
        self.stats.passes += 1;
        let pass = self.stats.passes;
        let mut jobs = Vec::new();

        let directions: Vec<Direction> = self.store.directions().collect();
        for direction in directions {
            let clusters =
                cluster_layout::find_clusters(self.store.coordinates(direction), self.config.link_distance);
            let force = forced.contains(&direction);
            let mut confirmed: HashSet<Signature> = HashSet::new();

            for cluster in clusters {
                // --- Readiness Gate ---
                let Some(ready) = readiness::gather(&self.store, direction, &cluster) else {
                    self.stats.deferred += 1;
                    log::debug!(
                        "deferring {} cluster of {} tiles: missing image data",
                        direction,
                        cluster.len()
                    );
                    continue;
                };

                // --- Dedup ---
                let signature = ready.signature();
                let emit = self.store.emissions().should_emit(direction, &signature, force);
                confirmed.insert(signature.clone());
                if !emit {
                    self.stats.deduped += 1;
                    continue;
                }

                // --- Layout ---
                let layout = cluster_layout::build_layout(direction, &cluster, self.config.tile_size);
                let tiles = ready
                    .tiles
                    .into_iter()
                    .zip(layout.offsets.iter())
                    .map(|(tile, offset)| PlacedTile {
                        tile,
                        left: offset.left,
                        top: offset.top,
                    })
                    .collect();

                self.stats.emitted += 1;
                jobs.push(CompositionJob {
                    direction,
                    epoch: self.epoch,
                    pass,
                    signature,
                    layout,
                    tiles,
                });
            }

            self.store.emissions_mut().replace(direction, confirmed);
        }

        log::debug!("pass {} planned {} composition jobs", pass, jobs.len());
        jobs
    }

    /// Whether a finished job still describes the current state.
    pub fn is_current(&self, job_epoch: u64, direction: Direction, signature: &Signature) -> bool {
        job_epoch == self.epoch && self.store.emissions().contains(direction, signature)
    }

    /// Lets the next pass retry a cluster whose composition failed.
    pub fn forget_emission(&mut self, direction: Direction, signature: &Signature) {
        self.store.emissions_mut().forget(direction, signature);
    }

    /// Clears all state and starts a new epoch.
    pub fn reset(&mut self) {
        log::info!(
            "aggregation session reset (epoch {}): dropping {} placements, {} buffers, {} bindings",
            self.epoch + 1,
            self.store.placement_count(),
            self.store.buffer_count(),
            self.store.binding_count()
        );
        self.store.clear();
        self.epoch += 1;
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn store(&self) -> &TileStore {
        &self.store
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn stats_mut(&mut self) -> &mut SessionStats {
        &mut self.stats
    }
}
