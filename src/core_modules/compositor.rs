// THEORY:
// The `compositor` renders one emitted cluster. It works on an immutable job snapshot
// built by the session, so the live store can keep changing while a job is in flight.
//
// Steps:
// 1.  **Rotation Correction**: A tile's stored quarter turns are corrected for its
//     direction ("up" tiles are seen inverted and lose two quarter turns).
// 2.  **Fan-Out**: Every tile is rotated and PNG-encoded on the blocking pool, at most
//     `rotation_workers` at a time per job. Each job owns its permits, so a collaborator
//     that never returns stalls only its own cluster.
// 3.  **Fan-In**: All rotations are joined; the first failure fails the whole cluster.
// 4.  **Assembly**: A white canvas of the layout size is created and every tile is drawn
//     at its precomputed offset.

use crate::core_modules::cluster_layout::ClusterLayout;
use crate::core_modules::emit_controller::Signature;
use crate::core_modules::geometry::Direction;
use crate::core_modules::image_ops::{ImageOps, Overlay, WHITE};
use crate::core_modules::readiness::ReadyTile;
use crate::error::ImageOpError;
use futures::future::try_join_all;
use image::RgbaImage;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// A ready tile and where it goes on the canvas.
#[derive(Debug, Clone)]
pub struct PlacedTile {
    pub tile: ReadyTile,
    pub left: u32,
    pub top: u32,
}

/// Everything needed to render one cluster, detached from the live store.
#[derive(Debug, Clone)]
pub struct CompositionJob {
    pub direction: Direction,
    /// Session epoch the job was planned in.
    pub epoch: u64,
    pub pass: u64,
    pub signature: Signature,
    pub layout: ClusterLayout,
    pub tiles: Vec<PlacedTile>,
}

/// A finished composite image for one cluster.
#[derive(Debug, Clone)]
pub struct Composite {
    pub direction: Direction,
    pub image: RgbaImage,
    pub layout: ClusterLayout,
    pub signature: Signature,
}

/// Quarter turns to request from the image collaborator for a stored rotation.
pub fn corrected_quarter_turns(direction: Direction, rotation: u8) -> u8 {
    (rotation as i32 - direction.rotation_offset()).rem_euclid(4) as u8
}

#[derive(Clone)]
pub struct Compositor {
    ops: Arc<dyn ImageOps>,
    tile_size: u32,
    rotation_workers: usize,
}

impl Compositor {
    pub fn new(ops: Arc<dyn ImageOps>, tile_size: u32, rotation_workers: usize) -> Self {
        Self {
            ops,
            tile_size,
            rotation_workers: rotation_workers.max(1),
        }
    }

    pub async fn compose(&self, job: CompositionJob) -> Result<Composite, ImageOpError> {
        let direction = job.direction;
        let permits = Arc::new(Semaphore::new(self.rotation_workers));

        // --- 1 & 2. Rotation Correction and Fan-Out ---
        let rotations = job.tiles.iter().map(|placed| {
            let ops = Arc::clone(&self.ops);
            let permits = Arc::clone(&permits);
            let pixels = Arc::clone(&placed.tile.pixels);
            let degrees = 90 * corrected_quarter_turns(direction, placed.tile.rotation) as u32;
            let (left, top, tile_size) = (placed.left, placed.top, self.tile_size);

            async move {
                let permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| ImageOpError::Task(e.to_string()))?;
                let tile = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    let rotated = ops.rotate(&pixels, tile_size, degrees)?;
                    ops.encode(&rotated)
                })
                .await
                .map_err(|e| ImageOpError::Task(e.to_string()))??;
                Ok::<_, ImageOpError>(Overlay { left, top, tile })
            }
        });

        // --- 3. Fan-In ---
        let overlays = try_join_all(rotations).await?;

        // --- 4. Assembly ---
        let ops = Arc::clone(&self.ops);
        let (width, height) = (job.layout.width, job.layout.height);
        let image = tokio::task::spawn_blocking(move || {
            let canvas = ops.blank_canvas(width, height, WHITE)?;
            ops.composite(canvas, &overlays)
        })
        .await
        .map_err(|e| ImageOpError::Task(e.to_string()))??;

        log::debug!(
            "pass {}: composed {}x{} image for {} from {} tiles",
            job.pass,
            width,
            height,
            direction,
            job.tiles.len()
        );

        Ok(Composite {
            direction,
            image,
            layout: job.layout,
            signature: job.signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::cluster_layout::cluster_layout::build_layout;
    use crate::core_modules::geometry::{Coordinate, TileId};
    use crate::core_modules::image_ops::{EncodedTile, RasterOps};
    use image::Rgba;
    use std::sync::Mutex;

    /// Records every rotation request, then delegates to `RasterOps`.
    #[derive(Default)]
    struct RecordingOps {
        degrees: Mutex<Vec<u32>>,
        fail_rotation: bool,
    }

    impl ImageOps for RecordingOps {
        fn rotate(&self, raw: &[u8], size: u32, degrees: u32) -> Result<RgbaImage, ImageOpError> {
            self.degrees.lock().unwrap().push(degrees);
            if self.fail_rotation {
                return Err(ImageOpError::Task("rotation refused".into()));
            }
            RasterOps.rotate(raw, size, degrees)
        }

        fn encode(&self, image: &RgbaImage) -> Result<EncodedTile, ImageOpError> {
            RasterOps.encode(image)
        }

        fn blank_canvas(&self, width: u32, height: u32, background: Rgba<u8>) -> Result<RgbaImage, ImageOpError> {
            RasterOps.blank_canvas(width, height, background)
        }

        fn composite(&self, base: RgbaImage, overlays: &[Overlay]) -> Result<RgbaImage, ImageOpError> {
            RasterOps.composite(base, overlays)
        }
    }

    fn job(direction: Direction, rotations: &[u8]) -> CompositionJob {
        let coordinates: Vec<_> = (0..rotations.len() as i32).map(|x| Coordinate::new(x, 0, 0)).collect();
        let layout = build_layout(direction, &coordinates, 1);
        let tiles = layout
            .offsets
            .iter()
            .zip(rotations)
            .enumerate()
            .map(|(i, (offset, rotation))| PlacedTile {
                tile: ReadyTile {
                    coordinate: offset.coordinate,
                    tile_id: TileId(i as u64),
                    rotation: *rotation,
                    buffer_revision: 1,
                    pixels: Arc::from(vec![0u8, 0, 255, 255]),
                },
                left: offset.left,
                top: offset.top,
            })
            .collect();
        CompositionJob {
            direction,
            epoch: 0,
            pass: 1,
            signature: Signature(Vec::new()),
            layout,
            tiles,
        }
    }

    #[test]
    fn up_subtracts_two_quarter_turns() {
        for rotation in 0..4u8 {
            assert_eq!(
                corrected_quarter_turns(Direction::Up, rotation),
                (rotation + 2) % 4
            );
            assert_eq!(corrected_quarter_turns(Direction::North, rotation), rotation);
        }
    }

    #[tokio::test]
    async fn requests_corrected_rotation_from_collaborator() {
        let ops = Arc::new(RecordingOps::default());
        let compositor = Compositor::new(ops.clone(), 1, 2);

        compositor.compose(job(Direction::Up, &[0, 1, 3])).await.unwrap();
        let mut degrees = ops.degrees.lock().unwrap().clone();
        degrees.sort();
        assert_eq!(degrees, vec![90, 180, 270]);
    }

    #[tokio::test]
    async fn assembles_tiles_on_white_canvas() {
        let compositor = Compositor::new(Arc::new(RasterOps), 1, 1);
        let composite = compositor.compose(job(Direction::South, &[0, 0])).await.unwrap();

        assert_eq!(composite.direction, Direction::South);
        assert_eq!(composite.image.dimensions(), (2, 1));
        assert_eq!(composite.image.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(composite.image.get_pixel(1, 0), &Rgba([0, 0, 255, 255]));
    }

    #[tokio::test]
    async fn collaborator_failure_fails_the_cluster() {
        let ops = Arc::new(RecordingOps {
            fail_rotation: true,
            ..Default::default()
        });
        let compositor = Compositor::new(ops, 1, 4);
        let result = compositor.compose(job(Direction::Down, &[0, 1])).await;
        assert!(matches!(result, Err(ImageOpError::Task(_))));
    }
}
