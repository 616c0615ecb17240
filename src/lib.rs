// THEORY:
// This file is the main entry point for the `tile_mosaic` library crate.
//
// The crate rebuilds composite images from a stream of partial observations about small
// square tiles: where each tile sits in a 3D grid, which way it faces, how it is turned,
// and what its pixels are. Tiles facing the same direction are clustered into separate
// regions, laid out edge to edge and composed into one image per region.
//
// The public surface is the `MosaicPipeline` (an async actor reached through a
// `MosaicHandle`) together with the observation and event types. The layered internals in
// `core_modules` and the synchronous `AggregationSession` are public as well, so they can
// be driven directly without a runtime.

pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod session;

pub use core_modules::compositor::Composite;
pub use core_modules::geometry::{Coordinate, Direction, EntityId, TileId};
pub use core_modules::image_ops::{ImageOps, RasterOps};
pub use core_modules::observation::{IndexedPalette, Observation, PixelExtractor, RawRgba};
pub use error::{ImageOpError, MosaicError};
pub use pipeline::{MosaicConfig, MosaicEvent, MosaicHandle, MosaicPipeline};
pub use session::{AggregationSession, SessionStats, Trigger};
