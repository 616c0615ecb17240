// THEORY:
// Observations are the only input to an aggregation session. Each one describes a single
// partial fact: where a tile was placed, how it is turned, what its pixels are, or that a
// placement went away. They deserialize from a `kind`-tagged JSON shape, which is how the
// replay tool reads recorded event logs.
//
// Pixel payloads arrive in a transport-specific form. A `PixelExtractor` turns them into
// the raw RGBA bytes the store keeps, and rejects anything malformed before the store is
// touched.

use crate::core_modules::geometry::{Coordinate, Direction, EntityId, TileId};
use crate::core_modules::image_ops::CHANNELS;
use crate::error::MosaicError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    /// An entity placed `tile_id` at a slot.
    Placement {
        entity_id: EntityId,
        coordinate: Coordinate,
        direction: Direction,
        tile_id: TileId,
        #[serde(default)]
        rotation: i32,
    },
    /// The tile at a slot was (re)turned.
    Rotation {
        coordinate: Coordinate,
        direction: Direction,
        tile_id: TileId,
        rotation: i32,
    },
    /// Pixels for a tile, still in transport form.
    Buffer { tile_id: TileId, payload: Vec<u8> },
    RemoveEntity { entity_id: EntityId },
    RemoveTile {
        coordinate: Coordinate,
        direction: Direction,
    },
}

impl Observation {
    /// The direction this observation touches, when it names one.
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Observation::Placement { direction, .. }
            | Observation::Rotation { direction, .. }
            | Observation::RemoveTile { direction, .. } => Some(*direction),
            Observation::Buffer { .. } | Observation::RemoveEntity { .. } => None,
        }
    }
}

/// Turns a transport payload into `tile_size * tile_size` RGBA8 bytes.
pub trait PixelExtractor: Send + Sync + 'static {
    fn extract(&self, payload: &[u8], tile_size: u32) -> Result<Vec<u8>, MosaicError>;
}

/// Payload is already raw RGBA; only its length is checked.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawRgba;

impl PixelExtractor for RawRgba {
    fn extract(&self, payload: &[u8], tile_size: u32) -> Result<Vec<u8>, MosaicError> {
        let expected = pixel_count(tile_size) * CHANNELS;
        if payload.len() != expected {
            return Err(MosaicError::MalformedObservation(format!(
                "raw payload has {} bytes, expected {expected}",
                payload.len()
            )));
        }
        Ok(payload.to_vec())
    }
}

/// Payload holds one palette index per pixel.
#[derive(Debug, Clone)]
pub struct IndexedPalette {
    palette: Vec<[u8; CHANNELS]>,
}

impl IndexedPalette {
    pub fn new(palette: Vec<[u8; CHANNELS]>) -> Self {
        Self { palette }
    }
}

impl PixelExtractor for IndexedPalette {
    fn extract(&self, payload: &[u8], tile_size: u32) -> Result<Vec<u8>, MosaicError> {
        let expected = pixel_count(tile_size);
        if payload.len() != expected {
            return Err(MosaicError::MalformedObservation(format!(
                "indexed payload has {} pixels, expected {expected}",
                payload.len()
            )));
        }

        let mut pixels = Vec::with_capacity(expected * CHANNELS);
        for &index in payload {
            let color = self.palette.get(index as usize).ok_or_else(|| {
                MosaicError::MalformedObservation(format!(
                    "palette index {index} out of range (palette has {} colors)",
                    self.palette.len()
                ))
            })?;
            pixels.extend_from_slice(color);
        }
        Ok(pixels)
    }
}

fn pixel_count(tile_size: u32) -> usize {
    tile_size as usize * tile_size as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_tagged_observations() {
        let json = r#"{"kind":"placement","entity_id":4,"coordinate":{"x":1,"y":2,"z":3},"direction":"up","tile_id":9}"#;
        let observation: Observation = serde_json::from_str(json).unwrap();
        assert_eq!(
            observation,
            Observation::Placement {
                entity_id: EntityId(4),
                coordinate: Coordinate::new(1, 2, 3),
                direction: Direction::Up,
                tile_id: TileId(9),
                rotation: 0,
            }
        );
        assert_eq!(observation.direction(), Some(Direction::Up));

        let missing = r#"{"kind":"remove_tile","coordinate":{"x":1,"y":2,"z":3}}"#;
        assert!(serde_json::from_str::<Observation>(missing).is_err());
    }

    #[test]
    fn raw_rgba_checks_length() {
        assert_eq!(RawRgba.extract(&[7; 16], 2).unwrap(), vec![7; 16]);
        assert!(matches!(
            RawRgba.extract(&[7; 15], 2),
            Err(MosaicError::MalformedObservation(_))
        ));
    }

    #[test]
    fn indexed_palette_expands_to_rgba() {
        let extractor = IndexedPalette::new(vec![[0, 0, 0, 0], [10, 20, 30, 255]]);
        let pixels = extractor.extract(&[1, 0, 0, 1], 2).unwrap();
        assert_eq!(&pixels[..4], &[10, 20, 30, 255]);
        assert_eq!(&pixels[4..8], &[0, 0, 0, 0]);
        assert_eq!(pixels.len(), 16);

        assert!(extractor.extract(&[2, 0, 0, 0], 2).is_err());
        assert!(extractor.extract(&[0, 0, 0], 2).is_err());
    }
}
