// THEORY:
// `ImageOps` is the seam to the primitive image operations the compositor relies on:
// quarter-turn rotation of a raw tile, PNG encoding, a blank canvas and alpha compositing.
// The compositor only talks to the trait, so tests can wrap or replace the collaborator
// and a failure stays scoped to the one cluster being composed.
//
// `RasterOps` is the default implementation on top of the `image` crate. Every method is
// synchronous and CPU bound; callers run them on the blocking pool.

use crate::error::ImageOpError;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, ImageFormat, Rgba, RgbaImage, imageops};

/// Bytes per pixel of every raw tile and canvas (RGBA8).
pub const CHANNELS: usize = 4;

/// Opaque white, the canvas background.
pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// A PNG-encoded tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedTile(pub Vec<u8>);

/// One encoded tile positioned on a canvas.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub left: u32,
    pub top: u32,
    pub tile: EncodedTile,
}

pub trait ImageOps: Send + Sync + 'static {
    /// Rotates a raw `size * size` RGBA tile clockwise by `degrees` (a multiple of 90).
    fn rotate(&self, raw: &[u8], size: u32, degrees: u32) -> Result<RgbaImage, ImageOpError>;

    fn encode(&self, image: &RgbaImage) -> Result<EncodedTile, ImageOpError>;

    fn blank_canvas(&self, width: u32, height: u32, background: Rgba<u8>) -> Result<RgbaImage, ImageOpError>;

    /// Draws every overlay onto `base` at its offset.
    fn composite(&self, base: RgbaImage, overlays: &[Overlay]) -> Result<RgbaImage, ImageOpError>;
}

/// `ImageOps` backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterOps;

impl ImageOps for RasterOps {
    fn rotate(&self, raw: &[u8], size: u32, degrees: u32) -> Result<RgbaImage, ImageOpError> {
        let expected = size as usize * size as usize * CHANNELS;
        if raw.len() != expected {
            return Err(ImageOpError::Dimensions {
                expected,
                actual: raw.len(),
            });
        }
        let tile = RgbaImage::from_raw(size, size, raw.to_vec()).ok_or(ImageOpError::Dimensions {
            expected,
            actual: raw.len(),
        })?;

        match degrees % 360 {
            0 => Ok(tile),
            90 => Ok(imageops::rotate90(&tile)),
            180 => Ok(imageops::rotate180(&tile)),
            270 => Ok(imageops::rotate270(&tile)),
            other => Err(ImageOpError::Rotation(other)),
        }
    }

    fn encode(&self, image: &RgbaImage) -> Result<EncodedTile, ImageOpError> {
        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes).write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )?;
        Ok(EncodedTile(bytes))
    }

    fn blank_canvas(&self, width: u32, height: u32, background: Rgba<u8>) -> Result<RgbaImage, ImageOpError> {
        Ok(RgbaImage::from_pixel(width, height, background))
    }

    fn composite(&self, mut base: RgbaImage, overlays: &[Overlay]) -> Result<RgbaImage, ImageOpError> {
        for overlay in overlays {
            let tile = image::load_from_memory_with_format(&overlay.tile.0, ImageFormat::Png)?.into_rgba8();
            imageops::overlay(&mut base, &tile, overlay.left as i64, overlay.top as i64);
        }
        Ok(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2x2 tile with a distinct red value per pixel: [0, 1; 2, 3] in row-major order.
    fn marked_tile() -> Vec<u8> {
        (0..4u8).flat_map(|i| [i, 0, 0, 255]).collect()
    }

    fn reds(image: &RgbaImage) -> Vec<u8> {
        image.pixels().map(|p| p.0[0]).collect()
    }

    #[test]
    fn rotate_quarter_turns_clockwise() {
        let ops = RasterOps;
        let raw = marked_tile();
        assert_eq!(reds(&ops.rotate(&raw, 2, 0).unwrap()), vec![0, 1, 2, 3]);
        assert_eq!(reds(&ops.rotate(&raw, 2, 90).unwrap()), vec![2, 0, 3, 1]);
        assert_eq!(reds(&ops.rotate(&raw, 2, 180).unwrap()), vec![3, 2, 1, 0]);
        assert_eq!(reds(&ops.rotate(&raw, 2, 270).unwrap()), vec![1, 3, 0, 2]);
    }

    #[test]
    fn rotate_rejects_bad_input() {
        let ops = RasterOps;
        assert!(matches!(
            ops.rotate(&[0; 3], 2, 0),
            Err(ImageOpError::Dimensions { expected: 16, actual: 3 })
        ));
        assert!(matches!(ops.rotate(&marked_tile(), 2, 45), Err(ImageOpError::Rotation(45))));
    }

    #[test]
    fn composite_places_tiles_on_white_canvas() {
        let ops = RasterOps;
        let red = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        let tile = ops.encode(&red).unwrap();
        let canvas = ops.blank_canvas(4, 2, WHITE).unwrap();

        let out = ops
            .composite(canvas, &[Overlay { left: 2, top: 0, tile }])
            .unwrap();

        assert_eq!(out.get_pixel(0, 0), &WHITE);
        assert_eq!(out.get_pixel(1, 1), &WHITE);
        assert_eq!(out.get_pixel(2, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(out.get_pixel(3, 1), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn composite_rejects_garbage_overlay() {
        let ops = RasterOps;
        let canvas = ops.blank_canvas(2, 2, WHITE).unwrap();
        let overlay = Overlay {
            left: 0,
            top: 0,
            tile: EncodedTile(vec![1, 2, 3]),
        };
        assert!(matches!(ops.composite(canvas, &[overlay]), Err(ImageOpError::Image(_))));
    }
}
