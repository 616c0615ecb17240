pub mod image_helper {
    use crate::core_modules::geometry::Direction;
    use image::codecs::png::PngEncoder;
    use image::{ImageEncoder, RgbaImage};
    use std::io::BufWriter;
    use std::path::{Path, PathBuf};

    /// Writes a composite to disk as PNG.
    pub fn save(path: &Path, image: &RgbaImage) -> Result<(), image::error::ImageError> {
        let output = BufWriter::new(std::fs::File::create(path)?);
        let encoder = PngEncoder::new(output);

        encoder.write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )?;

        Ok(())
    }

    /// `<dir>/<direction>_<index>.png`
    pub fn composite_path(dir: &Path, direction: Direction, index: usize) -> PathBuf {
        dir.join(format!("{direction}_{index}.png"))
    }
}
