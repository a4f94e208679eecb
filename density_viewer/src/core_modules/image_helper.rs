use std::io::Cursor;
use std::path::Path;

use image::{ImageEncoder, RgbImage};

/// Side length of the white placeholder served when an image cannot be loaded.
pub const PLACEHOLDER_SIZE: u32 = 1000;

/// Re-encodes any readable image file as PNG bytes.
pub fn load_png(path: &Path) -> Result<Vec<u8>, image::error::ImageError> {
    let img = image::open(path)?.to_rgba8();
    let mut buffer = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(Cursor::new(&mut buffer));
    encoder.write_image(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgba8)?;
    Ok(buffer)
}

/// A white RGB square of `size`×`size`, PNG encoded.
pub fn blank_png(size: u32) -> Result<Vec<u8>, image::error::ImageError> {
    let img = RgbImage::from_pixel(size, size, image::Rgb([255, 255, 255]));
    let mut buffer = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(Cursor::new(&mut buffer));
    encoder.write_image(img.as_raw(), size, size, image::ExtendedColorType::Rgb8)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_png_decodes_to_white_square() {
        let bytes = blank_png(16).expect("Error encoding placeholder.");
        let img = image::load_from_memory(&bytes).unwrap().to_rgb8();

        assert_eq!(img.dimensions(), (16, 16));
        assert!(img.pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn load_png_round_trips_a_file() {
        let path = std::env::temp_dir().join(format!("dv_image_helper_{}.png", std::process::id()));
        let mut gradient = image::RgbaImage::new(8, 4);
        for (x, _, pixel) in gradient.enumerate_pixels_mut() {
            *pixel = image::Rgba([(x * 30) as u8, 0, 0, 255]);
        }
        gradient.save(&path).expect("Error Saving File.");

        let bytes = load_png(&path).expect("Error loading file.");
        std::fs::remove_file(&path).ok();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (8, 4));
        assert_eq!(decoded.get_pixel(3, 2).0, [90, 0, 0, 255]);
    }

    #[test]
    fn load_png_reports_missing_files() {
        assert!(load_png(Path::new("/definitely/not/here.png")).is_err());
    }
}
