//! Screenshot capture post-processing.

use image::imageops::FilterType;
use image::ImageFormat;
use std::io::Cursor;
use tracing::debug;
use webpilot_core_types::Size;

/// A capture ready to send to the model.
#[derive(Clone, Debug)]
pub struct Capture {
    pub png: Vec<u8>,
    /// Pixel dimensions of `png`, when known.
    pub size: Option<Size>,
}

/// Downscale a PNG so its width is at most `max_width`, preserving
/// aspect ratio. Bytes that fail to decode pass through untouched, so
/// capture glitches degrade the model's view instead of failing the
/// step.
pub fn downscale(png: Vec<u8>, max_width: u32) -> Capture {
    let img = match image::load_from_memory(&png) {
        Ok(img) => img,
        Err(err) => {
            debug!(error = %err, "screenshot not decodable; passing through");
            return Capture { png, size: None };
        }
    };

    let (width, height) = (img.width(), img.height());
    if width <= max_width {
        return Capture {
            png,
            size: Some(Size::new(width, height)),
        };
    }

    let new_height = ((height as u64 * max_width as u64) / width as u64).max(1) as u32;
    let resized = img.resize_exact(max_width, new_height, FilterType::Triangle);
    let mut out = Cursor::new(Vec::new());
    match resized.write_to(&mut out, ImageFormat::Png) {
        Ok(()) => Capture {
            png: out.into_inner(),
            size: Some(Size::new(max_width, new_height)),
        },
        Err(err) => {
            debug!(error = %err, "re-encode failed; sending original capture");
            Capture {
                png,
                size: Some(Size::new(width, height)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn png_of(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn wide_captures_shrink_preserving_ratio() {
        let capture = downscale(png_of(2000, 1000), 1000);
        let size = capture.size.unwrap();
        assert_eq!(size.width, 1000);
        assert_eq!(size.height, 500);
        let decoded = image::load_from_memory(&capture.png).unwrap();
        assert_eq!(decoded.width(), 1000);
    }

    #[test]
    fn small_captures_pass_through() {
        let png = png_of(640, 480);
        let capture = downscale(png.clone(), 1024);
        assert_eq!(capture.png, png);
        assert_eq!(capture.size, Some(Size::new(640, 480)));
    }

    #[test]
    fn garbage_bytes_pass_through_unsized() {
        let capture = downscale(vec![0xde, 0xad], 1024);
        assert_eq!(capture.png, vec![0xde, 0xad]);
        assert!(capture.size.is_none());
    }
}
