//! Image normalization and face-region cropping.
//!
//! Pure transforms over in-memory bytes; the only I/O is decode/encode. The
//! face provider rejects images over a maximum dimension and below a minimum
//! pixel size, so both operations exist to keep uploads inside those limits.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::io::Cursor;

use crate::error::FaceError;
use crate::records::FaceBox;

/// Re-encode quality for downscaled and cropped images.
const JPEG_QUALITY: u8 = 90;

/// Smallest crop the provider will accept, per side.
const MIN_CROP_PX: u32 = 40;

/// Margin added around a face crop, as a fraction of the shorter image side.
pub const DEFAULT_CROP_MARGIN: f32 = 0.05;

/// Downscale an image so neither side exceeds `max_dimension`.
///
/// Images already within bounds are returned byte-identical: recompressing
/// them would only lose quality. Larger images are resized preserving aspect
/// ratio (longer side becomes `max_dimension`) and re-encoded as JPEG. Never
/// upscales.
pub fn normalize(bytes: Vec<u8>, max_dimension: u32) -> Result<Vec<u8>, FaceError> {
    let img = image::load_from_memory(&bytes).map_err(|e| FaceError::Decode(e.to_string()))?;

    let (width, height) = img.dimensions();
    if width <= max_dimension && height <= max_dimension {
        return Ok(bytes);
    }

    let resized = img.resize(max_dimension, max_dimension, FilterType::Triangle);
    log::debug!(
        "normalized image {}x{} -> {}x{}",
        width,
        height,
        resized.width(),
        resized.height()
    );
    encode_jpeg(&resized)
}

/// Crop a face region given a bounding box normalized to `[0,1]`.
///
/// The region is expanded by `margin_ratio` of the shorter image side, with
/// the margin capped at 20% of the box's own width/height per axis so a tiny
/// box is never more than doubled. The result is clamped to image bounds and
/// grown toward the image interior if it falls below the provider's 40x40
/// minimum.
pub fn crop_region(
    bytes: &[u8],
    region: &FaceBox,
    margin_ratio: f32,
) -> Result<Vec<u8>, FaceError> {
    if region.width <= 0.0 || region.height <= 0.0 {
        return Err(FaceError::InvalidRegion(format!(
            "non-positive box {}x{}",
            region.width, region.height
        )));
    }

    let img = image::load_from_memory(bytes).map_err(|e| FaceError::Decode(e.to_string()))?;
    let (width, height) = img.dimensions();
    let (w, h) = (width as f32, height as f32);

    let box_x = region.left * w;
    let box_y = region.top * h;
    let box_w = region.width * w;
    let box_h = region.height * h;

    let margin = margin_ratio * w.min(h);
    let margin_x = margin.min(0.2 * box_w);
    let margin_y = margin.min(0.2 * box_h);

    let x0 = (box_x - margin_x).max(0.0);
    let y0 = (box_y - margin_y).max(0.0);
    let x1 = (box_x + box_w + margin_x).min(w);
    let y1 = (box_y + box_h + margin_y).min(h);

    if x1 - x0 < 1.0 || y1 - y0 < 1.0 {
        return Err(FaceError::InvalidRegion(format!(
            "box ({:.3},{:.3} {:.3}x{:.3}) degenerate after clamping to {}x{}",
            region.left, region.top, region.width, region.height, width, height
        )));
    }

    let mut x = x0.floor() as u32;
    let mut y = y0.floor() as u32;
    let mut crop_w = (x1.ceil() as u32).min(width) - x;
    let mut crop_h = (y1.ceil() as u32).min(height) - y;

    // Grow undersized crops toward the interior; the image itself bounds us.
    let min_w = MIN_CROP_PX.min(width);
    let min_h = MIN_CROP_PX.min(height);
    if crop_w < min_w {
        x = x.min(width - min_w);
        crop_w = min_w;
    }
    if crop_h < min_h {
        y = y.min(height - min_h);
        crop_h = min_h;
    }

    let crop = img.crop_imm(x, y, crop_w, crop_h);
    encode_jpeg(&crop)
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, FaceError> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    img.write_with_encoder(encoder)
        .map_err(|e| FaceError::Decode(e.to_string()))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn test_image_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn dimensions_of(bytes: &[u8]) -> (u32, u32) {
        image::load_from_memory(bytes).unwrap().dimensions()
    }

    #[test]
    fn normalize_passes_small_images_through_unchanged() {
        let bytes = test_image_bytes(640, 480);
        let out = normalize(bytes.clone(), 2048).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn normalize_downscales_longer_side_to_max() {
        let bytes = test_image_bytes(400, 200);
        let out = normalize(bytes, 100).unwrap();
        let (w, h) = dimensions_of(&out);
        assert_eq!(w, 100);
        assert_eq!(h, 50);
    }

    #[test]
    fn normalize_rejects_garbage() {
        let err = normalize(vec![0xde, 0xad, 0xbe, 0xef], 2048).unwrap_err();
        assert!(matches!(err, FaceError::Decode(_)));
    }

    #[test]
    fn crop_stays_within_bounds_and_meets_minimum() {
        let bytes = test_image_bytes(200, 160);
        // A small box near the corner: margin and minimum growth must not
        // escape the image.
        let region = FaceBox {
            left: 0.9,
            top: 0.9,
            width: 0.05,
            height: 0.05,
        };
        let out = crop_region(&bytes, &region, DEFAULT_CROP_MARGIN).unwrap();
        let (w, h) = dimensions_of(&out);
        assert!(w >= 40 && h >= 40);
        assert!(w <= 200 && h <= 160);
    }

    #[test]
    fn crop_margin_never_doubles_a_tiny_box() {
        let bytes = test_image_bytes(1000, 1000);
        let region = FaceBox {
            left: 0.5,
            top: 0.5,
            width: 0.1,
            height: 0.1,
        };
        // margin base = 0.05 * 1000 = 50px, box is 100px: cap is 20px/side.
        let out = crop_region(&bytes, &region, DEFAULT_CROP_MARGIN).unwrap();
        let (w, h) = dimensions_of(&out);
        assert!(w <= 141, "width {} exceeds box plus capped margin", w);
        assert!(h <= 141, "height {} exceeds box plus capped margin", h);
    }

    #[test]
    fn crop_rejects_degenerate_boxes() {
        let bytes = test_image_bytes(100, 100);
        let region = FaceBox {
            left: 0.5,
            top: 0.5,
            width: 0.0,
            height: 0.2,
        };
        let err = crop_region(&bytes, &region, DEFAULT_CROP_MARGIN).unwrap_err();
        assert!(matches!(err, FaceError::InvalidRegion(_)));
    }

    #[test]
    fn crop_rejects_boxes_entirely_outside_image() {
        let bytes = test_image_bytes(100, 100);
        let region = FaceBox {
            left: 1.5,
            top: 1.5,
            width: 0.2,
            height: 0.2,
        };
        let err = crop_region(&bytes, &region, DEFAULT_CROP_MARGIN).unwrap_err();
        assert!(matches!(err, FaceError::InvalidRegion(_)));
    }
}
