use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const MAX_WIDTH: u32 = 400;
pub const MAX_HEIGHT: u32 = 500;
pub const JPEG_QUALITY: u8 = 85;

// The storefront renders images on a dark card, so transparency is
// flattened onto near-black instead of the encoder's default.
const BACKGROUND: Rgb<u8> = Rgb([10, 10, 10]);
const SLUG_MAX_CHARS: usize = 80;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("decode failed: {0}")]
    Decode(#[source] image::ImageError),
    #[error("encode failed: {0}")]
    Encode(#[source] image::ImageError),
}

/// Decodes, flattens transparency, bounds the dimensions, and re-encodes
/// as JPEG. Errors here are per-item failures; the batch keeps going.
pub fn transform(data: &[u8]) -> Result<Vec<u8>, ImageError> {
    let decoded = image::load_from_memory(data).map_err(ImageError::Decode)?;
    let flat = flatten(decoded);
    let bounded = shrink_to_fit(flat, MAX_WIDTH, MAX_HEIGHT);
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(&bounded)
        .map_err(ImageError::Encode)?;
    Ok(out)
}

fn flatten(img: DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let mut flat = RgbImage::from_pixel(rgba.width(), rgba.height(), BACKGROUND);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = pixel[3] as u32;
        let blend =
            |fg: u8, bg: u8| (((fg as u32) * alpha + (bg as u32) * (255 - alpha)) / 255) as u8;
        flat.put_pixel(
            x,
            y,
            Rgb([
                blend(pixel[0], BACKGROUND[0]),
                blend(pixel[1], BACKGROUND[1]),
                blend(pixel[2], BACKGROUND[2]),
            ]),
        );
    }
    flat
}

/// Shrinks so neither dimension exceeds the bound, preserving aspect
/// ratio. Images already inside the bounds pass through untouched.
fn shrink_to_fit(img: RgbImage, max_width: u32, max_height: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    if width <= max_width && height <= max_height {
        return img;
    }
    let scale = (max_width as f64 / width as f64).min(max_height as f64 / height as f64);
    let new_width = (((width as f64) * scale).round() as u32).clamp(1, max_width);
    let new_height = (((height as f64) * scale).round() as u32).clamp(1, max_height);
    image::imageops::resize(&img, new_width, new_height, FilterType::Lanczos3)
}

/// Stable output filename for a group key: a readable slug plus a short
/// digest so keys that slugify identically still get distinct files.
pub fn image_filename(group_key: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for ch in group_key.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_matches('-');
    let slug: String = slug.chars().take(SLUG_MAX_CHARS).collect();
    let digest = Sha256::digest(group_key.as_bytes());
    format!(
        "{slug}-{:02x}{:02x}{:02x}.jpg",
        digest[0], digest[1], digest[2]
    )
}
