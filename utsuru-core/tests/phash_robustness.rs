//! Robustness tests for the perceptual hash.
//!
//! Fingerprints of an image must stay within a small Hamming distance after
//! common transformations: re-encoding, resizing and brightness changes.

use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use utsuru_core::{Fingerprint, PerceptualHasher, UtsuruError};

/// Maximum acceptable Hamming distance for "the same picture".
const SIMILARITY_THRESHOLD: u32 = 10;

/// Gradient backdrop with a bright disk, a dark bar and a slow ripple, so
/// the low-frequency block carries structure in both directions.
fn create_test_image(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let (fx, fy) = (x as f32 / width as f32, y as f32 / height as f32);
        let mut v = 40.0 + 60.0 * fx + 30.0 * fy;
        v += 12.0 * (std::f32::consts::TAU * (1.5 * fx + 0.5 * fy)).sin();
        if (fx - 0.35).powi(2) + (fy - 0.4).powi(2) < 0.04 {
            v += 110.0;
        }
        if (0.6..0.8).contains(&fx) && (0.55..0.9).contains(&fy) {
            v -= 30.0;
        }
        let v = v.clamp(0.0, 255.0) as u8;
        Rgb([v, v.saturating_sub(20), v / 2])
    });
    DynamicImage::ImageRgb8(img)
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, format).expect("encoding failed");
    buffer.into_inner()
}

/// Re-encode an image as JPEG with the given quality (1-100).
fn compress_jpeg(img: &DynamicImage, quality: u8) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
    img.write_with_encoder(encoder).expect("JPEG encoding failed");
    buffer.into_inner()
}

fn brighten(img: &DynamicImage, delta: u8) -> DynamicImage {
    let mut rgb = img.to_rgb8();
    for pixel in rgb.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = channel.saturating_add(delta);
        }
    }
    DynamicImage::ImageRgb8(rgb)
}

fn resize_image(img: &DynamicImage, percentage: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    img.resize_exact(
        width * percentage / 100,
        height * percentage / 100,
        image::imageops::FilterType::Lanczos3,
    )
}

fn hash(img: &DynamicImage) -> Fingerprint {
    PerceptualHasher::new()
        .hash_image(img)
        .expect("hashing failed")
}

fn assert_similar(label: &str, a: Fingerprint, b: Fingerprint) {
    let distance = a.hamming_distance(b);
    println!("{} - Hamming distance: {}", label, distance);
    assert!(
        distance <= SIMILARITY_THRESHOLD,
        "{} should preserve similarity (distance: {}, threshold: {})",
        label,
        distance,
        SIMILARITY_THRESHOLD
    );
}

// ============================================================================
// Re-encoding
// ============================================================================

#[test]
fn test_jpeg_reencoding() {
    let original = create_test_image(256, 256);
    let base = hash(&original);
    let hasher = PerceptualHasher::new();

    for quality in [90, 70, 50] {
        let jpeg = compress_jpeg(&original, quality);
        let reencoded = hasher.hash_bytes(&jpeg).expect("JPEG should decode");
        assert_similar(&format!("JPEG {}% quality", quality), base, reencoded);
    }
}

#[test]
fn test_png_roundtrip_is_exact() {
    let original = create_test_image(200, 120);
    let png = encode(&original, ImageFormat::Png);

    let from_bytes = PerceptualHasher::new().hash_bytes(&png).unwrap();
    assert_eq!(from_bytes, hash(&original));
}

#[test]
fn test_gif_decodes_and_hashes() {
    let original = create_test_image(96, 96);
    let gif = encode(&DynamicImage::ImageRgba8(original.to_rgba8()), ImageFormat::Gif);

    assert!(PerceptualHasher::new().hash_bytes(&gif).is_ok());
}

// ============================================================================
// Geometry and colour
// ============================================================================

#[test]
fn test_resize() {
    let original = create_test_image(400, 300);
    let base = hash(&original);

    for percentage in [50, 75, 150] {
        let resized = resize_image(&original, percentage);
        assert_similar(&format!("Resize to {}%", percentage), base, hash(&resized));
    }
}

/// Trim `percentage`% of each dimension, split evenly between both edges.
fn crop_centre(img: &DynamicImage, percentage: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    let (dx, dy) = (width * percentage / 200, height * percentage / 200);
    img.crop_imm(dx, dy, width - 2 * dx, height - 2 * dy)
}

#[test]
fn test_minor_crop() {
    let original = create_test_image(400, 300);
    let base = hash(&original);

    for percentage in [2, 5, 10] {
        let cropped = crop_centre(&original, percentage);
        assert_similar(&format!("Crop {}%", percentage), base, hash(&cropped));
    }
}

#[test]
fn test_brightness_shift() {
    let original = create_test_image(256, 256);
    assert_similar("Brightness +10", hash(&original), hash(&brighten(&original, 10)));
}

#[test]
fn test_grayscale_conversion() {
    let original = create_test_image(256, 256);
    let gray = DynamicImage::ImageLuma8(original.to_luma8());
    assert_similar("Grayscale", hash(&original), hash(&gray));
}

#[test]
fn test_different_images_are_far_apart() {
    let original = create_test_image(256, 256);
    let flipped = original.fliph().flipv();

    let distance = hash(&original).hamming_distance(hash(&flipped));
    println!("Rotated 180 - Hamming distance: {}", distance);
    assert!(distance > SIMILARITY_THRESHOLD);
}

// ============================================================================
// Determinism and degenerate input
// ============================================================================

#[test]
fn test_hash_is_deterministic() {
    let bytes = encode(&create_test_image(180, 240), ImageFormat::Png);
    let hasher = PerceptualHasher::new();

    let first = hasher.hash_bytes(&bytes).unwrap();
    for _ in 0..5 {
        assert_eq!(hasher.hash_bytes(&bytes).unwrap(), first);
    }
}

#[test]
fn test_uniform_image_hashes_to_zero() {
    for value in [0u8, 77, 255] {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([value; 3])));
        assert_eq!(hash(&img), Fingerprint::from_u64(0));
    }
}

#[test]
fn test_single_pixel_image() {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([200, 10, 10])));
    assert_eq!(hash(&img), Fingerprint::from_u64(0));
}

#[test]
fn test_extreme_aspect_ratio() {
    let img = create_test_image(1, 500);
    assert!(PerceptualHasher::new().hash_image(&img).is_ok());
}

#[test]
fn test_zero_sized_image() {
    let err = PerceptualHasher::new()
        .hash_image(&DynamicImage::new_rgb8(0, 10))
        .unwrap_err();
    assert!(matches!(err, UtsuruError::EmptyImage));
    assert!(err.is_user_input());
}

#[test]
fn test_corrupt_bytes() {
    let hasher = PerceptualHasher::new();

    assert!(matches!(
        hasher.hash_bytes(&[]),
        Err(UtsuruError::EmptyImage)
    ));

    let mut png = encode(&create_test_image(64, 64), ImageFormat::Png);
    png.truncate(png.len() / 3);
    let err = hasher.hash_bytes(&png).unwrap_err();
    assert!(err.is_user_input(), "unexpected error: {}", err);
}
