//! DCT-based perceptual hash (pHash).
//!
//! # Algorithm
//!
//! 1. Convert the image to a floating point luminance grid.
//! 2. Downscale to 32x32 with a bilinear (triangle) filter.
//! 3. Apply a 2-D DCT-II; only the top-left 8x8 low-frequency block is
//!    ever computed.
//! 4. Threshold the 64 block coefficients against their median.
//! 5. Pack the bits MSB first in row-major scan order.
//!
//! The result is robust against JPEG re-encoding, brightness shifts and
//! resizing, which is what the similarity query relies on.

use std::f64::consts::PI;
use std::sync::OnceLock;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView};
use tracing::debug;

use super::Fingerprint;
use crate::decode::decode_image;
use crate::error::{Result, UtsuruError};

/// Side of the downscaled luminance grid.
pub const SAMPLE_SIZE: usize = 32;

/// Side of the retained low-frequency block.
pub const BLOCK_SIZE: usize = 8;

/// AC coefficients below this fraction of the DC term count as zero.
///
/// Resampling in `f32` leaves a few ulps of noise on flat images; real
/// content sits several orders of magnitude above this.
const FLAT_TOLERANCE: f64 = 1e-5;

/// `COSINES[k][n] = cos(pi / N * (n + 0.5) * k)` for the retained frequencies.
fn cosine_table() -> &'static [[f64; SAMPLE_SIZE]; BLOCK_SIZE] {
    static TABLE: OnceLock<[[f64; SAMPLE_SIZE]; BLOCK_SIZE]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [[0.0; SAMPLE_SIZE]; BLOCK_SIZE];
        for (k, row) in table.iter_mut().enumerate() {
            for (n, value) in row.iter_mut().enumerate() {
                *value = (PI / SAMPLE_SIZE as f64 * (n as f64 + 0.5) * k as f64).cos();
            }
        }
        table
    })
}

/// Stateless perceptual hasher.
///
/// Safe to share across threads; every call is a pure function of the
/// pixel content.
#[derive(Debug, Clone, Copy)]
pub struct PerceptualHasher {
    filter: FilterType,
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PerceptualHasher {
    pub fn new() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }

    /// Decode raw image bytes (JPEG, PNG or GIF) and fingerprint them.
    pub fn hash_bytes(&self, image_data: &[u8]) -> Result<Fingerprint> {
        let image = decode_image(image_data)?;
        self.hash_image(&image)
    }

    /// Fingerprint an already decoded image.
    pub fn hash_image(&self, image: &DynamicImage) -> Result<Fingerprint> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(UtsuruError::EmptyImage);
        }

        let grid = self.luminance_grid(image);
        let block = low_frequency_block(&grid);
        let fingerprint = threshold_block(&block);

        debug!(width, height, fingerprint = %fingerprint, "Computed perceptual hash");
        Ok(fingerprint)
    }

    fn luminance_grid(&self, image: &DynamicImage) -> Vec<f64> {
        let gray = image.to_luma32f();
        let small = imageops::resize(&gray, SAMPLE_SIZE as u32, SAMPLE_SIZE as u32, self.filter);
        small.pixels().map(|p| f64::from(p.0[0])).collect()
    }
}

/// Unnormalized DCT-II of a row-major `SAMPLE_SIZE` square grid, restricted
/// to the first `BLOCK_SIZE` frequencies on each axis.
///
/// Returns the block in row-major order (vertical frequency major).
fn low_frequency_block(grid: &[f64]) -> [f64; BLOCK_SIZE * BLOCK_SIZE] {
    let cos = cosine_table();

    // Horizontal pass: rows[y][v]
    let mut rows = [[0.0f64; BLOCK_SIZE]; SAMPLE_SIZE];
    for (y, out) in rows.iter_mut().enumerate() {
        let line = &grid[y * SAMPLE_SIZE..(y + 1) * SAMPLE_SIZE];
        for (v, coeff) in out.iter_mut().enumerate() {
            *coeff = line.iter().zip(cos[v].iter()).map(|(p, c)| p * c).sum();
        }
    }

    // Vertical pass
    let mut block = [0.0f64; BLOCK_SIZE * BLOCK_SIZE];
    for u in 0..BLOCK_SIZE {
        for v in 0..BLOCK_SIZE {
            block[u * BLOCK_SIZE + v] = rows
                .iter()
                .zip(cos[u].iter())
                .map(|(row, c)| row[v] * c)
                .sum();
        }
    }

    block
}

fn threshold_block(block: &[f64; BLOCK_SIZE * BLOCK_SIZE]) -> Fingerprint {
    let limit = FLAT_TOLERANCE * block[0].abs().max(1.0);
    let flat = block[1..].iter().all(|c| c.abs() <= limit);
    if flat {
        return Fingerprint::from_u64(0);
    }

    let mut sorted = *block;
    sorted.sort_by(f64::total_cmp);
    let median = sorted[sorted.len() / 2];

    let bits = block
        .iter()
        .enumerate()
        .filter(|(_, &c)| c > median)
        .fold(0u64, |acc, (i, _)| acc | (1u64 << (block.len() - 1 - i)));

    Fingerprint::from_u64(bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    /// Gradient backdrop with an off-centre disk and a bar, giving energy
    /// across the whole low-frequency block.
    fn scene(width: u32, height: u32) -> DynamicImage {
        let img = RgbImage::from_fn(width, height, |x, y| {
            let (fx, fy) = (x as f32 / width as f32, y as f32 / height as f32);
            let mut v = 40.0 + 60.0 * fx + 30.0 * fy;
            if (fx - 0.35).powi(2) + (fy - 0.4).powi(2) < 0.04 {
                v += 120.0;
            }
            if (0.6..0.8).contains(&fx) && (0.55..0.9).contains(&fy) {
                v -= 30.0;
            }
            let v = v.clamp(0.0, 255.0) as u8;
            Rgb([v, v.saturating_sub(20), v / 2])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_cosine_table_dc_row_is_one() {
        let table = cosine_table();
        assert!(table[0].iter().all(|&c| (c - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_hash_is_deterministic() {
        let hasher = PerceptualHasher::new();
        let img = scene(200, 150);
        let a = hasher.hash_image(&img).unwrap();
        let b = hasher.hash_image(&img).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let hasher = PerceptualHasher::new();
        let img = DynamicImage::new_rgb8(0, 0);
        assert!(matches!(
            hasher.hash_image(&img),
            Err(UtsuruError::EmptyImage)
        ));
    }

    #[test]
    fn test_single_pixel_image_hashes() {
        let hasher = PerceptualHasher::new();
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(1, 1, Luma([200])));
        assert_eq!(hasher.hash_image(&img).unwrap(), Fingerprint::from_u64(0));
    }

    #[test]
    fn test_uniform_image_yields_zero_fingerprint() {
        let hasher = PerceptualHasher::new();
        for value in [0u8, 17, 128, 255] {
            let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 48, Luma([value])));
            assert_eq!(hasher.hash_image(&img).unwrap(), Fingerprint::from_u64(0));
        }
    }

    #[test]
    fn test_about_half_the_bits_are_set() {
        let hasher = PerceptualHasher::new();
        let fp = hasher.hash_image(&scene(128, 128)).unwrap();
        let ones = fp.as_u64().count_ones();
        // Strictly greater than the upper median: at most 31 bits.
        assert!(ones <= 31, "too many bits set: {}", ones);
        assert!(ones > 0);
    }

    #[test]
    fn test_inverted_image_is_far_apart() {
        let hasher = PerceptualHasher::new();
        let original = scene(128, 128);
        let mut inverted = original.clone();
        inverted.invert();

        let a = hasher.hash_image(&original).unwrap();
        let b = hasher.hash_image(&inverted).unwrap();
        assert!(
            a.hamming_distance(b) > 32,
            "distance: {}",
            a.hamming_distance(b)
        );
    }

    #[test]
    fn test_hash_bytes_rejects_garbage() {
        let hasher = PerceptualHasher::new();
        let err = hasher.hash_bytes(b"definitely not an image").unwrap_err();
        assert!(matches!(err, UtsuruError::Decode(_)));
        assert!(err.is_user_input());
    }

    #[test]
    fn test_threshold_block_msb_first() {
        let mut block = [0.0f64; BLOCK_SIZE * BLOCK_SIZE];
        // Only coefficient 1 is above the (zero) median.
        block[1] = 5.0;
        let fp = threshold_block(&block);
        assert_eq!(fp.as_u64(), 1u64 << 62);
    }
}
