//! Pure pixel metrics over sampled frames.
//!
//! Everything here is deterministic arithmetic on decoded images - the
//! quality contract evaluates pixels and structure, nothing semantic.

use image::{GrayImage, RgbImage};
use sha2::{Digest, Sha256};

/// Blank ratio: `1 - unique_gray_values / min(total_pixels, 256)`. A frame
/// above 0.90 is one flat color with noise.
pub fn blank_ratio(gray: &GrayImage) -> f64 {
    let total = (gray.width() * gray.height()) as usize;
    if total == 0 {
        return 1.0;
    }
    let mut seen = [false; 256];
    let mut unique = 0usize;
    for pixel in gray.pixels() {
        let value = pixel.0[0] as usize;
        if !seen[value] {
            seen[value] = true;
            unique += 1;
        }
    }
    1.0 - unique as f64 / total.min(256) as f64
}

/// Sharpness: variance of the Laplacian response.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }
    let at = |x: u32, y: u32| gray.get_pixel(x, y).0[0] as f64;

    let mut responses = Vec::with_capacity(((width - 2) * (height - 2)) as usize);
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let value =
                at(x, y - 1) + at(x, y + 1) + at(x - 1, y) + at(x + 1, y) - 4.0 * at(x, y);
            responses.push(value);
        }
    }
    variance(&responses)
}

/// Color distribution: the std-dev across the three per-channel
/// histogram-count std-devs.
pub fn color_distribution(rgb: &RgbImage) -> f64 {
    let mut histograms = [[0f64; 256]; 3];
    for pixel in rgb.pixels() {
        for channel in 0..3 {
            histograms[channel][pixel.0[channel] as usize] += 1.0;
        }
    }
    let channel_stds: Vec<f64> = histograms
        .iter()
        .map(|h| variance(h).sqrt())
        .collect();
    variance(&channel_stds).sqrt()
}

/// Global SSIM between two equally-sized grayscale frames.
pub fn ssim(a: &GrayImage, b: &GrayImage) -> f64 {
    if a.dimensions() != b.dimensions() {
        return 0.0;
    }
    let pa: Vec<f64> = a.pixels().map(|p| p.0[0] as f64).collect();
    let pb: Vec<f64> = b.pixels().map(|p| p.0[0] as f64).collect();
    let mean_a = mean(&pa);
    let mean_b = mean(&pb);
    let var_a = variance(&pa);
    let var_b = variance(&pb);
    let covariance = pa
        .iter()
        .zip(pb.iter())
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum::<f64>()
        / pa.len() as f64;

    const C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
    const C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

    ((2.0 * mean_a * mean_b + C1) * (2.0 * covariance + C2))
        / ((mean_a * mean_a + mean_b * mean_b + C1) * (var_a + var_b + C2))
}

/// Mean motion magnitude between two frames, in pixels: block matching on
/// 16x16 blocks with a small search radius.
pub fn motion_magnitude(a: &GrayImage, b: &GrayImage) -> f64 {
    const BLOCK: u32 = 16;
    const RADIUS: i32 = 4;

    if a.dimensions() != b.dimensions() {
        return 0.0;
    }
    let (width, height) = a.dimensions();
    if width < BLOCK || height < BLOCK {
        return 0.0;
    }

    let mut magnitudes = Vec::new();
    let mut by = 0;
    while by + BLOCK <= height {
        let mut bx = 0;
        while bx + BLOCK <= width {
            let mut best = (0i32, 0i32, f64::MAX);
            for dy in -RADIUS..=RADIUS {
                for dx in -RADIUS..=RADIUS {
                    let ox = bx as i32 + dx;
                    let oy = by as i32 + dy;
                    if ox < 0
                        || oy < 0
                        || ox as u32 + BLOCK > width
                        || oy as u32 + BLOCK > height
                    {
                        continue;
                    }
                    let sad = block_sad(a, b, bx, by, ox as u32, oy as u32, BLOCK);
                    if sad < best.2 {
                        best = (dx, dy, sad);
                    }
                }
            }
            let (dx, dy, _) = best;
            magnitudes.push(((dx * dx + dy * dy) as f64).sqrt());
            bx += BLOCK;
        }
        by += BLOCK;
    }
    mean(&magnitudes)
}

fn block_sad(
    a: &GrayImage,
    b: &GrayImage,
    ax: u32,
    ay: u32,
    bx: u32,
    by: u32,
    block: u32,
) -> f64 {
    let mut sum = 0.0;
    for y in 0..block {
        for x in 0..block {
            let pa = a.get_pixel(ax + x, ay + y).0[0] as f64;
            let pb = b.get_pixel(bx + x, by + y).0[0] as f64;
            sum += (pa - pb).abs();
        }
    }
    sum
}

/// Content hash of a frame, for distinct-frame counting.
pub fn frame_hash(gray: &GrayImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(gray.as_raw());
    format!("{:x}", hasher.finalize())
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn flat(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([value]))
    }

    fn noisy(width: u32, height: u32, seed: u64) -> GrayImage {
        // Deterministic pseudo-noise; no RNG needed.
        GrayImage::from_fn(width, height, |x, y| {
            let v = (x as u64)
                .wrapping_mul(31)
                .wrapping_add((y as u64).wrapping_mul(17))
                .wrapping_add(seed);
            Luma([(v % 251) as u8])
        })
    }

    #[test]
    fn test_blank_detection() {
        assert!(blank_ratio(&flat(64, 64, 128)) > 0.99);
        assert!(blank_ratio(&noisy(64, 64, 0)) < 0.5);
    }

    #[test]
    fn test_sharpness_separates_flat_from_noise() {
        assert!(laplacian_variance(&flat(64, 64, 128)) < 1.0);
        assert!(laplacian_variance(&noisy(64, 64, 0)) > 100.0);
    }

    #[test]
    fn test_ssim_identity() {
        let frame = noisy(64, 64, 3);
        let score = ssim(&frame, &frame);
        assert!((score - 1.0).abs() < 1e-6);
        // A flat frame against noise is far from identical.
        assert!(ssim(&frame, &flat(64, 64, 128)) < 0.5);
    }

    #[test]
    fn test_motion_detects_shift() {
        let base = noisy(128, 128, 7);
        // Shift the content by two pixels.
        let shifted = GrayImage::from_fn(128, 128, |x, y| {
            let sx = x.saturating_sub(2).min(127);
            *base.get_pixel(sx, y)
        });
        assert!(motion_magnitude(&base, &shifted) > 0.5);
        assert!(motion_magnitude(&base, &base) < 0.01);
    }

    #[test]
    fn test_frame_hash_distinct() {
        assert_ne!(
            frame_hash(&noisy(32, 32, 1)),
            frame_hash(&noisy(32, 32, 2))
        );
        assert_eq!(frame_hash(&flat(32, 32, 0)), frame_hash(&flat(32, 32, 0)));
    }
}
