//! Monochrome notification badge.
//!
//! The source is contained in a 96x96 black square, reduced to luminance,
//! contrast-stretched, flattened onto black and then used as both the
//! intensity and the alpha of a transparent canvas. Near-uniform results
//! are refused.

use image::imageops::FilterType;
use image::{DynamicImage, GrayAlphaImage, LumaA, RgbaImage};

use super::codec::encode_png;
use crate::domain::errors::ProxyError;

/// Badge edge length in pixels.
pub const BADGE_SIZE: u32 = 96;

/// Masks below this Shannon entropy (bits) are considered blank.
pub const MIN_BADGE_ENTROPY: f64 = 0.1;

const CONTRAST: f64 = 1.75;
const NORMALISE_LOWER: f64 = 0.01;
const NORMALISE_UPPER: f64 = 0.99;

/// Builds the badge PNG.
///
/// # Errors
/// Returns [`ProxyError::DegenerateBadge`] for near-blank masks.
pub fn render_badge(source: &RgbaImage) -> Result<Vec<u8>, ProxyError> {
    let (luma, alpha) = contain(source);
    let luma = normalise(&luma);

    let mask: Vec<u8> = luma
        .iter()
        .zip(&alpha)
        .map(|(&value, &alpha)| flatten(linear(value), alpha))
        .collect();

    let entropy = entropy(&mask);
    if entropy < MIN_BADGE_ENTROPY {
        return Err(ProxyError::DegenerateBadge { entropy });
    }

    let mut badge = GrayAlphaImage::new(BADGE_SIZE, BADGE_SIZE);
    for (pixel, &value) in badge.pixels_mut().zip(&mask) {
        // XOR onto a transparent black canvas keeps the mask in both bands.
        *pixel = LumaA([value, value]);
    }
    encode_png(&DynamicImage::ImageLumaA8(badge))
}

/// Scales the source to fit the square, enlarging if needed, centred on
/// opaque black. Returns per-pixel luminance and alpha.
fn contain(source: &RgbaImage) -> (Vec<u8>, Vec<u8>) {
    let (width, height) = source.dimensions();
    let size = f64::from(BADGE_SIZE);
    let scale = (size / f64::from(width.max(1))).min(size / f64::from(height.max(1)));
    let target_w = scaled(width, scale);
    let target_h = scaled(height, scale);
    let resized = if (target_w, target_h) == (width, height) {
        source.clone()
    } else {
        image::imageops::resize(source, target_w, target_h, FilterType::Lanczos3)
    };

    let offset_x = (BADGE_SIZE - target_w) / 2;
    let offset_y = (BADGE_SIZE - target_h) / 2;

    let capacity = (BADGE_SIZE * BADGE_SIZE) as usize;
    let mut luma = vec![0u8; capacity];
    let mut alpha = vec![u8::MAX; capacity];

    for (x, y, pixel) in resized.enumerate_pixels() {
        let index = ((y + offset_y) * BADGE_SIZE + x + offset_x) as usize;
        let [r, g, b, a] = pixel.0;
        luma[index] = luminance(r, g, b);
        alpha[index] = a;
    }
    (luma, alpha)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled(value: u32, scale: f64) -> u32 {
    ((f64::from(value) * scale).round() as u32).clamp(1, BADGE_SIZE)
}

/// Rec. 709 luma.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let value = 0.2126 * f64::from(r) + 0.7152 * f64::from(g) + 0.0722 * f64::from(b);
    value.round().clamp(0.0, 255.0) as u8
}

/// Stretches the 1st..99th percentile range to the full scale.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn normalise(values: &[u8]) -> Vec<u8> {
    let mut histogram = [0usize; 256];
    for &value in values {
        histogram[usize::from(value)] += 1;
    }

    let total = values.len() as f64;
    let percentile = |fraction: f64| -> u8 {
        let target = (total * fraction).ceil().max(1.0) as usize;
        let mut seen = 0;
        for (value, &count) in histogram.iter().enumerate() {
            seen += count;
            if seen >= target {
                return value as u8;
            }
        }
        u8::MAX
    };

    let lower = f64::from(percentile(NORMALISE_LOWER));
    let upper = f64::from(percentile(NORMALISE_UPPER));
    if upper <= lower {
        return values.to_vec();
    }

    values
        .iter()
        .map(|&value| {
            let stretched = (f64::from(value) - lower) * 255.0 / (upper - lower);
            stretched.round().clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// 1.75x contrast around mid-grey.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn linear(value: u8) -> u8 {
    let out = CONTRAST * f64::from(value) - (128.0 * CONTRAST) + 128.0;
    out.round().clamp(0.0, 255.0) as u8
}

/// Composites onto opaque black.
fn flatten(value: u8, alpha: u8) -> u8 {
    let out = (u16::from(value) * u16::from(alpha) + 127) / 255;
    u8::try_from(out).unwrap_or(u8::MAX)
}

/// Shannon entropy of the value histogram, in bits.
#[allow(clippy::cast_precision_loss)]
fn entropy(values: &[u8]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut histogram = [0usize; 256];
    for &value in values {
        histogram[usize::from(value)] += 1;
    }
    let total = values.len() as f64;
    histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}
