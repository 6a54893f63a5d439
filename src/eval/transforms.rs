//! Pointwise and structural image transforms (spec §4.7).

use crate::error::ImseError;
use crate::eval::CancellationToken;
use crate::value::{MetadataValue, MonoImage};

pub fn invert(img: &MonoImage) -> MonoImage {
    let max = img.data.iter().copied().fold(f32::NEG_INFINITY, f32::max).max(0.0);
    let data: Vec<f32> = img.data.iter().map(|&v| max - v).collect();
    let mut out = MonoImage::new(img.width, img.height, data);
    out.metadata = img.metadata.clone();
    out
}

/// `asinh_stretch(bp, s)`: `asinh((v - bp) * s) / asinh(s)` rescaled into
/// the input's own dynamic range.
pub fn asinh_stretch(img: &MonoImage, bp: f64, s: f64) -> Result<MonoImage, ImseError> {
    if s <= 0.0 {
        return Err(ImseError::Type { function: "asinh_stretch".to_string(), param: "s".to_string(), expected: "positive stretch factor".to_string(), got: s.to_string() });
    }
    let norm = s.asinh();
    let data: Vec<f32> = img.data.iter().map(|&v| (((v as f64 - bp) * s).asinh() / norm) as f32).collect();
    let mut out = MonoImage::new(img.width, img.height, data);
    out.metadata = img.metadata.clone();
    Ok(out)
}

/// `linear_stretch([lo, hi])`: rescale `[lo, hi]` onto the image's own
/// min/max extent. Defaults to the image's observed `[min, max]` when no
/// bounds are given.
pub fn linear_stretch(img: &MonoImage, lo: Option<f64>, hi: Option<f64>) -> MonoImage {
    let observed_min = img.data.iter().copied().fold(f32::INFINITY, f32::min) as f64;
    let observed_max = img.data.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let lo = lo.unwrap_or(observed_min);
    let hi = hi.unwrap_or(observed_max);
    let span = if (hi - lo).abs() < f64::EPSILON { 1.0 } else { hi - lo };
    let data: Vec<f32> = img.data.iter().map(|&v| (((v as f64 - lo) / span) * (observed_max - observed_min) + observed_min) as f32).collect();
    let mut out = MonoImage::new(img.width, img.height, data);
    out.metadata = img.metadata.clone();
    out
}

/// `clahe([tileSize, bins,] clip)`: a simplified contrast-limited adaptive
/// histogram equalization over a tile grid.
pub fn clahe(img: &MonoImage, tile_size: usize, bins: usize, clip: f64, cancellation: &CancellationToken) -> Result<MonoImage, ImseError> {
    let tile_size = tile_size.max(1);
    let bins = bins.max(2);
    let (w, h) = (img.width, img.height);
    let mut out = vec![0f32; img.len()];

    let global_max = img.data.iter().copied().fold(f32::NEG_INFINITY, f32::max).max(1.0);

    for ty in (0..h).step_by(tile_size) {
        if cancellation.is_cancelled() {
            return Err(ImseError::Cancelled);
        }
        for tx in (0..w).step_by(tile_size) {
            let tw = tile_size.min(w - tx);
            let th = tile_size.min(h - ty);
            let mut hist = vec![0u32; bins];
            for y in ty..ty + th {
                for x in tx..tx + tw {
                    let v = img.data[y * w + x];
                    let bucket = (((v / global_max).clamp(0.0, 1.0)) * (bins - 1) as f32) as usize;
                    hist[bucket] += 1;
                }
            }
            let clip_limit = ((tw * th) as f64 * clip / bins as f64).max(1.0) as u32;
            let mut excess = 0u32;
            for count in hist.iter_mut() {
                if *count > clip_limit {
                    excess += *count - clip_limit;
                    *count = clip_limit;
                }
            }
            let redistribute = excess / bins as u32;
            for count in hist.iter_mut() {
                *count += redistribute;
            }
            let mut cdf = vec![0u32; bins];
            let mut running = 0u32;
            for (i, count) in hist.iter().enumerate() {
                running += count;
                cdf[i] = running;
            }
            let total = running.max(1) as f32;
            for y in ty..ty + th {
                for x in tx..tx + tw {
                    let v = img.data[y * w + x];
                    let bucket = (((v / global_max).clamp(0.0, 1.0)) * (bins - 1) as f32) as usize;
                    out[y * w + x] = (cdf[bucket] as f32 / total) * global_max;
                }
            }
        }
    }

    let mut result = MonoImage::new(w, h, out);
    result.metadata = img.metadata.clone();
    Ok(result)
}

/// `adjust_contrast(min0_255, max0_255)`: linear contrast stretch specified
/// in 0-255 terms regardless of the image's native float range.
pub fn adjust_contrast(img: &MonoImage, min0_255: f64, max0_255: f64) -> MonoImage {
    let observed_min = img.data.iter().copied().fold(f32::INFINITY, f32::min) as f64;
    let observed_max = img.data.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let native_span = if (observed_max - observed_min).abs() < f64::EPSILON { 1.0 } else { observed_max - observed_min };
    let lo = observed_min + (min0_255 / 255.0) * native_span;
    let hi = observed_min + (max0_255 / 255.0) * native_span;
    let span = if (hi - lo).abs() < f64::EPSILON { 1.0 } else { hi - lo };
    let data: Vec<f32> = img.data.iter().map(|&v| (((v as f64 - lo) / span) * native_span + observed_min) as f32).collect();
    let mut out = MonoImage::new(img.width, img.height, data);
    out.metadata = img.metadata.clone();
    out
}

fn ellipse_of(img: &MonoImage) -> Option<(f64, f64, f64, f64, f64)> {
    match img.ellipse() {
        Some(MetadataValue::Ellipse { cx, cy, semi_major, semi_minor, angle }) => Some((*cx, *cy, *semi_major, *semi_minor, *angle)),
        _ => None,
    }
}

/// `autocrop(img)`: crop to the square bounding the disk plus a small
/// margin. Requires a detected ellipse in the image's context metadata.
pub fn autocrop(img: &MonoImage) -> Result<MonoImage, ImseError> {
    let (cx, cy, semi_major, semi_minor, _angle) =
        ellipse_of(img).ok_or_else(|| ImseError::Context { function: "autocrop".to_string(), requires: "a detected solar-disk ellipse".to_string() })?;
    let radius = semi_major.max(semi_minor);
    let margin = radius * 0.05;
    let half = radius + margin;

    let x0 = (cx - half).max(0.0).floor() as usize;
    let y0 = (cy - half).max(0.0).floor() as usize;
    let x1 = ((cx + half).ceil() as usize).min(img.width);
    let y1 = ((cy + half).ceil() as usize).min(img.height);
    let new_w = x1.saturating_sub(x0).max(1);
    let new_h = y1.saturating_sub(y0).max(1);

    let mut data = Vec::with_capacity(new_w * new_h);
    for y in y0..y0 + new_h {
        for x in x0..x0 + new_w {
            let v = if y < img.height && x < img.width { img.data[y * img.width + x] } else { 0.0 };
            data.push(v);
        }
    }
    Ok(MonoImage::new(new_w, new_h, data))
}

/// `fix_banding(img, bandSize, passes)`: subtracts the per-band median
/// offset, repeated `passes` times, to remove horizontal sensor banding.
/// Uses the detected ellipse (if present) to exclude the solar disk itself
/// from the band-median estimate.
pub fn fix_banding(img: &MonoImage, band_size: usize, passes: usize, cancellation: &CancellationToken) -> Result<MonoImage, ImseError> {
    let band_size = band_size.max(1);
    let ellipse = ellipse_of(img);
    let mut data: Vec<f32> = (*img.data).clone();
    let (w, h) = (img.width, img.height);

    let inside_disk = |x: usize, y: usize| -> bool {
        match ellipse {
            Some((cx, cy, a, b, _angle)) if a > 0.0 && b > 0.0 => {
                let dx = (x as f64 - cx) / a;
                let dy = (y as f64 - cy) / b;
                dx * dx + dy * dy <= 1.0
            }
            _ => false,
        }
    };

    for _ in 0..passes.max(1) {
        for band_start in (0..h).step_by(band_size) {
            if cancellation.is_cancelled() {
                return Err(ImseError::Cancelled);
            }
            let band_end = (band_start + band_size).min(h);
            let mut samples = Vec::new();
            for y in band_start..band_end {
                for x in 0..w {
                    if !inside_disk(x, y) {
                        samples.push(data[y * w + x] as f64);
                    }
                }
            }
            if samples.is_empty() {
                continue;
            }
            samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let median = samples[samples.len() / 2];
            for y in band_start..band_end {
                for x in 0..w {
                    data[y * w + x] -= median as f32;
                }
            }
        }
    }

    let mut out = MonoImage::new(w, h, data);
    out.metadata = img.metadata.clone();
    Ok(out)
}

/// `remove_bg(img[, tolerance])`: subtracts an estimated radial background
/// outside the detected disk with a smoothed transition across the limb.
/// Requires a detected ellipse.
pub fn remove_bg(img: &MonoImage, tolerance: f64, cancellation: &CancellationToken) -> Result<MonoImage, ImseError> {
    let (cx, cy, a, b, _angle) =
        ellipse_of(img).ok_or_else(|| ImseError::Context { function: "remove_bg".to_string(), requires: "a detected solar-disk ellipse".to_string() })?;
    if a <= 0.0 || b <= 0.0 {
        return Err(ImseError::Context { function: "remove_bg".to_string(), requires: "a non-degenerate solar-disk ellipse".to_string() });
    }

    let (w, h) = (img.width, img.height);
    let mut background_samples = Vec::new();
    for y in 0..h {
        if cancellation.is_cancelled() {
            return Err(ImseError::Cancelled);
        }
        for x in 0..w {
            let dx = (x as f64 - cx) / a;
            let dy = (y as f64 - cy) / b;
            let r2 = dx * dx + dy * dy;
            if r2 > tolerance * tolerance {
                background_samples.push(img.data[y * w + x] as f64);
            }
        }
    }
    let background_level = if background_samples.is_empty() {
        0.0
    } else {
        background_samples.iter().sum::<f64>() / background_samples.len() as f64
    };

    let transition_width = 0.15_f64;
    let mut data = Vec::with_capacity(img.len());
    for y in 0..h {
        if cancellation.is_cancelled() {
            return Err(ImseError::Cancelled);
        }
        for x in 0..w {
            let dx = (x as f64 - cx) / a;
            let dy = (y as f64 - cy) / b;
            let r = (dx * dx + dy * dy).sqrt();
            let weight = smoothstep(tolerance - transition_width, tolerance + transition_width, r);
            let v = img.data[y * w + x] as f64 - weight * background_level;
            data.push(v as f32);
        }
    }
    let mut out = MonoImage::new(w, h, data);
    out.metadata = img.metadata.clone();
    Ok(out)
}

fn smoothstep(edge0: f64, edge1: f64, x: f64) -> f64 {
    if (edge1 - edge0).abs() < f64::EPSILON {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
