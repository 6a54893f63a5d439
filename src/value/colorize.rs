//! Colorization: deferred mono -> RGB conversion.
//!
//! `colorize(img, profileName)` and the six-calibration-point overload both
//! produce a `ColorizedImage` carrying a small tagged `ColorCurve` rather
//! than a closure, per spec §9, so the value stays cheap to copy, compare
//! for memoization purposes, and render into a debug dump.

use super::{MonoImage, RgbImage};
use crate::error::ImseError;
use std::collections::HashMap;

/// A single-channel linear calibration: maps `in_lo..in_hi` of the source
/// mono image onto `out_lo..out_hi` of one output channel, clamped at the
/// ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelCalibration {
    pub in_lo: f64,
    pub in_hi: f64,
    pub out_lo: f64,
    pub out_hi: f64,
}

impl ChannelCalibration {
    fn apply(&self, v: f64) -> f64 {
        if (self.in_hi - self.in_lo).abs() < f64::EPSILON {
            return self.out_lo;
        }
        let t = ((v - self.in_lo) / (self.in_hi - self.in_lo)).clamp(0.0, 1.0);
        self.out_lo + t * (self.out_hi - self.out_lo)
    }
}

/// A resolved color curve: three independent channel calibrations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorCurve {
    pub r: ChannelCalibration,
    pub g: ChannelCalibration,
    pub b: ChannelCalibration,
}

/// A named, pre-registered color curve (e.g. `"h-alpha"`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorProfile {
    pub curve: ColorCurve,
}

/// Resolves profile names to curves. Ships a small built-in table and
/// accepts context-supplied overrides, analogous to how the teacher's
/// `alias_expansion` resolves names through a layered lookup.
#[derive(Debug, Clone, Default)]
pub struct ColorProfileRegistry {
    overrides: HashMap<String, ColorProfile>,
}

impl ColorProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, name: impl Into<String>, profile: ColorProfile) -> Self {
        self.overrides.insert(name.into().to_lowercase(), profile);
        self
    }

    pub fn resolve(&self, name: &str) -> Option<ColorProfile> {
        let key = name.to_lowercase();
        if let Some(p) = self.overrides.get(&key) {
            return Some(*p);
        }
        built_in_profile(&key)
    }
}

fn built_in_profile(name: &str) -> Option<ColorProfile> {
    // v -> (v, v/2, 0): h-alpha style red-dominant curve used in scenario 3.
    let identity = ChannelCalibration { in_lo: 0.0, in_hi: 255.0, out_lo: 0.0, out_hi: 255.0 };
    let half = ChannelCalibration { in_lo: 0.0, in_hi: 255.0, out_lo: 0.0, out_hi: 127.5 };
    let zero = ChannelCalibration { in_lo: 0.0, in_hi: 255.0, out_lo: 0.0, out_hi: 0.0 };
    match name {
        "h-alpha" | "halpha" => Some(ColorProfile { curve: ColorCurve { r: identity, g: half, b: zero } }),
        "calcium" | "ca-k" | "cak" => Some(ColorProfile {
            curve: ColorCurve {
                r: zero,
                g: ChannelCalibration { in_lo: 0.0, in_hi: 255.0, out_lo: 0.0, out_hi: 180.0 },
                b: identity,
            },
        }),
        "grayscale" | "continuum" => Some(ColorProfile { curve: ColorCurve { r: identity, g: identity, b: identity } }),
        _ => None,
    }
}

pub fn render(source: &MonoImage, curve: &ColorCurve, _registry: &ColorProfileRegistry) -> Result<RgbImage, ImseError> {
    let mut r = Vec::with_capacity(source.len());
    let mut g = Vec::with_capacity(source.len());
    let mut b = Vec::with_capacity(source.len());
    for &px in source.data.iter() {
        let v = px as f64;
        r.push(curve.r.apply(v) as f32);
        g.push(curve.g.apply(v) as f32);
        b.push(curve.b.apply(v) as f32);
    }
    Ok(RgbImage::new(source.width, source.height, r, g, b))
}
