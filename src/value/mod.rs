//! Value Model
//!
//! `Value` is the sum type every script-level expression evaluates to:
//! a double-precision scalar, a mono or RGB float32 raster, a deferred
//! colorized image, a homogeneous list, a string, or unit. Images carry
//! their pixel data row-major with `len == width * height`.

mod colorize;
mod ops;

pub use colorize::{ChannelCalibration, ColorCurve, ColorProfile, ColorProfileRegistry};
pub use ops::normalize_min_nonnegative;

use crate::error::ImseError;
use std::collections::HashMap;
use std::sync::Arc;

/// Opaque capability token keying the metadata map carried by `MonoImage`.
/// Mirrors spec §3: "optional metadata map keyed by opaque capability
/// tokens: ellipse fit, pixel-shift, solar parameters, reference-coord
/// transforms".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityToken {
    Ellipse,
    PixelShift,
    SolarParameters,
    ReferenceCoordTransform,
    Polynomial,
    ImageStats,
}

/// A single mono (single-plane) float32 raster plus optional context
/// metadata threaded through from the reconstruction stage.
#[derive(Debug, Clone)]
pub struct MonoImage {
    pub width: usize,
    pub height: usize,
    pub data: Arc<Vec<f32>>,
    pub metadata: HashMap<CapabilityToken, MetadataValue>,
}

/// A value stashed in a `MonoImage`'s metadata map. Kept as a small enum
/// rather than `dyn Any` so metadata is cheap to copy and inspect from the
/// evaluator without downcasting.
#[derive(Debug, Clone)]
pub enum MetadataValue {
    Ellipse { cx: f64, cy: f64, semi_major: f64, semi_minor: f64, angle: f64 },
    PixelShift(f64),
    Scalar(f64),
    Text(String),
    /// The fitted solar P-angle / B0 pair backing the `solar_p_angle` and
    /// `solar_b0` reserved names (spec §4.4, §4.8 step 3).
    SolarParameters { p_angle: f64, b0: f64 },
}

impl MonoImage {
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Self {
        Self { width, height, data: Arc::new(data), metadata: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn same_dims(&self, other: &MonoImage) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn ellipse(&self) -> Option<&MetadataValue> {
        self.metadata.get(&CapabilityToken::Ellipse)
    }
}

/// Three co-registered mono planes (red, green, blue), same dimensions.
#[derive(Debug, Clone)]
pub struct RgbImage {
    pub width: usize,
    pub height: usize,
    pub r: Arc<Vec<f32>>,
    pub g: Arc<Vec<f32>>,
    pub b: Arc<Vec<f32>>,
}

impl RgbImage {
    pub fn new(width: usize, height: usize, r: Vec<f32>, g: Vec<f32>, b: Vec<f32>) -> Self {
        Self { width, height, r: Arc::new(r), g: Arc::new(g), b: Arc::new(b) }
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A mono image paired with a deferred mono -> RGB conversion, applied only
/// at render time. Stored as a small tagged variant (`ColorCurve`) instead
/// of a closure so values remain cheap to copy, compare for memoization,
/// and serialize into a debug dump.
#[derive(Debug, Clone)]
pub struct ColorizedImage {
    pub source: Arc<MonoImage>,
    pub curve: ColorCurve,
}

impl ColorizedImage {
    /// Apply the color curve and produce the concrete RGB raster.
    pub fn render(&self, registry: &ColorProfileRegistry) -> Result<RgbImage, ImseError> {
        colorize::render(&self.source, &self.curve, registry)
    }
}

/// The script-level value sum type. See spec §3.
#[derive(Debug, Clone)]
pub enum Value {
    Scalar(f64),
    MonoImage(MonoImage),
    RgbImage(RgbImage),
    ColorizedImage(ColorizedImage),
    List(Vec<Value>),
    String(String),
    Unit,
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::MonoImage(_) => "mono image",
            Value::RgbImage(_) => "rgb image",
            Value::ColorizedImage(_) => "colorized image",
            Value::List(_) => "list",
            Value::String(_) => "string",
            Value::Unit => "unit",
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_mono(&self) -> Option<&MonoImage> {
        match self {
            Value::MonoImage(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Value::MonoImage(_) | Value::RgbImage(_) | Value::ColorizedImage(_))
    }
}

pub use ops::{binary_op, BinaryOperator, NormalizePolicy};
