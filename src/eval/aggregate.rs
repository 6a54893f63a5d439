//! Aggregations over lists (spec §4.6) and per-image statistics (§4.7).
//!
//! `avg`/`min`/`max`/`median` accept a single list argument or a variadic
//! positional list; all items must be the same kind (all scalars, or all
//! images of identical dimensions). For images, aggregation is per-pixel.
//! The sigma-clipped variants (`avg2`, `median2`) reject samples outside
//! `sigma` standard deviations of the per-pixel (or overall, for scalars)
//! mean before reducing.

use crate::error::ImseError;
use crate::value::{MonoImage, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Avg,
    Min,
    Max,
    Median,
}

fn median_of(sorted: &mut [f64]) -> f64 {
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        // spec §9: even-count tie-break uses (n/2 - 1 + n/2) / 2 indexing.
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

fn reduce_samples(samples: &[f64], reduction: Reduction) -> f64 {
    match reduction {
        Reduction::Avg => {
            if samples.is_empty() {
                f64::NAN
            } else {
                samples.iter().sum::<f64>() / samples.len() as f64
            }
        }
        Reduction::Min => samples.iter().copied().fold(f64::INFINITY, f64::min),
        Reduction::Max => samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Reduction::Median => {
            let mut v = samples.to_vec();
            median_of(&mut v)
        }
    }
}

fn sigma_clip(samples: &[f64], sigma: f64) -> Vec<f64> {
    if samples.is_empty() {
        return Vec::new();
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / samples.len() as f64;
    let stddev = variance.sqrt();
    if stddev == 0.0 {
        return samples.to_vec();
    }
    samples.iter().copied().filter(|v| ((v - mean) / stddev).abs() <= sigma).collect()
}

/// Flattens a function-call argument list into the list of items to
/// aggregate: a single `List` argument, or all positional arguments taken
/// as a variadic list.
pub fn gather_items(args: &[Value]) -> Result<Vec<Value>, ImseError> {
    if args.len() == 1 {
        if let Value::List(items) = &args[0] {
            return Ok(items.clone());
        }
    }
    Ok(args.to_vec())
}

fn require_homogeneous(items: &[Value], function: &str) -> Result<Kind, ImseError> {
    if items.is_empty() {
        return Err(ImseError::Arity { function: function.to_string(), expected: "at least 1".to_string(), got: 0 });
    }
    match &items[0] {
        Value::Scalar(_) => {
            for it in items {
                if !matches!(it, Value::Scalar(_)) {
                    return Err(type_mismatch(function, it));
                }
            }
            Ok(Kind::Scalar)
        }
        Value::MonoImage(first) => {
            for it in items {
                match it {
                    Value::MonoImage(m) if m.same_dims(first) => {}
                    Value::MonoImage(m) => {
                        return Err(ImseError::Dimension { left_w: first.width, left_h: first.height, right_w: m.width, right_h: m.height })
                    }
                    other => return Err(type_mismatch(function, other)),
                }
            }
            Ok(Kind::Image)
        }
        other => Err(type_mismatch(function, other)),
    }
}

enum Kind {
    Scalar,
    Image,
}

fn type_mismatch(function: &str, got: &Value) -> ImseError {
    ImseError::Type { function: function.to_string(), param: "items".to_string(), expected: "homogeneous scalars or same-sized images".to_string(), got: got.kind_name().to_string() }
}

/// `avg`/`min`/`max`/`median` over a homogeneous list of scalars or images.
pub fn aggregate(function: &str, items: &[Value], reduction: Reduction) -> Result<Value, ImseError> {
    match require_homogeneous(items, function)? {
        Kind::Scalar => {
            let samples: Vec<f64> = items.iter().map(|v| v.as_scalar().unwrap()).collect();
            Ok(Value::Scalar(reduce_samples(&samples, reduction)))
        }
        Kind::Image => {
            let images: Vec<&MonoImage> = items.iter().map(|v| v.as_mono().unwrap()).collect();
            Ok(Value::MonoImage(aggregate_images(images, reduction, None)))
        }
    }
}

/// `avg2(sigma=...)` / `median2(sigma=...)`: sigma-clip before reducing.
pub fn aggregate_sigma_clipped(function: &str, items: &[Value], reduction: Reduction, sigma: f64) -> Result<Value, ImseError> {
    match require_homogeneous(items, function)? {
        Kind::Scalar => {
            let samples: Vec<f64> = items.iter().map(|v| v.as_scalar().unwrap()).collect();
            let clipped = sigma_clip(&samples, sigma);
            if clipped.is_empty() {
                return Ok(Value::Scalar(f64::NAN));
            }
            Ok(Value::Scalar(reduce_samples(&clipped, reduction)))
        }
        Kind::Image => {
            let images: Vec<&MonoImage> = items.iter().map(|v| v.as_mono().unwrap()).collect();
            Ok(Value::MonoImage(aggregate_images(images, reduction, Some(sigma))))
        }
    }
}

fn aggregate_images(images: Vec<&MonoImage>, reduction: Reduction, sigma: Option<f64>) -> MonoImage {
    let (width, height) = (images[0].width, images[0].height);
    let len = images[0].len();
    let mut out = vec![0f32; len];
    for px in 0..len {
        let samples: Vec<f64> = images.iter().map(|img| img.data[px] as f64).collect();
        let value = match sigma {
            Some(s) => {
                let clipped = sigma_clip(&samples, s);
                if clipped.is_empty() {
                    reduce_samples(&samples, reduction)
                } else {
                    reduce_samples(&clipped, reduction)
                }
            }
            None => reduce_samples(&samples, reduction),
        };
        out[px] = value as f32;
    }
    MonoImage::new(width, height, out)
}

/// Per-image scalar statistics (`img_avg`, `img_median`, `img_min`,
/// `img_max`): a scalar for a single image, or a list of scalars when given
/// a list of images.
pub fn image_statistic(img: &MonoImage, reduction: Reduction) -> f64 {
    let samples: Vec<f64> = img.data.iter().map(|&v| v as f64).collect();
    reduce_samples(&samples, reduction)
}
