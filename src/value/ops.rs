//! Binary Operator Dispatch & Arithmetic Normalization
//!
//! Implements the decision table of spec §4.6: scalar/scalar, image/scalar
//! (either order), image/image, list/list, and colorized-image delegation.
//! Every image-producing binary operator normalizes its output per §4.8:
//! if the minimum pixel value is negative, every pixel is shifted by its
//! absolute value so the result is non-negative. Clamping an upper bound is
//! explicitly not performed here.

use super::{ColorizedImage, MonoImage, RgbImage, Value};
use crate::error::ImseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOperator {
    fn apply_scalar(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOperator::Add => a + b,
            BinaryOperator::Sub => a - b,
            BinaryOperator::Mul => a * b,
            BinaryOperator::Div => a / b,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
        }
    }
}

/// Whether a binary arithmetic result should be rebased so `min(pixel) >= 0`.
/// Resolves spec §9 Open Question 2: kept as the default behavior, but
/// exposed as a switchable `ExecutionConfig` policy rather than baked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizePolicy {
    #[default]
    RebaseNonNegative,
    Preserve,
}

pub fn normalize_min_nonnegative(data: &mut [f32], policy: NormalizePolicy) {
    if policy == NormalizePolicy::Preserve {
        return;
    }
    let min = data.iter().copied().fold(f32::INFINITY, f32::min);
    if min.is_finite() && min < 0.0 {
        let shift = -min;
        for v in data.iter_mut() {
            *v += shift;
        }
    }
}

fn elementwise_image_scalar(img: &MonoImage, scalar: f64, op: BinaryOperator, flip: bool, policy: NormalizePolicy) -> MonoImage {
    let scalar = scalar as f32;
    let mut out: Vec<f32> = img
        .data
        .iter()
        .map(|&px| {
            if flip {
                op.apply_scalar(scalar as f64, px as f64) as f32
            } else {
                op.apply_scalar(px as f64, scalar as f64) as f32
            }
        })
        .collect();
    normalize_min_nonnegative(&mut out, policy);
    let mut result = MonoImage::new(img.width, img.height, out);
    result.metadata = img.metadata.clone();
    result
}

fn elementwise_image_image(a: &MonoImage, b: &MonoImage, op: BinaryOperator, policy: NormalizePolicy) -> Result<MonoImage, ImseError> {
    if !a.same_dims(b) {
        return Err(ImseError::Dimension {
            left_w: a.width,
            left_h: a.height,
            right_w: b.width,
            right_h: b.height,
        });
    }
    let mut out: Vec<f32> = a
        .data
        .iter()
        .zip(b.data.iter())
        .map(|(&x, &y)| op.apply_scalar(x as f64, y as f64) as f32)
        .collect();
    normalize_min_nonnegative(&mut out, policy);
    let mut result = MonoImage::new(a.width, a.height, out);
    result.metadata = a.metadata.clone();
    Ok(result)
}

fn elementwise_rgb_rgb(a: &RgbImage, b: &RgbImage, op: BinaryOperator, policy: NormalizePolicy) -> Result<RgbImage, ImseError> {
    if a.width != b.width || a.height != b.height {
        return Err(ImseError::Dimension {
            left_w: a.width,
            left_h: a.height,
            right_w: b.width,
            right_h: b.height,
        });
    }
    let combine = |pa: &[f32], pb: &[f32]| -> Vec<f32> {
        let mut v: Vec<f32> = pa.iter().zip(pb.iter()).map(|(&x, &y)| op.apply_scalar(x as f64, y as f64) as f32).collect();
        normalize_min_nonnegative(&mut v, policy);
        v
    };
    Ok(RgbImage::new(a.width, a.height, combine(&a.r, &b.r), combine(&a.g, &b.g), combine(&a.b, &b.b)))
}

fn elementwise_rgb_scalar(img: &RgbImage, scalar: f64, op: BinaryOperator, flip: bool, policy: NormalizePolicy) -> RgbImage {
    let s = scalar as f32;
    let combine = |plane: &[f32]| -> Vec<f32> {
        let mut v: Vec<f32> = plane
            .iter()
            .map(|&px| if flip { op.apply_scalar(s as f64, px as f64) as f32 } else { op.apply_scalar(px as f64, s as f64) as f32 })
            .collect();
        normalize_min_nonnegative(&mut v, policy);
        v
    };
    RgbImage::new(img.width, img.height, combine(&img.r), combine(&img.g), combine(&img.b))
}

/// Apply `op` to `(left, right)` per the decision table in spec §4.6.
pub fn binary_op(op: BinaryOperator, left: &Value, right: &Value, policy: NormalizePolicy) -> Result<Value, ImseError> {
    use Value::*;
    match (left, right) {
        (Scalar(a), Scalar(b)) => Ok(Scalar(op.apply_scalar(*a, *b))),

        (MonoImage(img), Scalar(s)) => Ok(MonoImage(elementwise_image_scalar(img, *s, op, false, policy))),
        (Scalar(s), MonoImage(img)) => Ok(MonoImage(elementwise_image_scalar(img, *s, op, true, policy))),
        (MonoImage(a), MonoImage(b)) => Ok(MonoImage(elementwise_image_image(a, b, op, policy)?)),

        (RgbImage(img), Scalar(s)) => Ok(RgbImage(elementwise_rgb_scalar(img, *s, op, false, policy))),
        (Scalar(s), RgbImage(img)) => Ok(RgbImage(elementwise_rgb_scalar(img, *s, op, true, policy))),
        (RgbImage(a), RgbImage(b)) => Ok(RgbImage(elementwise_rgb_rgb(a, b, op, policy)?)),

        (ColorizedImage(c), other) | (other, ColorizedImage(c)) => {
            let delegated = binary_op(op, &Value::MonoImage((*c.source).clone()), other, policy)?;
            match delegated {
                Value::MonoImage(m) => Ok(Value::ColorizedImage(super::ColorizedImage { source: std::sync::Arc::new(m), curve: c.curve.clone() })),
                other => Ok(other),
            }
        }

        (List(a), List(b)) => match op {
            BinaryOperator::Add => {
                let mut out = a.clone();
                out.extend(b.clone());
                Ok(List(out))
            }
            BinaryOperator::Sub => {
                // setwise difference: keep elements of `a` whose textual form
                // does not occur in `b`.
                let b_repr: Vec<String> = b.iter().map(describe).collect();
                Ok(List(a.iter().filter(|v| !b_repr.contains(&describe(v))).cloned().collect()))
            }
            _ => Err(type_error("list operator", op)),
        },

        _ => Err(type_error("binary operator", op)),
    }
}

fn describe(v: &Value) -> String {
    match v {
        Value::Scalar(s) => s.to_string(),
        Value::String(s) => s.clone(),
        _ => format!("{:p}", v),
    }
}

fn type_error(context: &str, op: BinaryOperator) -> ImseError {
    ImseError::Type {
        function: context.to_string(),
        param: "operands".to_string(),
        expected: "matching scalar/image/list operands".to_string(),
        got: op.symbol().to_string(),
    }
}
