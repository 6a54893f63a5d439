//! Consumed Collaborator Interfaces (spec §6.2)
//!
//! The IMSE is a pure library over these three traits; the surrounding
//! JSol'Ex application supplies concrete implementations backed by the
//! reconstruction pipeline, the solar-parameter fit, and the GUI progress
//! bus. Test doubles live in `tests/common`.

use crate::value::{MetadataValue, MonoImage, RgbImage};
use std::sync::Arc;

/// `findImage(shift) -> MonoImage | RgbImage | None`. Must be callable from
/// many threads concurrently (the evaluator fans parallel levels out across
/// OS threads).
pub trait ImageProvider: Send + Sync {
    fn find_image(&self, shift: f64) -> Option<ImageOrRgb>;
}

#[derive(Debug, Clone)]
pub enum ImageOrRgb {
    Mono(MonoImage),
    Rgb(RgbImage),
}

/// Opaque capability token used to look up context-supplied parameters
/// (ellipse fit, solar parameters, image stats, reference-coord
/// transforms, polynomial fit). Distinct from `value::CapabilityToken`,
/// which keys metadata carried *on* an image; this one keys the ambient
/// per-execution context the evaluator reads lazily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextToken {
    Ellipse,
    SolarParameters,
    ImageStats,
    ReferenceCoordTransform,
    Polynomial,
    BlackPoint,
    CarringtonRotation,
    DetectedWavelength,
    DetectedDispersion,
}

/// Typed key/value bag the evaluator reads lazily through this interface,
/// rather than having every value pre-materialized up front.
pub trait ParamSupplier: Send + Sync {
    fn get(&self, token: ContextToken) -> Option<MetadataValue>;
}

/// `broadcast(fractionDone, label)`.
pub trait ProgressBroadcaster: Send + Sync {
    fn broadcast(&self, fraction_done: f64, label: &str);
}

pub struct NullBroadcaster;
impl ProgressBroadcaster for NullBroadcaster {
    fn broadcast(&self, _fraction_done: f64, _label: &str) {}
}

/// Bundles the three collaborator interfaces plus the color-profile
/// registry (crate-internal scaffolding per SPEC_FULL §2) the evaluator
/// needs for a single `execute` call.
pub struct ExecutionContext {
    pub images: Arc<dyn ImageProvider>,
    pub params: Arc<dyn ParamSupplier>,
    pub progress: Arc<dyn ProgressBroadcaster>,
    pub profiles: crate::value::ColorProfileRegistry,
}

impl ExecutionContext {
    pub fn new(images: Arc<dyn ImageProvider>, params: Arc<dyn ParamSupplier>, progress: Arc<dyn ProgressBroadcaster>) -> Self {
        Self { images, params, progress, profiles: crate::value::ColorProfileRegistry::new() }
    }

    pub fn with_profiles(mut self, profiles: crate::value::ColorProfileRegistry) -> Self {
        self.profiles = profiles;
        self
    }
}
