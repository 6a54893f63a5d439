//! Shared black-box test doubles (SPEC_FULL.md §1.4): a configurable fake
//! image provider and a fake execution context, built once here so every
//! scenario test in this directory can share them instead of redefining
//! ad-hoc stubs per file.

use imse::context::ContextToken;
use imse::value::MetadataValue;
use imse::{ExecutionContext, ImageOrRgb, ImageProvider, MonoImage, ParamSupplier, ProgressBroadcaster};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Resolves `findImage(shift)` against a small in-memory table keyed by the
/// shift rounded to three decimal places, falling back to a flat image
/// whose every pixel equals the shift value so tests that don't care about
/// pixel content don't need to populate the table at all.
pub struct FakeImageProvider {
    width: usize,
    height: usize,
    table: Mutex<HashMap<i64, (usize, usize, Vec<f32>)>>,
    missing_shifts: Mutex<Vec<f64>>,
}

impl FakeImageProvider {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, table: Mutex::new(HashMap::new()), missing_shifts: Mutex::new(Vec::new()) }
    }

    fn key(shift: f64) -> i64 {
        (shift * 1000.0).round() as i64
    }

    /// Register an exact pixel buffer for `shift`, at the provider's default
    /// dimensions. `data.len()` must equal `width * height`.
    pub fn with_image(self, shift: f64, data: Vec<f32>) -> Self {
        self.with_sized_image(shift, self.width, self.height, data)
    }

    /// Register an exact pixel buffer for `shift` at explicit dimensions,
    /// for tests that need a shift whose image disagrees in size with the
    /// provider's default (e.g. a dimension-mismatch scenario).
    pub fn with_sized_image(self, shift: f64, width: usize, height: usize, data: Vec<f32>) -> Self {
        self.table.lock().unwrap().insert(Self::key(shift), (width, height, data));
        self
    }

    /// Mark `shift` as unresolvable (`findImage` returns `None`).
    pub fn with_missing(self, shift: f64) -> Self {
        self.missing_shifts.lock().unwrap().push(shift);
        self
    }
}

impl ImageProvider for FakeImageProvider {
    fn find_image(&self, shift: f64) -> Option<ImageOrRgb> {
        if self.missing_shifts.lock().unwrap().iter().any(|s| (*s - shift).abs() < 1e-6) {
            return None;
        }
        if let Some((w, h, data)) = self.table.lock().unwrap().get(&Self::key(shift)) {
            return Some(ImageOrRgb::Mono(MonoImage::new(*w, *h, data.clone())));
        }
        Some(ImageOrRgb::Mono(MonoImage::new(self.width, self.height, vec![shift as f32; self.width * self.height])))
    }
}

/// A `ParamSupplier` backed by a plain map, for tests that need
/// `black_point`/`solar_p_angle`/etc. reserved names seeded.
#[derive(Default)]
pub struct FakeParams {
    values: HashMap<ContextToken, MetadataValue>,
}

impl FakeParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, token: ContextToken, value: MetadataValue) -> Self {
        self.values.insert(token, value);
        self
    }
}

impl ParamSupplier for FakeParams {
    fn get(&self, token: ContextToken) -> Option<MetadataValue> {
        self.values.get(&token).cloned()
    }
}

/// Collects every `broadcast` call for assertions instead of discarding them.
#[derive(Default)]
pub struct RecordingProgress {
    pub events: Mutex<Vec<(f64, String)>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressBroadcaster for RecordingProgress {
    fn broadcast(&self, fraction_done: f64, label: &str) {
        self.events.lock().unwrap().push((fraction_done, label.to_string()));
    }
}

/// Builds a ready-to-use [`ExecutionContext`] over a 4x4 [`FakeImageProvider`]
/// with no seeded params and a discarding progress broadcaster - the common
/// case for scenario tests that don't care about either.
pub fn fake_context() -> ExecutionContext {
    ExecutionContext::new(Arc::new(FakeImageProvider::new(4, 4)), Arc::new(FakeParams::new()), Arc::new(RecordingProgress::new()))
}

/// Same as [`fake_context`] but with a caller-supplied provider, for tests
/// that need specific pixel content or missing shifts.
pub fn fake_context_with_provider(provider: FakeImageProvider) -> ExecutionContext {
    ExecutionContext::new(Arc::new(provider), Arc::new(FakeParams::new()), Arc::new(RecordingProgress::new()))
}
