//! Script Executor (spec §4.8)
//!
//! Orchestrates parse -> include-inline -> dependency-analyze -> schedule ->
//! evaluate for one `execute` call, broadcasts progress, and assembles the
//! final outputs map. Mirrors the way the teacher's `Bash::exec` ties the
//! parser and interpreter together behind a single entry point, except this
//! engine is fully synchronous (spec §5: no cooperative suspension inside
//! the evaluator) and never throws for per-node evaluation failures — those
//! are collected into `ScriptResult::errors` instead (spec §7 "Error
//! channel").

use crate::analysis::{self, DependencyInfo};
use crate::ast::SectionKind;
use crate::context::{ContextToken, ExecutionContext};
use crate::dag::{self, LevelKind};
use crate::error::{ImseError, InvalidExpression};
use crate::eval::{Environment, Evaluator, ExecutionConfig};
use crate::external::ExternalScriptBridge;
use crate::include::{resolve_includes, FsScriptSource, ScriptSource};
use crate::parser::{parse_script, ParseMode};
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// `mode ∈ {single, batch}` (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Single,
    Batch,
}

/// One value produced under a label: either a rendered image or a scalar/
/// string side value. `ScriptResult::images` only ever holds the former;
/// `ScriptResult::values` only the latter (spec §4.8 step 7).
#[derive(Debug, Clone)]
pub enum ImageResult {
    Mono(crate::value::MonoImage),
    Rgb(crate::value::RgbImage),
    Colorized(crate::value::ColorizedImage),
}

/// `ScriptResult` (spec §6.3): the emitted interface of one `execute` call.
#[derive(Debug, Clone, Default)]
pub struct ScriptResult {
    pub images: IndexMap<String, ImageResult>,
    pub values: IndexMap<String, Value>,
    pub errors: Vec<InvalidExpression>,
    pub variable_shifts: Vec<f64>,
    pub expression_shifts: Vec<f64>,
    pub auto_wavelengths: Vec<f64>,
    pub uses_auto_continuum: bool,
}

/// Orchestrates one script execution. Stateless between calls — a fresh
/// `Environment`, memoization cache, and pixel-shift set are created inside
/// `execute` every time, per the lifecycle spec §3 describes.
pub struct ScriptExecutor {
    config: ExecutionConfig,
    bridge: Option<Arc<dyn ExternalScriptBridge>>,
}

impl ScriptExecutor {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config, bridge: None }
    }

    pub fn with_bridge(mut self, bridge: Arc<dyn ExternalScriptBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Execute `source` (read relative to `base_dir` for its `include`
    /// directives) against `ctx` in `mode`. Never returns `Err`: catastrophic
    /// syntax/cycle failures still produce a best-effort (possibly empty)
    /// `ScriptResult` carrying the recorded errors, per spec §7's
    /// propagation policy.
    pub fn execute(&self, source: &str, base_dir: &Path, mode: ExecutionMode, ctx: &ExecutionContext) -> ScriptResult {
        self.execute_with_source(source, base_dir, mode, ctx, &FsScriptSource)
    }

    /// Parse `source` and build its dependency graph without evaluating
    /// anything, for diagnostic tooling (the `--dot` CLI flag). Returns the
    /// flat node list alongside the scheduled [`dag::Dag`]; callers pass
    /// both to [`crate::dot::render`].
    pub fn build_dag(&self, source: &str, base_dir: &Path, mode: ExecutionMode) -> Result<(Vec<DependencyInfo>, dag::Dag), ImseError> {
        let outcome = parse_script(source, ParseMode::Tolerant)?;
        let script = resolve_includes(outcome.script, base_dir, &FsScriptSource, ParseMode::Tolerant)?;
        let selected_kinds = selected_kinds_for(mode);
        let has_outputs_section = script.sections.iter().any(|s| s.kind == SectionKind::Outputs);
        let (nodes, _overwrites) = analysis::analyze(&script, &selected_kinds, !has_outputs_section);
        let dag = dag::build(&nodes)?;
        Ok((nodes, dag))
    }

    /// Same as [`Self::execute`] but with an injectable [`ScriptSource`] for
    /// include resolution, so tests don't have to touch the filesystem.
    pub fn execute_with_source(&self, source: &str, base_dir: &Path, mode: ExecutionMode, ctx: &ExecutionContext, script_source: &dyn ScriptSource) -> ScriptResult {
        let span = tracing::debug_span!("execute_script", mode = ?mode);
        let _enter = span.enter();

        let mut result = ScriptResult::default();

        // Step 1: tokenize, parse (tolerant: a catastrophic syntax error must
        // not prevent returning whatever sections could still be built),
        // inline includes.
        let outcome = match parse_script(source, ParseMode::Tolerant) {
            Ok(o) => o,
            Err(e) => {
                error!(error = %e, "fatal parse failure, returning empty result");
                result.errors.push(InvalidExpression::new("<script>", source, e));
                return result;
            }
        };
        result.errors.extend(outcome.errors);

        let script = match resolve_includes(outcome.script, base_dir, script_source, ParseMode::Tolerant) {
            Ok(s) => s,
            Err(e @ ImseError::IncludeCycle { .. }) => {
                error!(error = %e, "include cycle, returning partial result");
                result.errors.push(InvalidExpression::new("<script>", source, e));
                return result;
            }
            Err(e) => {
                result.errors.push(InvalidExpression::new("<script>", source, e));
                return result;
            }
        };

        debug!(sections = script.sections.len(), functions = script.functions.len(), "parsed script");

        // Step 2: select sections for this mode.
        let selected_kinds = selected_kinds_for(mode);
        let has_outputs_section = script.sections.iter().any(|s| s.kind == SectionKind::Outputs);

        // Step 3 + 4: seed environment, build DependencyInfo.
        let env = Environment::new();
        let (nodes, overwrites) = analysis::analyze(&script, &selected_kinds, !has_outputs_section);
        for (name, from, to) in overwrites {
            warn!(variable = %name, from = ?from, to = ?to, "last-writer-wins: variable reassigned across sections");
        }

        // Step 5: build the DAG; a cycle aborts scheduling but still
        // returns whatever was already computed (nothing, at this point).
        let dag = match dag::build(&nodes) {
            Ok(d) => d,
            Err(e @ ImseError::Circular { .. }) => {
                error!(error = %e, "circular dependency, no outputs produced");
                result.errors.push(InvalidExpression::new("<script>", source, e));
                return result;
            }
            Err(e) => {
                result.errors.push(InvalidExpression::new("<script>", source, e));
                return result;
            }
        };

        let evaluator = Evaluator::new(&env, ctx, &script.functions, self.config.clone());
        let evaluator = match &self.bridge {
            Some(b) => evaluator.with_bridge(b.clone()),
            None => evaluator,
        };
        seed_reserved_names(&evaluator, ctx);

        let mut failed: HashSet<String> = HashSet::new();

        for (level_index, level) in dag.levels.iter().enumerate() {
            if self.config.cancellation.is_cancelled() {
                for &idx in &level.node_indices {
                    result.errors.push(InvalidExpression::new(nodes[idx].var_name.clone(), nodes[idx].expr_text.clone(), ImseError::Cancelled));
                }
                continue;
            }

            info!(level_index, kind = ?level.kind, node_count = level.node_indices.len(), "executing level");

            match level.kind {
                LevelKind::Sequential => {
                    for &idx in &level.node_indices {
                        self.run_node(&evaluator, &nodes[idx], ctx, &mut failed, &mut result);
                    }
                }
                LevelKind::Parallel => {
                    self.run_parallel_level(&evaluator, &nodes, &level.node_indices, ctx, &mut failed, &mut result);
                }
            }
        }

        // Every node the DAG schedules — tmp, single/batch, and outputs
        // alike — is a named variable (spec §4.8 step 7 emits all of them
        // under their label), so the whole run is the "variable-preparation
        // pass" described in §4.7/§4.8 step 6: the snapshot is taken once,
        // after the DAG has fully executed, and becomes `variable_shifts`
        // in its entirety. `expression_shifts` is reserved for shifts added
        // by work outside DAG node evaluation (e.g. an ad hoc
        // `evaluate(expressionText)` call from external tooling); this
        // executor has no such phase, so it stays empty.
        result.variable_shifts = evaluator.shifts.snapshot_shifts();
        result.auto_wavelengths = evaluator.shifts.snapshot_wavelengths();
        result.uses_auto_continuum = evaluator.shifts.uses_auto_continuum();

        // Step 7: collect results.
        for node in &nodes {
            if failed.contains(&node.var_name) {
                continue;
            }
            let Some(value) = evaluator.get_resolved(&node.var_name) else { continue };
            collect_value(&node.var_name, value, &mut result);
        }

        result
    }

    fn run_node(&self, evaluator: &Evaluator<'_>, node: &DependencyInfo, ctx: &ExecutionContext, failed: &mut HashSet<String>, result: &mut ScriptResult) {
        if let Some(upstream) = node.dependencies.iter().find(|d| failed.contains(*d)) {
            failed.insert(node.var_name.clone());
            result.errors.push(InvalidExpression::skipped_due_to_dependency(node.var_name.clone(), upstream.clone()));
            return;
        }
        match evaluator.eval(&node.expr) {
            Ok(value) => {
                evaluator.bind_resolved(&node.var_name, value);
                ctx.progress.broadcast(1.0, &node.var_name);
            }
            Err(e) => {
                error!(label = %node.var_name, error = %e, "invalid expression");
                failed.insert(node.var_name.clone());
                result.errors.push(InvalidExpression::new(node.var_name.clone(), node.expr_text.clone(), e));
            }
        }
    }

    fn run_parallel_level(&self, evaluator: &Evaluator<'_>, nodes: &[DependencyInfo], indices: &[usize], ctx: &ExecutionContext, failed: &mut HashSet<String>, result: &mut ScriptResult) {
        // A bounded `std::thread::scope` fan-out (SPEC_FULL §1.5): the
        // engine carries no work-stealing crate, so each ready node gets its
        // own scoped thread, chunked to `thread_pool_size` if the caller set
        // one.
        let pool_size = self.config.thread_pool_size.unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4));
        let mut outcomes: Vec<(usize, Result<Value, ImseError>)> = Vec::with_capacity(indices.len());

        for chunk in indices.chunks(pool_size.max(1)) {
            let chunk_outcomes: Vec<(usize, Result<Value, ImseError>)> = std::thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .copied()
                    .filter(|&idx| {
                        if let Some(upstream) = nodes[idx].dependencies.iter().find(|d| failed.contains(*d)) {
                            failed.insert(nodes[idx].var_name.clone());
                            result.errors.push(InvalidExpression::skipped_due_to_dependency(nodes[idx].var_name.clone(), upstream.clone()));
                            false
                        } else {
                            true
                        }
                    })
                    .map(|idx| {
                        let node = &nodes[idx];
                        scope.spawn(move || (idx, evaluator.eval(&node.expr)))
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap_or_else(|_| panic!("worker thread panicked"))).collect()
            });
            outcomes.extend(chunk_outcomes);
        }

        for (idx, outcome) in outcomes {
            let node = &nodes[idx];
            match outcome {
                Ok(value) => {
                    evaluator.bind_resolved(&node.var_name, value);
                    ctx.progress.broadcast(1.0, &node.var_name);
                }
                Err(e) => {
                    error!(label = %node.var_name, error = %e, "invalid expression");
                    failed.insert(node.var_name.clone());
                    result.errors.push(InvalidExpression::new(node.var_name.clone(), node.expr_text.clone(), e));
                }
            }
        }
    }
}

fn selected_kinds_for(mode: ExecutionMode) -> Vec<SectionKind> {
    let mut kinds = vec![SectionKind::Tmp, SectionKind::Outputs];
    kinds.push(match mode {
        ExecutionMode::Single => SectionKind::Single,
        ExecutionMode::Batch => SectionKind::Batch,
    });
    kinds
}

fn collect_value(name: &str, value: Value, result: &mut ScriptResult) {
    match value {
        Value::MonoImage(m) => {
            result.images.insert(name.to_string(), ImageResult::Mono(m));
        }
        Value::RgbImage(r) => {
            result.images.insert(name.to_string(), ImageResult::Rgb(r));
        }
        Value::ColorizedImage(c) => {
            result.images.insert(name.to_string(), ImageResult::Colorized(c));
        }
        Value::List(items) => {
            for (i, item) in items.into_iter().enumerate() {
                collect_value(&format!("{name}_{i}"), item, result);
            }
        }
        Value::Scalar(_) | Value::String(_) => {
            result.values.insert(name.to_string(), value);
        }
        Value::Unit => {}
    }
}

/// Seeds the evaluator's resolved-value map with reserved environment names
/// (black point, solar angles, carrington rotation, detected
/// wavelength/dispersion) pulled from the context-supplied parameter bag
/// (spec §4.8 step 3), so expressions can reference them like any other
/// already-computed variable.
fn seed_reserved_names(evaluator: &Evaluator<'_>, ctx: &ExecutionContext) {
    let scalar_names = [
        ("black_point", ContextToken::BlackPoint),
        ("carrington_rotation", ContextToken::CarringtonRotation),
        ("detected_wavelength", ContextToken::DetectedWavelength),
        ("detected_dispersion", ContextToken::DetectedDispersion),
    ];
    for (name, token) in scalar_names {
        if let Some(crate::value::MetadataValue::Scalar(v)) = ctx.params.get(token) {
            evaluator.bind_resolved(name, Value::Scalar(v));
        }
    }
    if let Some(crate::value::MetadataValue::SolarParameters { p_angle, b0 }) = ctx.params.get(ContextToken::SolarParameters) {
        evaluator.bind_resolved("solar_p_angle", Value::Scalar(p_angle));
        evaluator.bind_resolved("solar_b0", Value::Scalar(b0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ImageOrRgb, ImageProvider, NullBroadcaster, ParamSupplier};
    use crate::value::{MetadataValue, MonoImage};

    struct FakeProvider;
    impl ImageProvider for FakeProvider {
        fn find_image(&self, shift: f64) -> Option<ImageOrRgb> {
            if shift.abs() > 100.0 {
                return None;
            }
            Some(ImageOrRgb::Mono(MonoImage::new(2, 2, vec![shift as f32; 4])))
        }
    }

    struct EmptyParams;
    impl ParamSupplier for EmptyParams {
        fn get(&self, _token: ContextToken) -> Option<MetadataValue> {
            None
        }
    }

    fn test_ctx() -> ExecutionContext {
        ExecutionContext::new(Arc::new(FakeProvider), Arc::new(EmptyParams), Arc::new(NullBroadcaster))
    }

    #[test]
    fn shift_collection_basic() {
        let exec = ScriptExecutor::new(ExecutionConfig::default());
        let ctx = test_ctx();
        let src = "a = img(0)\nb = (img(1) + img(-1)) / 2\n";
        let result = exec.execute(src, Path::new("."), ExecutionMode::Single, &ctx);
        assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
        assert!(result.images.contains_key("a"));
        assert!(result.images.contains_key("b"));
        let mut shifts = result.variable_shifts.clone();
        shifts.extend(result.expression_shifts.clone());
        shifts.sort_by(|a, b| a.partial_cmp(b).unwrap());
        shifts.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
        assert_eq!(shifts, vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn range_fanout_and_aggregation() {
        let exec = ScriptExecutor::new(ExecutionConfig::default());
        let ctx = test_ctx();
        let src = "[outputs]\nstack = avg(range(-2, 2, 1))\n";
        let result = exec.execute(src, Path::new("."), ExecutionMode::Single, &ctx);
        assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
        assert!(result.images.contains_key("stack"));
    }

    #[test]
    fn dimension_mismatch_is_invalid_expression_not_panic() {
        struct MismatchProvider;
        impl ImageProvider for MismatchProvider {
            fn find_image(&self, shift: f64) -> Option<ImageOrRgb> {
                if shift == 0.0 {
                    Some(ImageOrRgb::Mono(MonoImage::new(10, 10, vec![1.0; 100])))
                } else {
                    Some(ImageOrRgb::Mono(MonoImage::new(10, 11, vec![1.0; 110])))
                }
            }
        }
        let ctx = ExecutionContext::new(Arc::new(MismatchProvider), Arc::new(EmptyParams), Arc::new(NullBroadcaster));
        let exec = ScriptExecutor::new(ExecutionConfig::default());
        let src = "[outputs]\nx = img(0) + img(1)\n";
        let result = exec.execute(src, Path::new("."), ExecutionMode::Single, &ctx);
        assert!(result.images.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(result.errors[0].error, ImseError::Dimension { .. }));
    }

    #[test]
    fn cycle_produces_circular_error_and_no_outputs() {
        let exec = ScriptExecutor::new(ExecutionConfig::default());
        let ctx = test_ctx();
        let src = "y = y + 1\n";
        let result = exec.execute(src, Path::new("."), ExecutionMode::Single, &ctx);
        assert!(result.images.is_empty());
        assert!(result.values.is_empty());
        assert!(result.errors.iter().any(|e| matches!(e.error, ImseError::Circular { .. })));
    }

    #[test]
    fn skips_dependents_of_a_failed_node() {
        let exec = ScriptExecutor::new(ExecutionConfig::default());
        let ctx = test_ctx();
        let src = "[outputs]\na = img(999)\nb = a + 1\n";
        let result = exec.execute(src, Path::new("."), ExecutionMode::Single, &ctx);
        assert!(result.images.is_empty());
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors.iter().any(|e| e.label == "a" && matches!(e.error, ImseError::Missing { .. })));
        assert!(result.errors.iter().any(|e| e.label == "b"));
    }
}
