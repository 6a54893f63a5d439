//! Expression Evaluator (spec §4.6, §4.7)
//!
//! Polymorphic numeric/image/list operators, the built-in function
//! registry, user-function dispatch, memoization keyed by the canonical
//! AST form of an expression, and pixel-shift collection. One `Evaluator`
//! is constructed per script execution; its memoization cache and
//! pixel-shift set are never shared across executions (spec §3 "Environment"
//! lifecycle).

pub mod aggregate;
pub mod builtins;
pub mod transforms;

use crate::ast::{BinOp, Expr, FunctionDef};
use crate::context::ExecutionContext;
use crate::error::ImseError;
use crate::external::ExternalScriptBridge;
use crate::value::{binary_op, BinaryOperator, ColorizedImage, NormalizePolicy, Value};
use aggregate::{gather_items, image_statistic, Reduction};
use builtins::Builtin;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// An ordered mapping from variable name to its (unevaluated) parsed
/// expression, seeded with reserved environment names and populated from
/// the script's selected sections. Read-only once evaluation starts.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub vars: IndexMap<String, Expr>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, expr: Expr) {
        self.vars.insert(name.into(), expr);
    }
}

/// A cooperative cancellation flag shared between the executor and every
/// worker thread of a parallel level (spec §5). Checked between levels and,
/// inside long-running structural transforms, at pixel-row granularity: an
/// in-flight row finishes before the transform returns `Cancelled`.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<std::sync::atomic::AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Caller-tunable knobs threaded into one `execute` call (SPEC_FULL §1.3).
#[derive(Clone)]
pub struct ExecutionConfig {
    pub thread_pool_size: Option<usize>,
    pub normalize_policy: NormalizePolicy,
    pub cancellation: CancellationToken,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { thread_pool_size: None, normalize_policy: NormalizePolicy::RebaseNonNegative, cancellation: CancellationToken::new() }
    }
}

/// Accumulated pixel-shift bookkeeping (spec §4.7): `img`/`range` record the
/// shifts they request; `a2px` records the wavelength it derives;
/// `continuum` sets the auto-continuum flag. Two snapshots of the shift set
/// are taken by the executor (before and after the outputs pass).
#[derive(Debug, Clone, Default)]
pub struct ShiftTracker {
    shifts: Arc<Mutex<Vec<f64>>>,
    auto_wavelengths: Arc<Mutex<Vec<f64>>>,
    uses_auto_continuum: Arc<std::sync::atomic::AtomicBool>,
}

impl ShiftTracker {
    pub fn record_shift(&self, shift: f64) {
        let mut v = self.shifts.lock().unwrap();
        if !v.iter().any(|s| (*s - shift).abs() < 1e-9) {
            v.push(shift);
        }
    }

    pub fn record_wavelength(&self, angstroms: f64) {
        let mut v = self.auto_wavelengths.lock().unwrap();
        if !v.iter().any(|s| (*s - angstroms).abs() < 1e-9) {
            v.push(angstroms);
        }
    }

    pub fn set_auto_continuum(&self) {
        self.uses_auto_continuum.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn snapshot_shifts(&self) -> Vec<f64> {
        let mut v = self.shifts.lock().unwrap().clone();
        v.sort_by(|a, b| a.partial_cmp(b).unwrap());
        v
    }

    pub fn snapshot_wavelengths(&self) -> Vec<f64> {
        let mut v = self.auto_wavelengths.lock().unwrap().clone();
        v.sort_by(|a, b| a.partial_cmp(b).unwrap());
        v
    }

    pub fn uses_auto_continuum(&self) -> bool {
        self.uses_auto_continuum.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// The memoization cache: canonical-AST-text -> computed `Value`. A
/// concurrent insert-or-compute map (spec §5): at most one computation per
/// key even when several worker threads race to evaluate the same
/// sub-expression.
#[derive(Default)]
struct MemoCache {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoCache {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().unwrap().get(key).cloned()
    }

    fn insert(&self, key: String, value: Value) {
        self.entries.write().unwrap().insert(key, value);
    }
}

thread_local! {
    /// User-function call-parameter scopes, innermost last. Thread-local
    /// rather than a field on `Evaluator` guarded by a `Mutex`: a parallel
    /// level fans the same `Evaluator` out across several OS threads (spec
    /// §5), and a shared stack would let one thread's push/pop interleave
    /// with another's, corrupting both calls' parameter bindings. Each
    /// worker thread gets its own stack instead, which is naturally empty
    /// again once its top-level node finishes evaluating.
    static SCOPES: RefCell<Vec<HashMap<String, Value>>> = const { RefCell::new(Vec::new()) };
}

/// Returns true if any call reachable from `expr` is stateful or
/// non-concurrent; caching must be disabled for such expressions or side
/// effects would be swallowed (spec §4.7).
fn has_uncacheable_call(expr: &Expr) -> bool {
    let mut found = false;
    expr.for_each_call(&mut |name, _pos, _named| {
        if matches!(builtins::builtin_concurrency(name), builtins::BuiltinConcurrency::Stateful | builtins::BuiltinConcurrency::NonConcurrent) {
            found = true;
        }
    });
    found
}

pub struct Evaluator<'a> {
    pub env: &'a Environment,
    pub ctx: &'a ExecutionContext,
    pub functions: HashMap<String, &'a FunctionDef>,
    pub config: ExecutionConfig,
    pub shifts: ShiftTracker,
    pub bridge: Option<Arc<dyn ExternalScriptBridge>>,
    pub bridge_lock: Arc<crate::external::ReentrantBridgeLock>,
    memo: MemoCache,
    /// Already-computed top-level variable values, populated by the
    /// executor as DAG levels complete.
    resolved: RwLock<HashMap<String, Value>>,
    /// Accumulated side-effect log (e.g. `workdir` calls), for diagnostics.
    pub side_effects: Mutex<Vec<String>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(env: &'a Environment, ctx: &'a ExecutionContext, functions: &'a [FunctionDef], config: ExecutionConfig) -> Self {
        let functions = functions.iter().map(|f| (f.name.to_lowercase(), f)).collect();
        Self {
            env,
            ctx,
            functions,
            config,
            shifts: ShiftTracker::default(),
            bridge: None,
            bridge_lock: Arc::new(crate::external::ReentrantBridgeLock::new()),
            memo: MemoCache::default(),
            resolved: RwLock::new(HashMap::new()),
            side_effects: Mutex::new(Vec::new()),
        }
    }

    pub fn with_bridge(mut self, bridge: Arc<dyn ExternalScriptBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Record a top-level variable's computed value so later sibling
    /// expressions can resolve it by identifier without recomputation.
    pub fn bind_resolved(&self, name: &str, value: Value) {
        self.resolved.write().unwrap().insert(name.to_string(), value);
    }

    pub fn get_resolved(&self, name: &str) -> Option<Value> {
        self.resolved.read().unwrap().get(name).cloned()
    }

    /// Evaluate one expression to a `Value`, applying memoization for
    /// side-effect-free expressions.
    pub fn eval(&self, expr: &Expr) -> Result<Value, ImseError> {
        let cacheable = !has_uncacheable_call(expr);
        let key = if cacheable { Some(expr.canonical()) } else { None };
        if let Some(k) = &key {
            if let Some(v) = self.memo.get(k) {
                return Ok(v);
            }
        }
        let value = self.eval_uncached(expr)?;
        if let Some(k) = key {
            self.memo.insert(k, value.clone());
        }
        Ok(value)
    }

    fn eval_uncached(&self, expr: &Expr) -> Result<Value, ImseError> {
        match expr {
            Expr::Number(n) => Ok(Value::Scalar(*n)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Identifier(name) => self.resolve_identifier(name),
            Expr::UnaryPlus(e) => self.eval(e),
            Expr::UnaryMinus(e) => {
                let v = self.eval(e)?;
                binary_op(BinaryOperator::Mul, &v, &Value::Scalar(-1.0), self.config.normalize_policy)
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                let bop = match op {
                    BinOp::Add => BinaryOperator::Add,
                    BinOp::Sub => BinaryOperator::Sub,
                    BinOp::Mul => BinaryOperator::Mul,
                    BinOp::Div => BinaryOperator::Div,
                };
                binary_op(bop, &l, &r, self.config.normalize_policy)
            }
            Expr::Call { name, positional, named } => self.eval_call(name, positional, named),
        }
    }

    fn resolve_identifier(&self, name: &str) -> Result<Value, ImseError> {
        let scoped = SCOPES.with(|s| s.borrow().last().and_then(|top| top.get(name).cloned()));
        if let Some(v) = scoped {
            return Ok(v);
        }
        if let Some(v) = self.get_resolved(name) {
            return Ok(v);
        }
        if let Some(expr) = self.env.vars.get(name) {
            let v = self.eval(expr)?;
            self.bind_resolved(name, v.clone());
            return Ok(v);
        }
        Err(ImseError::Reference { name: name.to_string() })
    }

    fn eval_call(&self, name: &str, positional: &[Expr], named: &[(String, Expr)]) -> Result<Value, ImseError> {
        if let Some(builtin) = Builtin::lookup(name) {
            return self.eval_builtin(builtin, positional, named);
        }
        if let Some(func) = self.functions.get(&name.to_lowercase()).copied() {
            return self.eval_user_function(func, positional, named);
        }
        Err(ImseError::Reference { name: name.to_string() })
    }

    fn eval_user_function(&self, func: &FunctionDef, positional: &[Expr], _named: &[(String, Expr)]) -> Result<Value, ImseError> {
        if positional.len() != func.params.len() {
            return Err(ImseError::Arity { function: func.name.clone(), expected: func.params.len().to_string(), got: positional.len() });
        }
        let mut scope = HashMap::new();
        for (param, arg_expr) in func.params.iter().zip(positional.iter()) {
            scope.insert(param.clone(), self.eval(arg_expr)?);
        }
        SCOPES.with(|s| s.borrow_mut().push(scope));
        let result = (|| {
            let mut last = Value::Unit;
            for assignment in &func.body.assignments {
                last = self.eval(&assignment.expr)?;
                if let Some(var) = &assignment.var_name {
                    SCOPES.with(|s| {
                        if let Some(top) = s.borrow_mut().last_mut() {
                            top.insert(var.clone(), last.clone());
                        }
                    });
                }
            }
            Ok(last)
        })();
        SCOPES.with(|s| {
            s.borrow_mut().pop();
        });
        result
    }

    fn eval_builtin(&self, builtin: Builtin, positional: &[Expr], named: &[(String, Expr)]) -> Result<Value, ImseError> {
        let named_map: HashMap<&str, &Expr> = named.iter().map(|(k, v)| (k.as_str(), v)).collect();
        let fname = builtin.name();

        match builtin {
            Builtin::Img => {
                let shift = self.eval_scalar_arg(positional, 0, fname)?;
                self.shifts.record_shift(shift);
                self.fetch_image(shift)
            }
            Builtin::Range => {
                let from = self.eval_scalar_arg(positional, 0, fname)?;
                let to = self.eval_scalar_arg(positional, 1, fname)?;
                let step = named_map
                    .get("step")
                    .map(|e| self.eval_scalar(e))
                    .or_else(|| positional.get(2).map(|e| self.eval_scalar(e)))
                    .transpose()?
                    .unwrap_or(1.0);
                let (lo, hi) = if from <= to { (from, to) } else { (to, from) };
                let step = step.abs().max(f64::EPSILON);
                let mut out = Vec::new();
                let mut v = lo;
                while v <= hi + 1e-9 {
                    self.shifts.record_shift(v);
                    out.push(self.fetch_image(v)?);
                    v += step;
                }
                Ok(Value::List(out))
            }
            Builtin::Avg | Builtin::Min | Builtin::Max | Builtin::Median => {
                let args = self.eval_all(positional)?;
                let items = gather_items(&args)?;
                let reduction = match builtin {
                    Builtin::Avg => Reduction::Avg,
                    Builtin::Min => Reduction::Min,
                    Builtin::Max => Reduction::Max,
                    Builtin::Median => Reduction::Median,
                    _ => unreachable!(),
                };
                aggregate::aggregate(fname, &items, reduction)
            }
            Builtin::Avg2 | Builtin::Median2 => {
                let sigma = named_map.get("sigma").map(|e| self.eval_scalar(e)).transpose()?.unwrap_or(3.0);
                let args = self.eval_all(positional)?;
                let items = gather_items(&args)?;
                let reduction = if builtin == Builtin::Avg2 { Reduction::Avg } else { Reduction::Median };
                aggregate::aggregate_sigma_clipped(fname, &items, reduction, sigma)
            }
            Builtin::ImgAvg | Builtin::ImgMedian | Builtin::ImgMin | Builtin::ImgMax => {
                let arg = self.eval_one(positional, 0, fname)?;
                let reduction = match builtin {
                    Builtin::ImgAvg => Reduction::Avg,
                    Builtin::ImgMedian => Reduction::Median,
                    Builtin::ImgMin => Reduction::Min,
                    Builtin::ImgMax => Reduction::Max,
                    _ => unreachable!(),
                };
                self.map_fanout(fname, arg, |v| match v {
                    Value::MonoImage(img) => Ok(Value::Scalar(image_statistic(&img, reduction))),
                    other => Err(type_err(fname, "image", &other)),
                })
            }
            Builtin::Invert => {
                let arg = self.eval_one(positional, 0, fname)?;
                self.map_fanout(fname, arg, |v| match v {
                    Value::MonoImage(img) => Ok(Value::MonoImage(transforms::invert(&img))),
                    other => Err(type_err(fname, "image", &other)),
                })
            }
            Builtin::AsinhStretch => {
                let bp = self.eval_scalar_arg(positional, 1, fname)?;
                let s = self.eval_scalar_arg(positional, 2, fname)?;
                let arg = self.eval_one(positional, 0, fname)?;
                self.map_fanout(fname, arg, |v| match v {
                    Value::MonoImage(img) => Ok(Value::MonoImage(transforms::asinh_stretch(&img, bp, s)?)),
                    other => Err(type_err(fname, "image", &other)),
                })
            }
            Builtin::LinearStretch => {
                let lo = positional.get(1).map(|e| self.eval_scalar(e)).transpose()?;
                let hi = positional.get(2).map(|e| self.eval_scalar(e)).transpose()?;
                let arg = self.eval_one(positional, 0, fname)?;
                self.map_fanout(fname, arg, |v| match v {
                    Value::MonoImage(img) => Ok(Value::MonoImage(transforms::linear_stretch(&img, lo, hi))),
                    other => Err(type_err(fname, "image", &other)),
                })
            }
            Builtin::Clahe => {
                // `clahe(img, clip)` or `clahe(img, tileSize, bins, clip)`.
                let (tile, bins, clip) = if positional.len() >= 4 {
                    let tile = self.eval_scalar_arg(positional, 1, fname)? as usize;
                    let bins = self.eval_scalar_arg(positional, 2, fname)? as usize;
                    let clip = named_map.get("clip").map(|e| self.eval_scalar(e)).transpose()?.unwrap_or(self.eval_scalar_arg(positional, 3, fname)?);
                    (tile, bins, clip)
                } else {
                    let clip = named_map
                        .get("clip")
                        .map(|e| self.eval_scalar(e))
                        .or_else(|| positional.get(1).map(|e| self.eval_scalar(e)))
                        .transpose()?
                        .ok_or_else(|| ImseError::Arity { function: fname.to_string(), expected: "at least 2".to_string(), got: positional.len() })?;
                    (64usize, 256usize, clip)
                };
                let arg = self.eval_one(positional, 0, fname)?;
                self.map_fanout(fname, arg, |v| match v {
                    Value::MonoImage(img) => Ok(Value::MonoImage(transforms::clahe(&img, tile, bins, clip, &self.config.cancellation)?)),
                    other => Err(type_err(fname, "image", &other)),
                })
            }
            Builtin::AdjustContrast => {
                let min0 = self.eval_scalar_arg(positional, 1, fname)?;
                let max0 = self.eval_scalar_arg(positional, 2, fname)?;
                let arg = self.eval_one(positional, 0, fname)?;
                self.map_fanout(fname, arg, |v| match v {
                    Value::MonoImage(img) => Ok(Value::MonoImage(transforms::adjust_contrast(&img, min0, max0))),
                    other => Err(type_err(fname, "image", &other)),
                })
            }
            Builtin::Autocrop => {
                let arg = self.eval_one(positional, 0, fname)?;
                self.map_fanout(fname, arg, |v| match v {
                    Value::MonoImage(img) => Ok(Value::MonoImage(transforms::autocrop(&img)?)),
                    other => Err(type_err(fname, "image", &other)),
                })
            }
            Builtin::FixBanding => {
                let band = self.eval_scalar_arg(positional, 1, fname)?.max(1.0) as usize;
                let passes = self.eval_scalar_arg(positional, 2, fname)?.max(1.0) as usize;
                let arg = self.eval_one(positional, 0, fname)?;
                self.map_fanout(fname, arg, |v| match v {
                    Value::MonoImage(img) => Ok(Value::MonoImage(transforms::fix_banding(&img, band, passes, &self.config.cancellation)?)),
                    other => Err(type_err(fname, "image", &other)),
                })
            }
            Builtin::RemoveBg => {
                let tolerance = named_map
                    .get("tolerance")
                    .map(|e| self.eval_scalar(e))
                    .or_else(|| positional.get(1).map(|e| self.eval_scalar(e)))
                    .transpose()?
                    .unwrap_or(0.9);
                let arg = self.eval_one(positional, 0, fname)?;
                self.map_fanout(fname, arg, |v| match v {
                    Value::MonoImage(img) => Ok(Value::MonoImage(transforms::remove_bg(&img, tolerance, &self.config.cancellation)?)),
                    other => Err(type_err(fname, "image", &other)),
                })
            }
            Builtin::Colorize => self.eval_colorize(positional, &named_map, fname),
            Builtin::Continuum => {
                // The reference continuum image is the provider's shift-0 image by convention.
                self.shifts.set_auto_continuum();
                self.fetch_image(0.0)
            }
            Builtin::A2px => {
                let angstroms = self.eval_scalar_arg(positional, 0, fname)?;
                self.shifts.record_wavelength(angstroms);
                let dispersion = match self.ctx.params.get(crate::context::ContextToken::DetectedDispersion) {
                    Some(crate::value::MetadataValue::Scalar(d)) => d,
                    _ => 1.0,
                };
                Ok(Value::Scalar(angstroms * dispersion))
            }
            Builtin::Anim => {
                let list = self.eval_one(positional, 0, fname)?;
                let ms_per_frame = self.eval_scalar_arg(positional, 1, fname)?;
                match list {
                    Value::List(frames) => Ok(Value::String(format!("<anim:{}frames@{}ms>", frames.len(), ms_per_frame))),
                    other => Err(type_err(fname, "list of images", &other)),
                }
            }
            Builtin::Script => self.eval_script_builtin(positional, &named_map, fname),
            Builtin::Workdir => {
                let path = self.eval_str_arg(positional, 0, fname)?;
                self.side_effects.lock().unwrap().push(format!("workdir:{path}"));
                Ok(Value::Unit)
            }
        }
    }

    fn eval_colorize(&self, positional: &[Expr], named_map: &HashMap<&str, &Expr>, fname: &str) -> Result<Value, ImseError> {
        let source_expr = positional.first().ok_or_else(|| ImseError::Arity { function: fname.to_string(), expected: "2 or 7".to_string(), got: positional.len() })?;
        let source_val = self.eval(source_expr)?;

        let curve = if positional.len() == 2 && named_map.is_empty() {
            let profile_name = self.eval_str(&positional[1])?;
            self.ctx
                .profiles
                .resolve(&profile_name)
                .ok_or_else(|| ImseError::Type { function: fname.to_string(), param: "profileName".to_string(), expected: "a known color profile".to_string(), got: profile_name })?
                .curve
        } else if positional.len() >= 7 {
            let vals: Vec<f64> = positional[1..7].iter().map(|e| self.eval_scalar(e)).collect::<Result<_, _>>()?;
            // (rIn, rOut) etc. define the linear scale through the origin:
            // out = v * (out / in), clamped at the calibration point.
            let channel = |in_pt: f64, out_pt: f64| crate::value::ChannelCalibration { in_lo: 0.0, in_hi: in_pt, out_lo: 0.0, out_hi: out_pt };
            crate::value::ColorCurve { r: channel(vals[0], vals[1]), g: channel(vals[2], vals[3]), b: channel(vals[4], vals[5]) }
        } else {
            return Err(ImseError::Arity { function: fname.to_string(), expected: "2 (img, profileName) or 7 (img, rIn, rOut, gIn, gOut, bIn, bOut)".to_string(), got: positional.len() });
        };

        self.map_fanout(fname, source_val, |v| match v {
            Value::MonoImage(img) => Ok(Value::ColorizedImage(ColorizedImage { source: Arc::new(img), curve })),
            other => Err(type_err(fname, "image", &other)),
        })
    }

    fn eval_script_builtin(&self, positional: &[Expr], named_map: &HashMap<&str, &Expr>, fname: &str) -> Result<Value, ImseError> {
        let kind = self.eval_str_arg(positional, 0, fname)?;
        let source = self.eval_str_arg(positional, 1, fname)?;
        let mut vars = HashMap::new();
        if let Some(vars_expr) = positional.get(2).or_else(|| named_map.get("vars").copied()) {
            if let Value::List(items) = self.eval(vars_expr)? {
                for (i, item) in items.into_iter().enumerate() {
                    vars.insert(format!("arg{i}"), item);
                }
            }
        }
        let bridge = self.bridge.clone().ok_or_else(|| ImseError::External { kind: kind.clone(), message: "no external-script bridge configured".to_string(), stack_trace: None })?;
        let _guard = self.bridge_lock.acquire();
        bridge.invoke(&kind, &source, &vars).map_err(|e| ImseError::External { kind, message: e.message, stack_trace: e.stack_trace })
    }

    /// If `value` is a `List`, map `f` over every element (the fan-out rule
    /// of spec §4.7); otherwise apply `f` directly.
    fn map_fanout(&self, _fname: &str, value: Value, f: impl Fn(Value) -> Result<Value, ImseError> + Sync) -> Result<Value, ImseError> {
        match value {
            Value::List(items) => {
                let results: Vec<Value> = items.into_iter().map(f).collect::<Result<_, _>>()?;
                Ok(Value::List(results))
            }
            other => f(other),
        }
    }

    fn eval_all(&self, exprs: &[Expr]) -> Result<Vec<Value>, ImseError> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn eval_one(&self, positional: &[Expr], index: usize, fname: &str) -> Result<Value, ImseError> {
        let e = positional.get(index).ok_or_else(|| ImseError::Arity { function: fname.to_string(), expected: format!("at least {}", index + 1), got: positional.len() })?;
        self.eval(e)
    }

    fn eval_scalar(&self, e: &Expr) -> Result<f64, ImseError> {
        match self.eval(e)? {
            Value::Scalar(s) => Ok(s),
            other => Err(type_err("scalar argument", "scalar", &other)),
        }
    }

    fn eval_scalar_arg(&self, positional: &[Expr], index: usize, fname: &str) -> Result<f64, ImseError> {
        let e = positional.get(index).ok_or_else(|| ImseError::Arity { function: fname.to_string(), expected: format!("at least {}", index + 1), got: positional.len() })?;
        self.eval_scalar(e)
    }

    fn eval_str(&self, e: &Expr) -> Result<String, ImseError> {
        match self.eval(e)? {
            Value::String(s) => Ok(s),
            other => Err(type_err("string argument", "string", &other)),
        }
    }

    fn eval_str_arg(&self, positional: &[Expr], index: usize, fname: &str) -> Result<String, ImseError> {
        let e = positional.get(index).ok_or_else(|| ImseError::Arity { function: fname.to_string(), expected: format!("at least {}", index + 1), got: positional.len() })?;
        self.eval_str(e)
    }

    fn fetch_image(&self, shift: f64) -> Result<Value, ImseError> {
        match self.ctx.images.find_image(shift) {
            Some(crate::context::ImageOrRgb::Mono(m)) => Ok(Value::MonoImage(m)),
            Some(crate::context::ImageOrRgb::Rgb(r)) => Ok(Value::RgbImage(r)),
            None => Err(ImseError::Missing { shift }),
        }
    }
}

fn type_err(function: &str, expected: &str, got: &Value) -> ImseError {
    ImseError::Type { function: function.to_string(), param: "argument".to_string(), expected: expected.to_string(), got: got.kind_name().to_string() }
}
