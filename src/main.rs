use clap::Parser;
use imse::{CancellationToken, ExecutionConfig, ExecutionContext, ExecutionMode, ImageOrRgb, ImageProvider, MonoImage, NormalizePolicy, ParamSupplier, ProgressBroadcaster, ScriptExecutor};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imse")]
#[command(about = "Image-Math Scripting Engine - ad-hoc script runner")]
#[command(version)]
struct Cli {
    /// Script file to execute. Reads stdin if omitted.
    #[arg()]
    script_file: Option<PathBuf>,

    /// Execution mode.
    #[arg(long, value_enum, default_value = "single")]
    mode: ModeArg,

    /// Emit the dependency DAG as Graphviz DOT instead of executing.
    #[arg(long)]
    dot: bool,

    /// Output results as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    Single,
    Batch,
}

/// A stub image provider for ad-hoc CLI runs: every shift resolves to a
/// flat 4x4 mono image whose pixel value equals the shift, so a script can
/// be smoke-tested without a real reconstruction pipeline wired in.
struct StubImageProvider;

impl ImageProvider for StubImageProvider {
    fn find_image(&self, shift: f64) -> Option<ImageOrRgb> {
        Some(ImageOrRgb::Mono(MonoImage::new(4, 4, vec![shift as f32; 16])))
    }
}

struct NoParams;
impl ParamSupplier for NoParams {
    fn get(&self, _token: imse::context::ContextToken) -> Option<imse::value::MetadataValue> {
        None
    }
}

struct StderrProgress;
impl ProgressBroadcaster for StderrProgress {
    fn broadcast(&self, fraction_done: f64, label: &str) {
        tracing::info!(fraction_done, label, "progress");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_env("IMSE_LOG").unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let cli = Cli::parse();

    let (source, base_dir) = if let Some(path) = &cli.script_file {
        match std::fs::read_to_string(path) {
            Ok(content) => (content, path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."))),
            Err(e) => {
                eprintln!("error: cannot read script file {}: {e}", path.display());
                std::process::exit(1);
            }
        }
    } else {
        let mut buf = String::new();
        if std::io::stdin().read_to_string(&mut buf).is_err() {
            eprintln!("error: failed to read script from stdin");
            std::process::exit(1);
        }
        (buf, PathBuf::from("."))
    };

    if source.trim().is_empty() {
        eprintln!("error: no script provided");
        std::process::exit(1);
    }

    let config = ExecutionConfig { thread_pool_size: None, normalize_policy: NormalizePolicy::RebaseNonNegative, cancellation: CancellationToken::new() };
    let executor = ScriptExecutor::new(config);
    let mode = match cli.mode {
        ModeArg::Single => ExecutionMode::Single,
        ModeArg::Batch => ExecutionMode::Batch,
    };

    if cli.dot {
        match executor.build_dag(&source, &base_dir, mode) {
            Ok((nodes, dag)) => {
                println!("{}", imse::dot::render(&nodes, &dag));
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("error: cannot build dependency graph: {e}");
                std::process::exit(1);
            }
        }
    }

    let ctx = ExecutionContext::new(Arc::new(StubImageProvider), Arc::new(NoParams), Arc::new(StderrProgress));
    let result = executor.execute(&source, &base_dir, mode, &ctx);

    if cli.json {
        let images: Vec<&str> = result.images.keys().map(String::as_str).collect();
        let values: serde_json::Map<String, serde_json::Value> = result
            .values
            .iter()
            .map(|(k, v)| {
                let rendered = match v {
                    imse::Value::Scalar(s) => serde_json::json!(s),
                    imse::Value::String(s) => serde_json::json!(s),
                    _ => serde_json::Value::Null,
                };
                (k.clone(), rendered)
            })
            .collect();
        let errors: Vec<serde_json::Value> = result.errors.iter().map(|e| serde_json::json!({"label": e.label, "error": e.error.to_string()})).collect();
        println!(
            "{}",
            serde_json::json!({
                "images": images,
                "values": values,
                "errors": errors,
                "variableShifts": result.variable_shifts,
                "expressionShifts": result.expression_shifts,
                "autoWavelengths": result.auto_wavelengths,
                "usesAutoContinuum": result.uses_auto_continuum,
            })
        );
    } else {
        println!("images: {}", result.images.keys().cloned().collect::<Vec<_>>().join(", "));
        for (k, v) in &result.values {
            println!("{k} = {v:?}");
        }
        for e in &result.errors {
            eprintln!("error in '{}': {}", e.label, e.error);
        }
        println!("variable shifts: {:?}", result.variable_shifts);
        println!("expression shifts: {:?}", result.expression_shifts);
        if result.uses_auto_continuum {
            println!("uses auto continuum");
        }
    }

    let had_errors = !result.errors.is_empty();
    std::process::exit(if had_errors { 1 } else { 0 });
}
