//! Built-in function registry (spec §4.7).
//!
//! Each built-in has a name, an arity profile, a concurrency classification
//! used by the dependency analyzer (§4.4) and scheduler (§4.5), and an
//! effect kind. Dispatch is case-insensitive on the call name; named
//! arguments use lower-case keys.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinConcurrency {
    /// Ordinary pure function: safe to run in any parallel level.
    Pure,
    /// Has externally-visible side effects; must execute in script order.
    Stateful,
    /// Pure, but backed by a non-reentrant external resource; must run
    /// singly even though it may run alongside independent pure nodes.
    NonConcurrent,
    /// Accepts a list argument whose elements may be fanned out across
    /// worker threads.
    ParallelList,
    /// Not a recognized built-in (user function or unresolved identifier).
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Img,
    Range,
    Avg,
    Min,
    Max,
    Median,
    Avg2,
    Median2,
    ImgAvg,
    ImgMedian,
    ImgMin,
    ImgMax,
    Invert,
    AsinhStretch,
    LinearStretch,
    Clahe,
    AdjustContrast,
    Autocrop,
    FixBanding,
    Colorize,
    RemoveBg,
    Continuum,
    A2px,
    Anim,
    Script,
    Workdir,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Img => "img",
            Builtin::Range => "range",
            Builtin::Avg => "avg",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Median => "median",
            Builtin::Avg2 => "avg2",
            Builtin::Median2 => "median2",
            Builtin::ImgAvg => "img_avg",
            Builtin::ImgMedian => "img_median",
            Builtin::ImgMin => "img_min",
            Builtin::ImgMax => "img_max",
            Builtin::Invert => "invert",
            Builtin::AsinhStretch => "asinh_stretch",
            Builtin::LinearStretch => "linear_stretch",
            Builtin::Clahe => "clahe",
            Builtin::AdjustContrast => "adjust_contrast",
            Builtin::Autocrop => "autocrop",
            Builtin::FixBanding => "fix_banding",
            Builtin::Colorize => "colorize",
            Builtin::RemoveBg => "remove_bg",
            Builtin::Continuum => "continuum",
            Builtin::A2px => "a2px",
            Builtin::Anim => "anim",
            Builtin::Script => "script",
            Builtin::Workdir => "workdir",
        }
    }

    pub fn lookup(name: &str) -> Option<Builtin> {
        let lower = name.to_lowercase();
        ALL.iter().copied().find(|b| b.name() == lower)
    }

    pub fn concurrency(self) -> BuiltinConcurrency {
        match self {
            Builtin::Workdir => BuiltinConcurrency::Stateful,
            Builtin::Script => BuiltinConcurrency::NonConcurrent,
            Builtin::Invert
            | Builtin::AsinhStretch
            | Builtin::LinearStretch
            | Builtin::Clahe
            | Builtin::AdjustContrast
            | Builtin::Autocrop
            | Builtin::FixBanding
            | Builtin::Colorize
            | Builtin::RemoveBg
            | Builtin::ImgAvg
            | Builtin::ImgMedian
            | Builtin::ImgMin
            | Builtin::ImgMax => BuiltinConcurrency::ParallelList,
            Builtin::Img
            | Builtin::Range
            | Builtin::Avg
            | Builtin::Min
            | Builtin::Max
            | Builtin::Median
            | Builtin::Avg2
            | Builtin::Median2
            | Builtin::Continuum
            | Builtin::A2px
            | Builtin::Anim => BuiltinConcurrency::Pure,
        }
    }
}

const ALL: &[Builtin] = &[
    Builtin::Img,
    Builtin::Range,
    Builtin::Avg,
    Builtin::Min,
    Builtin::Max,
    Builtin::Median,
    Builtin::Avg2,
    Builtin::Median2,
    Builtin::ImgAvg,
    Builtin::ImgMedian,
    Builtin::ImgMin,
    Builtin::ImgMax,
    Builtin::Invert,
    Builtin::AsinhStretch,
    Builtin::LinearStretch,
    Builtin::Clahe,
    Builtin::AdjustContrast,
    Builtin::Autocrop,
    Builtin::FixBanding,
    Builtin::Colorize,
    Builtin::RemoveBg,
    Builtin::Continuum,
    Builtin::A2px,
    Builtin::Anim,
    Builtin::Script,
    Builtin::Workdir,
];

/// Used by the dependency analyzer: classify a call by name, defaulting to
/// `Unknown` for anything that isn't a recognized built-in (user function
/// or unresolved identifier — those are not flagged as stateful or
/// non-concurrent here; see `crate::analysis`).
pub fn builtin_concurrency(name: &str) -> BuiltinConcurrency {
    Builtin::lookup(name).map(Builtin::concurrency).unwrap_or(BuiltinConcurrency::Unknown)
}
