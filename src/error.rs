//! Error Taxonomy
//!
//! Error types for the Image-Math Scripting Engine, named by intent rather
//! than by runtime type (tokenizer/parser failure, undefined reference,
//! built-in misuse, dimension mismatch, DAG cycle, missing image, external
//! bridge failure, cancellation). Every error that can be attributed to a
//! single script label carries that label and the original expression text
//! so it can be placed in an editor gutter.

use thiserror::Error;

/// A `[start, end)` byte offset range into the original script source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Error taxonomy for the IMSE, mirroring spec §7 one-to-one.
#[derive(Error, Debug, Clone)]
pub enum ImseError {
    #[error("syntax error at {position}: expected {expected}, got {got}")]
    Syntax {
        position: usize,
        expected: String,
        got: String,
    },

    #[error("undefined variable '{name}'")]
    Reference { name: String },

    #[error("reserved name '{name}' cannot be assigned")]
    ReservedName { name: String },

    #[error("{function}: expected {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: String,
        got: usize,
    },

    #[error("{function}: argument {param} expected {expected}, got {got}")]
    Type {
        function: String,
        param: String,
        expected: String,
        got: String,
    },

    #[error("{function}: requires {requires}")]
    Context { function: String, requires: String },

    #[error("dimension mismatch: {left_w}x{left_h} vs {right_w}x{right_h}")]
    Dimension {
        left_w: usize,
        left_h: usize,
        right_w: usize,
        right_h: usize,
    },

    #[error("circular dependency among variables: {}", variables.join(", "))]
    Circular { variables: Vec<String> },

    #[error("include cycle detected at '{path}'")]
    IncludeCycle { path: String },

    #[error("no image available for shift {shift}")]
    Missing { shift: f64 },

    #[error("external script error ({kind}): {message}")]
    External {
        kind: String,
        message: String,
        stack_trace: Option<String>,
    },

    #[error("execution cancelled")]
    Cancelled,
}

/// An error attributed to one label/expression, suitable for display in an
/// editor gutter. This is the shape the executor collects in
/// `ScriptResult::errors` — it never throws these, only returns them.
#[derive(Debug, Clone)]
pub struct InvalidExpression {
    pub label: String,
    pub expression_text: String,
    pub error: ImseError,
}

impl InvalidExpression {
    pub fn new(label: impl Into<String>, expression_text: impl Into<String>, error: ImseError) -> Self {
        Self {
            label: label.into(),
            expression_text: expression_text.into(),
            error,
        }
    }

    pub fn skipped_due_to_dependency(label: impl Into<String>, upstream: impl Into<String>) -> Self {
        let upstream = upstream.into();
        Self {
            label: label.into(),
            expression_text: String::new(),
            error: ImseError::Reference {
                name: format!("skipped: depends on failed variable '{upstream}'"),
            },
        }
    }
}
