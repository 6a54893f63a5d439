//! Abstract Syntax Tree
//!
//! Node types produced by the parser (§4.2) after include inlining (§4.3):
//! a `Script` is an ordered list of an optional meta block, function
//! definitions, and sections; a `Section` holds ordered assignments and
//! bare expressions; an `Expr` is the recursive-descent expression tree.

use crate::error::Span;
use std::fmt;

/// Literal / identifier / operator expression tree (spec §3, §4.2).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Identifier(String),
    UnaryPlus(Box<Expr>),
    UnaryMinus(Box<Expr>),
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    Call { name: String, positional: Vec<Expr>, named: Vec<(String, Expr)> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        };
        write!(f, "{s}")
    }
}

impl Expr {
    /// Canonical textual form used as the memoization key (spec §9: hash
    /// the AST shape, not the literal source text, so that e.g.
    /// `img(1)+img(-1)` and `img(-1)+img(1)` only share a cache entry when
    /// they are structurally identical expressions, never by text accident).
    pub fn canonical(&self) -> String {
        match self {
            Expr::Number(n) => format!("{n:?}"),
            Expr::Str(s) => format!("{s:?}"),
            Expr::Identifier(name) => format!("id:{name}"),
            Expr::UnaryPlus(e) => format!("(+{})", e.canonical()),
            Expr::UnaryMinus(e) => format!("(-{})", e.canonical()),
            Expr::Binary { op, left, right } => format!("({} {} {})", left.canonical(), op, right.canonical()),
            Expr::Call { name, positional, named } => {
                let mut pos: Vec<String> = positional.iter().map(Expr::canonical).collect();
                let mut nam: Vec<String> = named.iter().map(|(k, v)| format!("{k}={}", v.canonical())).collect();
                nam.sort();
                pos.append(&mut nam);
                format!("{}({})", name.to_lowercase(), pos.join(","))
            }
        }
    }

    /// Walks every identifier referenced anywhere in the expression.
    pub fn for_each_identifier(&self, f: &mut impl FnMut(&str)) {
        match self {
            Expr::Number(_) | Expr::Str(_) => {}
            Expr::Identifier(name) => f(name),
            Expr::UnaryPlus(e) | Expr::UnaryMinus(e) => e.for_each_identifier(f),
            Expr::Binary { left, right, .. } => {
                left.for_each_identifier(f);
                right.for_each_identifier(f);
            }
            Expr::Call { positional, named, .. } => {
                for a in positional {
                    a.for_each_identifier(f);
                }
                for (_, a) in named {
                    a.for_each_identifier(f);
                }
            }
        }
    }

    /// Walks every function call name reachable from the expression.
    pub fn for_each_call(&self, f: &mut impl FnMut(&str, &[Expr], &[(String, Expr)])) {
        match self {
            Expr::Number(_) | Expr::Str(_) | Expr::Identifier(_) => {}
            Expr::UnaryPlus(e) | Expr::UnaryMinus(e) => e.for_each_call(f),
            Expr::Binary { left, right, .. } => {
                left.for_each_call(f);
                right.for_each_call(f);
            }
            Expr::Call { name, positional, named } => {
                f(name, positional, named);
                for a in positional {
                    a.for_each_call(f);
                }
                for (_, a) in named {
                    a.for_each_call(f);
                }
            }
        }
    }
}

/// A single `name = expr` or anonymous `expr` statement inside a section.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// `None` for an anonymous output; the analyzer synthesizes a label.
    pub var_name: Option<String>,
    pub expr: Expr,
    pub expr_text: String,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Single,
    Batch,
    Tmp,
    Outputs,
    Params,
    FunctionBody,
    /// An anonymous top-level section (no `[name]` header seen yet).
    Anonymous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub name: String,
    pub kind: SectionKind,
    pub assignments: Vec<Assignment>,
}

impl Section {
    pub fn new(name: impl Into<String>, kind: SectionKind) -> Self {
        Self { name: name.into(), kind, assignments: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Section,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDef {
    pub name: String,
    pub type_hint: Option<String>,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamsBlock {
    pub params: Vec<ParameterDef>,
}

/// An `include "path"` directive. Resolution happens in `crate::include`;
/// an unresolved node stays in the tree as an error marker rather than
/// aborting the parse.
#[derive(Debug, Clone, PartialEq)]
pub enum IncludeDef {
    Resolved { path: String },
    Unresolved { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetaBlock {
    pub raw: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    pub meta: Option<MetaBlock>,
    pub params: Option<ParamsBlock>,
    pub functions: Vec<FunctionDef>,
    pub sections: Vec<Section>,
    /// Unresolved includes kept around purely for diagnostics.
    pub unresolved_includes: Vec<IncludeDef>,
}
