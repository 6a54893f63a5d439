//! Script-level parsing: combines the line tokenizer with the expression
//! parser to assemble a full [`crate::ast::Script`] (spec §4.1–§4.3, §6.1).

pub mod expr_lexer;
pub mod expr_parser;

pub use expr_parser::{parse_strict as parse_expr_strict, parse_tolerant as parse_expr_tolerant};

use crate::ast::*;
use crate::error::{ImseError, InvalidExpression, Span};
use crate::tokenizer::{is_ident, tokenize, Token, TokenKind};

/// Parse mode: strict aborts on the first syntax error (used by the
/// executor); tolerant keeps going and records every error in place (used
/// by editor tooling).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Strict,
    Tolerant,
}

pub struct ParseOutcome {
    pub script: Script,
    pub errors: Vec<InvalidExpression>,
}

/// Parse full script source into a [`Script`] AST. Does not resolve
/// `include` directives or inline function bodies; see `crate::include`.
pub fn parse_script(source: &str, mode: ParseMode) -> Result<ParseOutcome, ImseError> {
    let tokens = tokenize(source);
    let mut script = Script::default();
    let mut errors = Vec::new();

    let mut cur_section: Option<Section> = None;
    let mut cur_function: Option<(String, Vec<String>, Section)> = None;
    let mut meta = MetaBlock::default();
    let mut params = ParamsBlock::default();
    let mut in_meta = false;
    let mut in_params = false;

    let flush_section = |cur: &mut Option<Section>, script: &mut Script| {
        if let Some(s) = cur.take() {
            script.sections.push(s);
        }
    };

    for tok in &tokens {
        match &tok.kind {
            TokenKind::Whitespace | TokenKind::Comment => {}
            TokenKind::Section { name } => {
                if let Some((fname, fparams, body)) = cur_function.take() {
                    script.functions.push(FunctionDef { name: fname, params: fparams, body });
                }
                in_meta = name.eq_ignore_ascii_case("meta");
                in_params = name.eq_ignore_ascii_case("params");
                if in_params {
                    flush_section(&mut cur_section, &mut script);
                    continue;
                }
                if in_meta {
                    flush_section(&mut cur_section, &mut script);
                    continue;
                }
                flush_section(&mut cur_section, &mut script);
                let kind = section_kind(name);
                cur_section = Some(Section::new(name.clone(), kind));
            }
            TokenKind::BatchSection { name } => {
                flush_section(&mut cur_section, &mut script);
                cur_section = Some(Section::new(name.clone(), SectionKind::Batch));
            }
            TokenKind::VariableDefinition { name, expr_text } => {
                if in_meta {
                    meta.raw.push((name.clone(), expr_text.clone()));
                    continue;
                }
                if in_params {
                    params.params.push(ParameterDef { name: name.clone(), type_hint: None, default: parse_param_default(expr_text) });
                    continue;
                }
                // `name(args) = body` style function defs are not part of
                // this grammar; function defs use a dedicated header
                // elsewhere, so a bare name= inside a pending function name
                // capture is unreachable here.
                let expr = match parse_assignment_expr(expr_text, mode, &mut errors, name) {
                    Some(e) => e,
                    None => continue,
                };
                let span = tok.span;
                let assignment = Assignment { var_name: Some(name.clone()), expr, expr_text: expr_text.clone(), span };
                push_assignment(&mut cur_section, &mut cur_function, assignment);
            }
            TokenKind::Include { path } => {
                if in_meta || in_params {
                    continue;
                }
                script.unresolved_includes.push(IncludeDef::Unresolved { path: path.clone(), reason: "not yet resolved".to_string() });
            }
            TokenKind::Expression { expr_text } => {
                if in_meta || in_params {
                    continue;
                }
                if let Some((fname, fparams)) = try_parse_function_header(expr_text) {
                    if let Some((prev_name, prev_params, body)) = cur_function.take() {
                        script.functions.push(FunctionDef { name: prev_name, params: prev_params, body });
                    }
                    let body = Section::new(fname.clone(), SectionKind::FunctionBody);
                    cur_function = Some((fname, fparams, body));
                    continue;
                }
                let synthesized = synthesize_label(&cur_section, &cur_function);
                let expr = match parse_assignment_expr(expr_text, mode, &mut errors, &synthesized) {
                    Some(e) => e,
                    None => continue,
                };
                let span = tok.span;
                let assignment = Assignment { var_name: None, expr, expr_text: expr_text.clone(), span };
                push_assignment(&mut cur_section, &mut cur_function, assignment);
            }
            TokenKind::Invalid => {
                // Tokenizer-level invalid lines never abort the whole parse
                // (spec §4.1: tolerant tokenizer) even in strict mode.
                errors.push(InvalidExpression::new(
                    "<invalid>",
                    tok.text.clone(),
                    ImseError::Syntax { position: span_start(tok.span), expected: "valid statement".to_string(), got: tok.text.clone() },
                ));
            }
        }
    }

    if let Some((fname, fparams, body)) = cur_function.take() {
        script.functions.push(FunctionDef { name: fname, params: fparams, body });
    }
    flush_section(&mut cur_section, &mut script);

    if !meta.raw.is_empty() {
        script.meta = Some(meta);
    }
    if !params.params.is_empty() {
        script.params = Some(params);
    }

    Ok(ParseOutcome { script, errors })
}

fn span_start(span: Span) -> usize {
    span.start
}

fn push_assignment(cur_section: &mut Option<Section>, cur_function: &mut Option<(String, Vec<String>, Section)>, a: Assignment) {
    if let Some((_, _, body)) = cur_function.as_mut() {
        body.assignments.push(a);
        return;
    }
    if cur_section.is_none() {
        *cur_section = Some(Section::new("", SectionKind::Anonymous));
    }
    cur_section.as_mut().unwrap().assignments.push(a);
}

fn synthesize_label(cur_section: &Option<Section>, cur_function: &Option<(String, Vec<String>, Section)>) -> String {
    let n = cur_function.as_ref().map(|(_, _, b)| b.assignments.len()).unwrap_or_else(|| cur_section.as_ref().map(|s| s.assignments.len()).unwrap_or(0));
    format!("_anon_{n}")
}

fn parse_assignment_expr(expr_text: &str, mode: ParseMode, errors: &mut Vec<InvalidExpression>, label: &str) -> Option<Expr> {
    match mode {
        ParseMode::Strict => match expr_parser::parse_strict(expr_text) {
            Ok(e) => Some(e),
            Err(e) => {
                errors.push(InvalidExpression::new(label, expr_text, e));
                None
            }
        },
        ParseMode::Tolerant => {
            let r = expr_parser::parse_tolerant(expr_text);
            for e in r.errors {
                errors.push(InvalidExpression::new(label, expr_text, e));
            }
            Some(r.expr)
        }
    }
}

fn section_kind(name: &str) -> SectionKind {
    match name.to_lowercase().as_str() {
        "tmp" => SectionKind::Tmp,
        "outputs" => SectionKind::Outputs,
        "params" => SectionKind::Params,
        "" => SectionKind::Anonymous,
        _ => SectionKind::Single,
    }
}

fn parse_param_default(expr_text: &str) -> Option<Expr> {
    expr_parser::parse_strict(expr_text).ok()
}

/// `def name(a, b, c)` style function header recognition. Not part of the
/// core expression grammar; recognized at the script-assembly layer.
fn try_parse_function_header(text: &str) -> Option<(String, Vec<String>)> {
    let t = text.trim();
    let rest = t.strip_prefix("def ")?;
    let open = rest.find('(')?;
    let name = rest[..open].trim();
    if !is_ident(name) {
        return None;
    }
    let close = rest.rfind(')')?;
    if close < open {
        return None;
    }
    let params_str = &rest[open + 1..close];
    let params: Vec<String> = params_str.split(|c| c == ',' || c == ';').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
    for p in &params {
        if !is_ident(p) {
            return None;
        }
    }
    Some((name.to_string(), params))
}
