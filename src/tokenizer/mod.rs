//! Tokenizer
//!
//! Line-oriented scan over the full script text (spec §4.1, §6.1). Produces
//! an ordered token stream with byte offsets and the original text
//! preserved verbatim, so `render(tokenize(s)) == s` byte-for-byte (the
//! round-trip property exercised in `tests/`).
//!
//! The tokenizer is deliberately tolerant: a line that fails to scan as a
//! section header, assignment, or expression becomes an `Invalid` token
//! carrying the original text; downstream stages still see the enclosing
//! section. Multi-line triple-quoted string literals are consumed as one
//! expression token even when they span many physical lines, and section
//! headers inside such a literal do not start a new section.

use crate::error::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Comment,
    /// `[name]`
    Section { name: String },
    /// `[[name]]`
    BatchSection { name: String },
    /// `name = expr`
    VariableDefinition { name: String, expr_text: String },
    /// A bare expression on its own line (anonymous output).
    Expression { expr_text: String },
    /// `include "path"` (spec §4.3): not an expression in this grammar (a
    /// bare identifier followed by a string literal), so it gets its own
    /// token rather than falling into the expression-parse fallback.
    Include { path: String },
    Whitespace,
    Invalid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// The verbatim original text of the line(s) this token covers.
    pub text: String,
}

const TRIPLE_QUOTE: &str = "\"\"\"";

/// Tokenize full script source into an ordered stream.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let bytes_total = source.len();
    let mut offset = 0usize;
    let mut rest = source;

    while !rest.is_empty() {
        let (line_text, consumed) = next_logical_line(rest);
        let start = offset;
        let end = (offset + consumed).min(bytes_total);
        tokens.push(classify_line(line_text, start, end));
        rest = &rest[consumed..];
        offset = end;
    }
    tokens
}

/// Returns the next "logical line": a physical line, or — if it opens an
/// unterminated triple-quoted string — every physical line up to and
/// including the line that closes it. The returned text includes its line
/// terminator(s) verbatim (`\n`, `\r\n`, or none at all for a final
/// unterminated line) so that `render(tokenize(s)) == s` byte-for-byte
/// (spec §8): classification trims its own copy of the text, but nothing
/// downstream ever reconstructs a terminator from scratch. Returns
/// `(raw_text, bytes_consumed)` — `raw_text.len() == bytes_consumed`.
fn next_logical_line(rest: &str) -> (&str, usize) {
    let first_nl = rest.find('\n');
    let first_line_end = first_nl.map(|i| i + 1).unwrap_or(rest.len());
    let first_line = match first_nl {
        Some(i) => &rest[..i],
        None => rest,
    };

    let quote_count = first_line.matches(TRIPLE_QUOTE).count();
    if quote_count % 2 == 0 {
        return (&rest[..first_line_end], first_line_end);
    }

    // Odd number of triple-quotes: scan forward until the string closes.
    let mut consumed = first_line_end;
    loop {
        if consumed >= rest.len() {
            return (&rest[..consumed], consumed);
        }
        let remainder = &rest[consumed..];
        let nl = remainder.find('\n');
        let line_end = nl.map(|i| i + 1).unwrap_or(remainder.len());
        let line = match nl {
            Some(i) => &remainder[..i],
            None => remainder,
        };
        consumed += line_end;
        if line.contains(TRIPLE_QUOTE) {
            return (&rest[..consumed], consumed);
        }
        if nl.is_none() {
            return (&rest[..consumed], consumed);
        }
    }
}

fn classify_line(line: &str, start: usize, end: usize) -> Token {
    let span = Span::new(start, end);
    let trimmed = line.trim();

    if trimmed.is_empty() {
        return Token { kind: TokenKind::Whitespace, span, text: line.to_string() };
    }
    if trimmed.starts_with('#') || trimmed.starts_with("//") {
        return Token { kind: TokenKind::Comment, span, text: line.to_string() };
    }
    if let Some(name) = parse_batch_section_header(trimmed) {
        return Token { kind: TokenKind::BatchSection { name }, span, text: line.to_string() };
    }
    if let Some(name) = parse_section_header(trimmed) {
        return Token { kind: TokenKind::Section { name }, span, text: line.to_string() };
    }
    if let Some((name, expr_text)) = split_assignment(trimmed) {
        return Token { kind: TokenKind::VariableDefinition { name, expr_text }, span, text: line.to_string() };
    }

    let (code, _comment) = strip_trailing_comment(trimmed);
    let code = code.trim();
    if let Some(path) = parse_include_line(code) {
        return Token { kind: TokenKind::Include { path }, span, text: line.to_string() };
    }

    let expr_text = code.to_string();
    if expr_text.is_empty() || crate::parser::expr_parser::parse_strict(&expr_text).is_err() {
        return Token { kind: TokenKind::Invalid, span, text: line.to_string() };
    }
    Token { kind: TokenKind::Expression { expr_text }, span, text: line.to_string() }
}

/// Recognizes `include "path"`: a bare `include` keyword followed by a
/// double-quoted path, with nothing trailing it. This is not part of the
/// expression grammar (§4.2) — `include` parses as a bare identifier and
/// the following string literal is an unexpected trailing token — so it
/// must be detected here, before the generic expression-parse fallback.
fn parse_include_line(code: &str) -> Option<String> {
    let rest = code.strip_prefix("include")?;
    let rest = rest.strip_prefix(char::is_whitespace)?.trim_start();
    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;
    if rest[end + 1..].trim().is_empty() {
        Some(rest[..end].to_string())
    } else {
        None
    }
}

fn parse_section_header(trimmed: &str) -> Option<String> {
    if trimmed.starts_with("[[") || !trimmed.starts_with('[') || !trimmed.ends_with(']') {
        return None;
    }
    let inner = &trimmed[1..trimmed.len() - 1];
    if is_valid_ident_or_empty(inner) {
        Some(inner.to_string())
    } else {
        None
    }
}

fn parse_batch_section_header(trimmed: &str) -> Option<String> {
    if !trimmed.starts_with("[[") || !trimmed.ends_with("]]") || trimmed.len() < 4 {
        return None;
    }
    let inner = &trimmed[2..trimmed.len() - 2];
    if is_valid_ident_or_empty(inner) {
        Some(inner.to_string())
    } else {
        None
    }
}

fn is_valid_ident_or_empty(s: &str) -> bool {
    if s.is_empty() {
        return true;
    }
    is_ident(s)
}

pub fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Splits `name = expr [# comment]` at the top-level `=`. Returns `None` if
/// the line doesn't start with a bare identifier followed by `=` (so `==`
/// or identifiers inside a later expression don't get misread).
fn split_assignment(trimmed: &str) -> Option<(String, String)> {
    let mut chars = trimmed.char_indices().peekable();
    let ident_start = match chars.peek() {
        Some(&(_, c)) if c.is_ascii_alphabetic() || c == '_' => true,
        _ => false,
    };
    if !ident_start {
        return None;
    }
    let mut end = 0;
    for (i, c) in trimmed.char_indices() {
        if c.is_ascii_alphanumeric() || c == '_' {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    let name = &trimmed[..end];
    if name.is_empty() || !is_ident(name) {
        return None;
    }
    let remainder = trimmed[end..].trim_start();
    let mut rem_chars = remainder.chars();
    if rem_chars.next() != Some('=') {
        return None;
    }
    let after_eq = &remainder[1..];
    if after_eq.starts_with('=') {
        // `==` is not an assignment in this grammar.
        return None;
    }
    let (expr_text, _comment) = strip_trailing_comment(after_eq.trim_start());
    Some((name.to_string(), expr_text.trim().to_string()))
}

/// Strips a trailing `#`/`//` comment that is not inside a string literal.
/// Returns `(code, comment_or_empty)`.
fn strip_trailing_comment(s: &str) -> (&str, &str) {
    let mut in_string = false;
    let mut escape = false;
    let chars: Vec<(usize, char)> = s.char_indices().collect();
    let mut i = 0;
    while i < chars.len() {
        let (idx, c) = chars[i];
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match c {
            '"' => in_string = true,
            '#' => return (&s[..idx], &s[idx..]),
            '/' if chars.get(i + 1).map(|&(_, c2)| c2) == Some('/') => return (&s[..idx], &s[idx..]),
            _ => {}
        }
        i += 1;
    }
    (s, "")
}

/// Renders a token stream back to source text. Every token's `text` already
/// carries its own original line terminator (or none, for a final
/// unterminated line), so reassembly is a plain concatenation — no
/// separator or trailing newline is invented here, which is what makes
/// `render(tokenize(s)) == s` hold byte-for-byte (spec §8).
pub fn render(tokens: &[Token]) -> String {
    tokens.iter().map(|t| t.text.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_section_and_assignment() {
        let toks = tokenize("[outputs]\na = img(0)\n");
        assert_eq!(toks.len(), 2);
        assert!(matches!(toks[0].kind, TokenKind::Section { ref name } if name == "outputs"));
        assert!(matches!(&toks[1].kind, TokenKind::VariableDefinition { name, expr_text } if name == "a" && expr_text == "img(0)"));
    }

    #[test]
    fn batch_section_header() {
        let toks = tokenize("[[batch]]\n");
        assert!(matches!(&toks[0].kind, TokenKind::BatchSection { name } if name == "batch"));
    }

    #[test]
    fn comment_after_assignment() {
        let toks = tokenize("a = img(0) # first frame\n");
        assert!(matches!(&toks[0].kind, TokenKind::VariableDefinition { expr_text, .. } if expr_text == "img(0)"));
    }

    #[test]
    fn multiline_triple_quoted_string_is_one_token() {
        let src = "x = \"\"\"line one\n[not_a_section]\nline three\"\"\"\n";
        let toks = tokenize(src);
        assert_eq!(toks.len(), 1);
        assert!(matches!(&toks[0].kind, TokenKind::VariableDefinition { name, .. } if name == "x"));
    }

    #[test]
    fn invalid_line_recorded_but_tolerated() {
        let toks = tokenize("+++\n");
        assert!(matches!(toks[0].kind, TokenKind::Invalid));
    }

    #[test]
    fn recognizes_include_directive() {
        let toks = tokenize("include \"shared.imse\"\n");
        assert!(matches!(&toks[0].kind, TokenKind::Include { path } if path == "shared.imse"));
    }

    #[test]
    fn round_trip_is_byte_exact() {
        for src in [
            "[outputs]\na = img(0)\nb = (a + 1) * 2 # comment\n",
            "x = \"\"\"line one\n[not_a_section]\nline three\"\"\"\ny = x\n",
            "include \"shared.imse\"\nz = 1\n",
            "a = 1\nb = 2",
            "",
        ] {
            assert_eq!(render(&tokenize(src)), src, "round-trip mismatch for {src:?}");
        }
    }

    #[test]
    fn round_trip_preserves_crlf() {
        let src = "a = 1\r\nb = 2\r\n";
        assert_eq!(render(&tokenize(src)), src);
    }
}
