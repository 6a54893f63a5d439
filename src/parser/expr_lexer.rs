//! Character-level lexer for a single expression (spec §4.2, §6.1).
//!
//! This is distinct from the line-oriented tokenizer in `crate::tokenizer`:
//! it scans the text already carved out as one expression (the right-hand
//! side of an assignment, or a bare expression line) into the small token
//! set the recursive-descent parser consumes.

use crate::error::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum ExprTok {
    Number(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Eq,
    Comma,
    Semicolon,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lexed {
    pub tok: ExprTok,
    pub span: Span,
}

pub fn lex(input: &str) -> Result<Vec<Lexed>, (usize, String)> {
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len();
    let mut i = 0usize;
    let mut out = Vec::new();

    while i < len {
        let start = i;
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c == '"' {
            // Triple-quoted?
            if chars.get(i + 1) == Some(&'"') && chars.get(i + 2) == Some(&'"') {
                let (s, consumed) = lex_triple_quoted(&chars, i)?;
                out.push(Lexed { tok: ExprTok::Str(s), span: Span::new(start, i + consumed) });
                i += consumed;
                continue;
            }
            let (s, consumed) = lex_quoted(&chars, i)?;
            out.push(Lexed { tok: ExprTok::Str(s), span: Span::new(start, i + consumed) });
            i += consumed;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).map(|d| d.is_ascii_digit()).unwrap_or(false)) {
            let (n, consumed) = lex_number(&chars, i);
            out.push(Lexed { tok: ExprTok::Number(n), span: Span::new(start, i + consumed) });
            i += consumed;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let mut j = i + 1;
            while j < len && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                j += 1;
            }
            let ident: String = chars[i..j].iter().collect();
            out.push(Lexed { tok: ExprTok::Ident(ident), span: Span::new(start, j) });
            i = j;
            continue;
        }

        let tok = match c {
            '+' => ExprTok::Plus,
            '-' => ExprTok::Minus,
            '*' => ExprTok::Star,
            '/' => ExprTok::Slash,
            '(' => ExprTok::LParen,
            ')' => ExprTok::RParen,
            '=' => ExprTok::Eq,
            ',' => ExprTok::Comma,
            ';' => ExprTok::Semicolon,
            other => return Err((start, format!("unexpected character '{other}'"))),
        };
        out.push(Lexed { tok, span: Span::new(start, i + 1) });
        i += 1;
    }

    out.push(Lexed { tok: ExprTok::Eof, span: Span::new(len, len) });
    Ok(out)
}

fn lex_number(chars: &[char], start: usize) -> (f64, usize) {
    let mut j = start;
    let len = chars.len();
    while j < len && chars[j].is_ascii_digit() {
        j += 1;
    }
    if j < len && chars[j] == '.' {
        j += 1;
        while j < len && chars[j].is_ascii_digit() {
            j += 1;
        }
    }
    let text: String = chars[start..j].iter().collect();
    let value = text.parse::<f64>().unwrap_or(f64::NAN);
    (value, j - start)
}

fn lex_quoted(chars: &[char], start: usize) -> Result<(String, usize), (usize, String)> {
    let len = chars.len();
    let mut j = start + 1;
    let mut out = String::new();
    loop {
        if j >= len {
            return Err((start, "unterminated string literal".to_string()));
        }
        match chars[j] {
            '"' => {
                j += 1;
                break;
            }
            '\\' => {
                j += 1;
                if j >= len {
                    return Err((start, "unterminated escape sequence".to_string()));
                }
                out.push(match chars[j] {
                    'n' => '\n',
                    't' => '\t',
                    '"' => '"',
                    '\\' => '\\',
                    other => other,
                });
                j += 1;
            }
            c => {
                out.push(c);
                j += 1;
            }
        }
    }
    Ok((out, j - start))
}

fn lex_triple_quoted(chars: &[char], start: usize) -> Result<(String, usize), (usize, String)> {
    let len = chars.len();
    let mut j = start + 3;
    let content_start = j;
    loop {
        if j >= len {
            return Err((start, "unterminated triple-quoted string".to_string()));
        }
        if chars[j] == '"' && chars.get(j + 1) == Some(&'"') && chars.get(j + 2) == Some(&'"') {
            let s: String = chars[content_start..j].iter().collect();
            return Ok((s, j + 3 - start));
        }
        j += 1;
    }
}
