//! Recursive-descent expression parser (spec §4.2).
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := factor (('*' | '/') factor)*
//! factor  := ('+' | '-')? atom
//! atom    := NUMBER | STRING | IDENT | IDENT '(' args? ')' | '(' expr ')'
//! args    := arg (separator arg)*
//! arg     := IDENT '=' expr | expr
//! ```
//! `* /` binds tighter than `+ -`; all binary operators are left-associative;
//! unary `+ -` bind tighter than binary. Function calls accept positional
//! arguments followed by named arguments; `,` and `;` are both accepted
//! argument separators.
//!
//! Two entry points share this grammar: [`parse_strict`] aborts on the
//! first failure (used by the executor), and [`parse_tolerant`] records the
//! error and keeps a best-effort partial AST (used by editor tooling).

use super::expr_lexer::{lex, ExprTok, Lexed};
use crate::ast::{BinOp, Expr};
use crate::error::ImseError;

pub struct TolerantResult {
    pub expr: Expr,
    pub errors: Vec<ImseError>,
}

struct Parser {
    toks: Vec<Lexed>,
    pos: usize,
    tolerant: bool,
    errors: Vec<ImseError>,
}

impl Parser {
    fn new(toks: Vec<Lexed>, tolerant: bool) -> Self {
        Self { toks, pos: 0, tolerant, errors: Vec::new() }
    }

    fn peek(&self) -> &ExprTok {
        &self.toks[self.pos.min(self.toks.len() - 1)].tok
    }

    fn position(&self) -> usize {
        self.toks[self.pos.min(self.toks.len() - 1)].span.start
    }

    fn advance(&mut self) -> ExprTok {
        let t = self.toks[self.pos.min(self.toks.len() - 1)].tok.clone();
        if self.pos < self.toks.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &ExprTok, label: &str) -> Result<(), ImseError> {
        if std::mem::discriminant(self.peek()) == std::mem::discriminant(expected) {
            self.advance();
            Ok(())
        } else {
            let err = ImseError::Syntax { position: self.position(), expected: label.to_string(), got: describe(self.peek()) };
            if self.tolerant {
                self.errors.push(err);
                Ok(())
            } else {
                Err(err)
            }
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ImseError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                ExprTok::Plus => BinOp::Add,
                ExprTok::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ImseError> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                ExprTok::Star => BinOp::Mul,
                ExprTok::Slash => BinOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, ImseError> {
        match self.peek() {
            ExprTok::Plus => {
                self.advance();
                Ok(Expr::UnaryPlus(Box::new(self.parse_factor()?)))
            }
            ExprTok::Minus => {
                self.advance();
                Ok(Expr::UnaryMinus(Box::new(self.parse_factor()?)))
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> Result<Expr, ImseError> {
        match self.peek().clone() {
            ExprTok::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            ExprTok::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            ExprTok::Ident(name) => {
                self.advance();
                if matches!(self.peek(), ExprTok::LParen) {
                    self.advance();
                    let (positional, named) = self.parse_args()?;
                    self.expect(&ExprTok::RParen, "')'")?;
                    Ok(Expr::Call { name, positional, named })
                } else {
                    Ok(Expr::Identifier(name))
                }
            }
            ExprTok::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&ExprTok::RParen, "')'")?;
                Ok(inner)
            }
            other => {
                let err = ImseError::Syntax { position: self.position(), expected: "expression".to_string(), got: describe(&other) };
                if self.tolerant {
                    self.errors.push(err);
                    // Best effort: consume the bad token and return Unit-ish
                    // placeholder so the caller still gets a tree shape.
                    if !matches!(other, ExprTok::Eof) {
                        self.advance();
                    }
                    Ok(Expr::Number(f64::NAN))
                } else {
                    Err(err)
                }
            }
        }
    }

    fn parse_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ImseError> {
        let mut positional = Vec::new();
        let mut named = Vec::new();
        if matches!(self.peek(), ExprTok::RParen) {
            return Ok((positional, named));
        }
        loop {
            self.parse_one_arg(&mut positional, &mut named)?;
            match self.peek() {
                ExprTok::Comma | ExprTok::Semicolon => {
                    self.advance();
                }
                _ => break,
            }
        }
        Ok((positional, named))
    }

    fn parse_one_arg(&mut self, positional: &mut Vec<Expr>, named: &mut Vec<(String, Expr)>) -> Result<(), ImseError> {
        // `IDENT '=' expr` named-arg lookahead: only consume as named if the
        // identifier is immediately followed by a single `=` (not `==`,
        // which doesn't exist in this grammar anyway, so a lone Eq suffices).
        if let ExprTok::Ident(name) = self.peek().clone() {
            if matches!(self.toks.get(self.pos + 1).map(|t| &t.tok), Some(ExprTok::Eq)) {
                self.advance(); // ident
                self.advance(); // =
                let value = self.parse_expr()?;
                named.push((name, value));
                return Ok(());
            }
        }
        let value = self.parse_expr()?;
        positional.push(value);
        Ok(())
    }
}

fn describe(tok: &ExprTok) -> String {
    match tok {
        ExprTok::Number(n) => format!("number {n}"),
        ExprTok::Str(s) => format!("string {s:?}"),
        ExprTok::Ident(i) => format!("identifier '{i}'"),
        ExprTok::Plus => "'+'".into(),
        ExprTok::Minus => "'-'".into(),
        ExprTok::Star => "'*'".into(),
        ExprTok::Slash => "'/'".into(),
        ExprTok::LParen => "'('".into(),
        ExprTok::RParen => "')'".into(),
        ExprTok::Eq => "'='".into(),
        ExprTok::Comma => "','".into(),
        ExprTok::Semicolon => "';'".into(),
        ExprTok::Eof => "end of expression".into(),
    }
}

/// Strict parse: aborts on the first syntax error. Used by the executor.
pub fn parse_strict(input: &str) -> Result<Expr, ImseError> {
    let toks = lex(input).map_err(|(pos, msg)| ImseError::Syntax { position: pos, expected: "valid token".to_string(), got: msg })?;
    let mut p = Parser::new(toks, false);
    let expr = p.parse_expr()?;
    if !matches!(p.peek(), ExprTok::Eof) {
        return Err(ImseError::Syntax { position: p.position(), expected: "end of expression".to_string(), got: describe(p.peek()) });
    }
    Ok(expr)
}

/// Tolerant parse: records errors in place and keeps a best-effort partial
/// AST. Used by editor tooling (syntax highlighter).
pub fn parse_tolerant(input: &str) -> TolerantResult {
    let toks = match lex(input) {
        Ok(t) => t,
        Err((pos, msg)) => {
            return TolerantResult {
                expr: Expr::Number(f64::NAN),
                errors: vec![ImseError::Syntax { position: pos, expected: "valid token".to_string(), got: msg }],
            }
        }
    };
    let mut p = Parser::new(toks, true);
    let expr = match p.parse_expr() {
        Ok(e) => e,
        Err(e) => {
            p.errors.push(e);
            Expr::Number(f64::NAN)
        }
    };
    TolerantResult { expr, errors: p.errors }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_and_associativity() {
        let e = parse_strict("1 + 2 * 3 - 4 / 2").unwrap();
        assert_eq!(e.canonical(), "((1.0 + (2.0 * 3.0)) - (4.0 / 2.0))");
    }

    #[test]
    fn unary_binds_tighter_than_binary() {
        let e = parse_strict("-2 + 3").unwrap();
        assert_eq!(e.canonical(), "((-2.0) + 3.0)");
    }

    #[test]
    fn function_call_mixed_args() {
        let e = parse_strict("range(-2, 2, step=1)").unwrap();
        match e {
            Expr::Call { name, positional, named } => {
                assert_eq!(name, "range");
                assert_eq!(positional.len(), 2);
                assert_eq!(named, vec![("step".to_string(), Expr::Number(1.0))]);
            }
            _ => panic!("expected call"),
        }
    }

    #[test]
    fn semicolon_separator_accepted() {
        let e = parse_strict("avg(img(0); img(1))").unwrap();
        match e {
            Expr::Call { positional, .. } => assert_eq!(positional.len(), 2),
            _ => panic!("expected call"),
        }
    }

    #[test]
    fn strict_mode_rejects_double_unary() {
        assert!(parse_strict("+++").is_err());
    }

    #[test]
    fn tolerant_mode_recovers() {
        let r = parse_tolerant("1 +");
        assert!(!r.errors.is_empty());
    }
}
