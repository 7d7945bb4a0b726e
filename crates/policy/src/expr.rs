// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Predicate expression language for policy rules.
//!
//! Grammar (total, no side effects, no loops):
//!
//! ```text
//! expr   := or
//! or     := and ( "or" and )*
//! and    := unary ( "and" unary )*
//! unary  := "not" unary | cmp
//! cmp    := term ( ("<"|"<="|"=="|"!="|">="|">") term | "in" term )?
//! term   := number | string | "true" | "false" | ident
//!         | "(" expr ")" | "[" term ("," term)* "]"
//! ```
//!
//! Identifiers resolve against a frozen variable map supplied by the
//! caller; the loader rejects identifiers outside that map, so runtime
//! evaluation can only fail on type mismatches, which callers treat as
//! a non-match.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// A value in the expression language.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Num(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
}

/// Parsed predicate expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    List(Vec<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    In(Box<Expr>, Box<Expr>),
}

/// Syntax error with a byte offset into the source.
#[derive(Debug, Error, PartialEq)]
#[error("parse error at byte {pos}: {message}")]
pub struct ParseError {
    pub pos: usize,
    pub message: String,
}

/// Runtime evaluation error. With load-time identifier validation the
/// only reachable variant is a type mismatch.
#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),
    #[error("type mismatch: {op} not defined for {left} and {right}")]
    TypeMismatch { op: &'static str, left: &'static str, right: &'static str },
    #[error("expected a boolean, got {0}")]
    NotABool(&'static str),
}

impl Expr {
    /// Parse a predicate from source text.
    pub fn parse(src: &str) -> Result<Expr, ParseError> {
        let tokens = lex(src)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.or_expr()?;
        match parser.peek() {
            Some(tok) => Err(ParseError {
                pos: tok.pos,
                message: format!("unexpected trailing {}", tok.kind.describe()),
            }),
            None => Ok(expr),
        }
    }

    /// Collect every identifier referenced by the expression.
    pub fn identifiers(&self, out: &mut Vec<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Ident(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::List(items) => {
                for item in items {
                    item.identifiers(out);
                }
            }
            Expr::Not(inner) => inner.identifiers(out),
            Expr::And(l, r) | Expr::Or(l, r) | Expr::In(l, r) => {
                l.identifiers(out);
                r.identifiers(out);
            }
            Expr::Cmp(_, l, r) => {
                l.identifiers(out);
                r.identifiers(out);
            }
        }
    }

    /// Evaluate against a frozen variable map.
    pub fn eval(&self, vars: &BTreeMap<String, Value>) -> Result<Value, EvalError> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Ident(name) => vars
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UnknownIdentifier(name.clone())),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(item.eval(vars)?);
                }
                Ok(Value::List(values))
            }
            Expr::Not(inner) => {
                let v = inner.eval(vars)?;
                match v {
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    other => Err(EvalError::NotABool(other.type_name())),
                }
            }
            Expr::And(l, r) => {
                // Short-circuit: the right side is not evaluated when the
                // left already decides.
                if !as_bool(l.eval(vars)?)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(as_bool(r.eval(vars)?)?))
            }
            Expr::Or(l, r) => {
                if as_bool(l.eval(vars)?)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(as_bool(r.eval(vars)?)?))
            }
            Expr::Cmp(op, l, r) => {
                let left = l.eval(vars)?;
                let right = r.eval(vars)?;
                compare(*op, &left, &right).map(Value::Bool)
            }
            Expr::In(l, r) => {
                let needle = l.eval(vars)?;
                let haystack = r.eval(vars)?;
                match haystack {
                    Value::List(items) => Ok(Value::Bool(items.contains(&needle))),
                    other => Err(EvalError::TypeMismatch {
                        op: "in",
                        left: needle.type_name(),
                        right: other.type_name(),
                    }),
                }
            }
        }
    }

    /// Evaluate and require a boolean result.
    pub fn eval_bool(&self, vars: &BTreeMap<String, Value>) -> Result<bool, EvalError> {
        as_bool(self.eval(vars)?)
    }
}

fn as_bool(v: Value) -> Result<bool, EvalError> {
    match v {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::NotABool(other.type_name())),
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, EvalError> {
    use CmpOp::*;
    match (left, right) {
        (Value::Num(a), Value::Num(b)) => Ok(match op {
            Lt => a < b,
            Le => a <= b,
            Eq => a == b,
            Ne => a != b,
            Ge => a >= b,
            Gt => a > b,
        }),
        (Value::Str(a), Value::Str(b)) => match op {
            Eq => Ok(a == b),
            Ne => Ok(a != b),
            _ => Err(EvalError::TypeMismatch { op: "ordering", left: "string", right: "string" }),
        },
        (Value::Bool(a), Value::Bool(b)) => match op {
            Eq => Ok(a == b),
            Ne => Ok(a != b),
            _ => Err(EvalError::TypeMismatch { op: "ordering", left: "bool", right: "bool" }),
        },
        (l, r) => Err(EvalError::TypeMismatch {
            op: "comparison",
            left: l.type_name(),
            right: r.type_name(),
        }),
    }
}

// ── Lexer ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Num(f64),
    Str(String),
    Ident(String),
    True,
    False,
    And,
    Or,
    Not,
    In,
    Lt,
    Le,
    EqEq,
    Ne,
    Ge,
    Gt,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Num(n) => format!("number {n}"),
            TokenKind::Str(s) => format!("string {s:?}"),
            TokenKind::Ident(name) => format!("identifier '{name}'"),
            TokenKind::True => "'true'".to_string(),
            TokenKind::False => "'false'".to_string(),
            TokenKind::And => "'and'".to_string(),
            TokenKind::Or => "'or'".to_string(),
            TokenKind::Not => "'not'".to_string(),
            TokenKind::In => "'in'".to_string(),
            TokenKind::Lt => "'<'".to_string(),
            TokenKind::Le => "'<='".to_string(),
            TokenKind::EqEq => "'=='".to_string(),
            TokenKind::Ne => "'!='".to_string(),
            TokenKind::Ge => "'>='".to_string(),
            TokenKind::Gt => "'>'".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::Comma => "','".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    pos: usize,
}

fn lex(src: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::LParen, pos });
            }
            ')' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::RParen, pos });
            }
            '[' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::LBracket, pos });
            }
            ']' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::RBracket, pos });
            }
            ',' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::Comma, pos });
            }
            '<' => {
                chars.next();
                if chars.peek().map(|&(_, c)| c) == Some('=') {
                    chars.next();
                    tokens.push(Token { kind: TokenKind::Le, pos });
                } else {
                    tokens.push(Token { kind: TokenKind::Lt, pos });
                }
            }
            '>' => {
                chars.next();
                if chars.peek().map(|&(_, c)| c) == Some('=') {
                    chars.next();
                    tokens.push(Token { kind: TokenKind::Ge, pos });
                } else {
                    tokens.push(Token { kind: TokenKind::Gt, pos });
                }
            }
            '=' => {
                chars.next();
                if chars.peek().map(|&(_, c)| c) == Some('=') {
                    chars.next();
                    tokens.push(Token { kind: TokenKind::EqEq, pos });
                } else {
                    return Err(ParseError { pos, message: "expected '=='".to_string() });
                }
            }
            '!' => {
                chars.next();
                if chars.peek().map(|&(_, c)| c) == Some('=') {
                    chars.next();
                    tokens.push(Token { kind: TokenKind::Ne, pos });
                } else {
                    return Err(ParseError { pos, message: "expected '!='".to_string() });
                }
            }
            '"' | '\'' => {
                let quote = ch;
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == quote {
                        closed = true;
                        break;
                    }
                    value.push(c);
                }
                if !closed {
                    return Err(ParseError { pos, message: "unterminated string".to_string() });
                }
                tokens.push(Token { kind: TokenKind::Str(value), pos });
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                let mut text = String::new();
                if c == '-' {
                    text.push(c);
                    chars.next();
                }
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let num: f64 = text
                    .parse()
                    .map_err(|_| ParseError { pos, message: format!("bad number {text:?}") })?;
                tokens.push(Token { kind: TokenKind::Num(num), pos });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let kind = match name.as_str() {
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    "in" => TokenKind::In,
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    _ => TokenKind::Ident(name),
                };
                tokens.push(Token { kind, pos });
            }
            other => {
                return Err(ParseError { pos, message: format!("unexpected character {other:?}") });
            }
        }
    }

    Ok(tokens)
}

// ── Parser ──────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().map(|t| &t.kind) == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        match self.next() {
            Some(tok) if tok.kind == kind => Ok(()),
            Some(tok) => Err(ParseError {
                pos: tok.pos,
                message: format!("expected {}, found {}", kind.describe(), tok.kind.describe()),
            }),
            None => Err(ParseError {
                pos: usize::MAX,
                message: format!("expected {}, found end of input", kind.describe()),
            }),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and_expr()?;
        while self.eat(&TokenKind::Or) {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary_expr()?;
        while self.eat(&TokenKind::And) {
            let right = self.unary_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary_expr(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&TokenKind::Not) {
            let inner = self.unary_expr()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.cmp_expr()
    }

    fn cmp_expr(&mut self) -> Result<Expr, ParseError> {
        let left = self.term()?;
        let op = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Lt) => Some(CmpOp::Lt),
            Some(TokenKind::Le) => Some(CmpOp::Le),
            Some(TokenKind::EqEq) => Some(CmpOp::Eq),
            Some(TokenKind::Ne) => Some(CmpOp::Ne),
            Some(TokenKind::Ge) => Some(CmpOp::Ge),
            Some(TokenKind::Gt) => Some(CmpOp::Gt),
            Some(TokenKind::In) => None,
            _ => return Ok(left),
        };
        match op {
            Some(op) => {
                self.pos += 1;
                let right = self.term()?;
                Ok(Expr::Cmp(op, Box::new(left), Box::new(right)))
            }
            None => {
                self.pos += 1;
                let right = self.term()?;
                Ok(Expr::In(Box::new(left), Box::new(right)))
            }
        }
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        match self.next() {
            Some(Token { kind: TokenKind::Num(n), .. }) => Ok(Expr::Literal(Value::Num(n))),
            Some(Token { kind: TokenKind::Str(s), .. }) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token { kind: TokenKind::True, .. }) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token { kind: TokenKind::False, .. }) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token { kind: TokenKind::Ident(name), .. }) => Ok(Expr::Ident(name)),
            Some(Token { kind: TokenKind::LParen, .. }) => {
                let inner = self.or_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            Some(Token { kind: TokenKind::LBracket, .. }) => {
                let mut items = Vec::new();
                if !self.eat(&TokenKind::RBracket) {
                    loop {
                        items.push(self.term()?);
                        if self.eat(&TokenKind::Comma) {
                            continue;
                        }
                        self.expect(TokenKind::RBracket)?;
                        break;
                    }
                }
                Ok(Expr::List(items))
            }
            Some(tok) => Err(ParseError {
                pos: tok.pos,
                message: format!("expected a value, found {}", tok.kind.describe()),
            }),
            None => Err(ParseError {
                pos: usize::MAX,
                message: "expected a value, found end of input".to_string(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "expr_tests.rs"]
mod tests;
