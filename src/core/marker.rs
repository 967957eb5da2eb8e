//! Environment conditions on dependency declarations.
//!
//! A declaration like `pywin32 >= 1.0; sys_platform == 'win32'` only applies
//! when its condition holds for the target environment. Conditions are parsed
//! once into a small expression tree; the rest of the system never touches the
//! raw text again. The grammar is the usual marker grammar: comparisons
//! between environment variables and quoted literals, combined with `and`/`or`
//! and parentheses, where `and` binds tighter than `or`.

use std::collections::BTreeMap;
use std::fmt;

use pep440_rs::Version;
use thiserror::Error;

/// Error parsing a condition expression.
#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("unexpected character `{0}` in condition")]
    UnexpectedChar(char),

    #[error("unterminated string literal in condition")]
    UnterminatedString,

    #[error("expected {expected}, found `{found}`")]
    UnexpectedToken { expected: &'static str, found: String },

    #[error("condition ended unexpectedly")]
    UnexpectedEnd,
}

/// A comparison operator in a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `~=`, compatible-release comparison
    Compatible,
    /// `===`, exact string equality
    ArbitraryEq,
    /// substring containment
    In,
    NotIn,
}

impl MarkerOp {
    fn as_str(self) -> &'static str {
        match self {
            MarkerOp::Eq => "==",
            MarkerOp::Ne => "!=",
            MarkerOp::Lt => "<",
            MarkerOp::Le => "<=",
            MarkerOp::Gt => ">",
            MarkerOp::Ge => ">=",
            MarkerOp::Compatible => "~=",
            MarkerOp::ArbitraryEq => "===",
            MarkerOp::In => "in",
            MarkerOp::NotIn => "not in",
        }
    }
}

/// One side of a comparison: an environment variable or a quoted literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerAtom {
    Variable(String),
    Literal(String),
}

impl MarkerAtom {
    fn resolve<'a>(&'a self, env: &'a MarkerEnvironment) -> Option<&'a str> {
        match self {
            MarkerAtom::Variable(name) => env.get(name),
            MarkerAtom::Literal(value) => Some(value),
        }
    }
}

/// A parsed environment condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerExpr {
    And(Vec<MarkerExpr>),
    Or(Vec<MarkerExpr>),
    Compare {
        lhs: MarkerAtom,
        op: MarkerOp,
        rhs: MarkerAtom,
    },
}

/// Variable assignments a condition is evaluated against.
///
/// Comparisons referencing a variable that has no assignment evaluate false;
/// an absent attribute can never satisfy a condition.
#[derive(Debug, Clone, Default)]
pub struct MarkerEnvironment {
    vars: BTreeMap<String, String>,
}

impl MarkerEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style assignment.
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

impl MarkerExpr {
    /// Parse a condition from marker text.
    pub fn parse(text: &str) -> Result<Self, MarkerError> {
        let tokens = tokenize(text)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(MarkerError::UnexpectedToken {
                expected: "end of condition",
                found: token.describe(),
            }),
        }
    }

    /// Build an equality test against one optional-feature name.
    pub fn extra_equals(name: &str) -> Self {
        MarkerExpr::Compare {
            lhs: MarkerAtom::Variable("extra".to_string()),
            op: MarkerOp::Eq,
            rhs: MarkerAtom::Literal(name.to_string()),
        }
    }

    /// AND-combine all present conditions; `None` if every part is absent.
    pub fn conjoin(parts: Vec<Option<MarkerExpr>>) -> Option<MarkerExpr> {
        let mut present: Vec<MarkerExpr> = parts.into_iter().flatten().collect();
        match present.len() {
            0 => None,
            1 => Some(present.remove(0)),
            _ => Some(MarkerExpr::And(present)),
        }
    }

    /// Evaluate the condition under the given variable assignments.
    pub fn evaluate(&self, env: &MarkerEnvironment) -> bool {
        match self {
            MarkerExpr::And(parts) => parts.iter().all(|p| p.evaluate(env)),
            MarkerExpr::Or(parts) => parts.iter().any(|p| p.evaluate(env)),
            MarkerExpr::Compare { lhs, op, rhs } => {
                let (Some(lhs), Some(rhs)) = (lhs.resolve(env), rhs.resolve(env)) else {
                    return false;
                };
                compare(lhs, *op, rhs)
            }
        }
    }
}

/// Compare two operand strings, as versions when both parse as versions.
fn compare(lhs: &str, op: MarkerOp, rhs: &str) -> bool {
    match op {
        MarkerOp::ArbitraryEq => return lhs == rhs,
        MarkerOp::In => return rhs.contains(lhs),
        MarkerOp::NotIn => return !rhs.contains(lhs),
        _ => {}
    }

    if let (Ok(lv), Ok(rv)) = (lhs.parse::<Version>(), rhs.parse::<Version>()) {
        return match op {
            MarkerOp::Eq => lv == rv,
            MarkerOp::Ne => lv != rv,
            MarkerOp::Lt => lv < rv,
            MarkerOp::Le => lv <= rv,
            MarkerOp::Gt => lv > rv,
            MarkerOp::Ge => lv >= rv,
            MarkerOp::Compatible => compatible_release(&lv, &rv),
            MarkerOp::ArbitraryEq | MarkerOp::In | MarkerOp::NotIn => unreachable!(),
        };
    }

    match op {
        MarkerOp::Eq => lhs == rhs,
        MarkerOp::Ne => lhs != rhs,
        MarkerOp::Lt => lhs < rhs,
        MarkerOp::Le => lhs <= rhs,
        MarkerOp::Gt => lhs > rhs,
        MarkerOp::Ge => lhs >= rhs,
        // `~=` requires version-shaped operands.
        MarkerOp::Compatible => false,
        MarkerOp::ArbitraryEq | MarkerOp::In | MarkerOp::NotIn => unreachable!(),
    }
}

/// `lhs ~= rhs`: at least `rhs`, within the release series of `rhs` with its
/// final segment dropped.
fn compatible_release(lhs: &Version, rhs: &Version) -> bool {
    let prefix = rhs.release();
    if prefix.len() < 2 || lhs < rhs {
        return false;
    }
    let series = &prefix[..prefix.len() - 1];
    let release = lhs.release();
    release.len() >= series.len() && &release[..series.len()] == series
}

impl fmt::Display for MarkerAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerAtom::Variable(name) => write!(f, "{}", name),
            MarkerAtom::Literal(value) => write!(f, "\"{}\"", value),
        }
    }
}

impl fmt::Display for MarkerExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerExpr::Compare { lhs, op, rhs } => {
                write!(f, "{} {} {}", lhs, op.as_str(), rhs)
            }
            MarkerExpr::And(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " and ")?;
                    }
                    // Composite operands keep their own parentheses so the
                    // conjunction never rebinds them.
                    match part {
                        MarkerExpr::Compare { .. } => write!(f, "{}", part)?,
                        _ => write!(f, "({})", part)?,
                    }
                }
                Ok(())
            }
            MarkerExpr::Or(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " or ")?;
                    }
                    match part {
                        MarkerExpr::Compare { .. } => write!(f, "{}", part)?,
                        _ => write!(f, "({})", part)?,
                    }
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Op(MarkerOp),
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => s.clone(),
            Token::Str(s) => format!("'{}'", s),
            Token::Op(op) => op.as_str().to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, MarkerError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some(ch) => value.push(ch),
                        None => return Err(MarkerError::UnterminatedString),
                    }
                }
                tokens.push(Token::Str(value));
            }
            '=' => {
                chars.next();
                if chars.peek() != Some(&'=') {
                    return Err(MarkerError::UnexpectedChar('='));
                }
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(MarkerOp::ArbitraryEq));
                } else {
                    tokens.push(Token::Op(MarkerOp::Eq));
                }
            }
            '!' => {
                chars.next();
                if chars.peek() != Some(&'=') {
                    return Err(MarkerError::UnexpectedChar('!'));
                }
                chars.next();
                tokens.push(Token::Op(MarkerOp::Ne));
            }
            '~' => {
                chars.next();
                if chars.peek() != Some(&'=') {
                    return Err(MarkerError::UnexpectedChar('~'));
                }
                chars.next();
                tokens.push(Token::Op(MarkerOp::Compatible));
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(MarkerOp::Le));
                } else {
                    tokens.push(Token::Op(MarkerOp::Lt));
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(MarkerOp::Ge));
                } else {
                    tokens.push(Token::Op(MarkerOp::Gt));
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(MarkerError::UnexpectedChar(other)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<MarkerExpr, MarkerError> {
        let mut parts = vec![self.parse_and()?];
        while matches!(self.peek(), Some(Token::Ident(word)) if word == "or") {
            self.next();
            parts.push(self.parse_and()?);
        }
        if parts.len() == 1 {
            Ok(parts.remove(0))
        } else {
            Ok(MarkerExpr::Or(parts))
        }
    }

    fn parse_and(&mut self) -> Result<MarkerExpr, MarkerError> {
        let mut parts = vec![self.parse_atom()?];
        while matches!(self.peek(), Some(Token::Ident(word)) if word == "and") {
            self.next();
            parts.push(self.parse_atom()?);
        }
        if parts.len() == 1 {
            Ok(parts.remove(0))
        } else {
            Ok(MarkerExpr::And(parts))
        }
    }

    fn parse_atom(&mut self) -> Result<MarkerExpr, MarkerError> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.next();
            let expr = self.parse_or()?;
            match self.next() {
                Some(Token::RParen) => return Ok(expr),
                Some(token) => {
                    return Err(MarkerError::UnexpectedToken {
                        expected: "`)`",
                        found: token.describe(),
                    })
                }
                None => return Err(MarkerError::UnexpectedEnd),
            }
        }

        let lhs = self.parse_value()?;
        let op = self.parse_op()?;
        let rhs = self.parse_value()?;
        Ok(MarkerExpr::Compare { lhs, op, rhs })
    }

    fn parse_value(&mut self) -> Result<MarkerAtom, MarkerError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(MarkerAtom::Variable(name)),
            Some(Token::Str(value)) => Ok(MarkerAtom::Literal(value)),
            Some(token) => Err(MarkerError::UnexpectedToken {
                expected: "a variable or quoted literal",
                found: token.describe(),
            }),
            None => Err(MarkerError::UnexpectedEnd),
        }
    }

    fn parse_op(&mut self) -> Result<MarkerOp, MarkerError> {
        match self.next() {
            Some(Token::Op(op)) => Ok(op),
            Some(Token::Ident(word)) if word == "in" => Ok(MarkerOp::In),
            Some(Token::Ident(word)) if word == "not" => match self.next() {
                Some(Token::Ident(word)) if word == "in" => Ok(MarkerOp::NotIn),
                Some(token) => Err(MarkerError::UnexpectedToken {
                    expected: "`in`",
                    found: token.describe(),
                }),
                None => Err(MarkerError::UnexpectedEnd),
            },
            Some(token) => Err(MarkerError::UnexpectedToken {
                expected: "a comparison operator",
                found: token.describe(),
            }),
            None => Err(MarkerError::UnexpectedEnd),
        }
    }
}
