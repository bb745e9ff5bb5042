//! Search predicate grammar.
//!
//! The free-form search predicate is attacker-controlled text. Instead of
//! validating it syntactically and splicing it back into a query string, it
//! is parsed into an allow-listed AST here and the compiled query carries
//! the AST; the document store evaluates the AST and never sees the raw
//! text. Parse failures surface as [`Validation`] errors before any store
//! access.
//!
//! Grammar:
//!
//! ```text
//! expr       := or_expr
//! or_expr    := and_expr ( OR and_expr )*
//! and_expr   := unary ( AND unary )*
//! unary      := NOT unary | '(' expr ')' | comparison
//! comparison := path ( '=' | '!=' | CONTAINS ) literal
//! literal    := 'string' | "string" | number | true | false
//! ```
//!
//! Keywords are case-insensitive. Paths are bare words and may contain the
//! attribute separator (e.g. `sample.data>DONOR_SEX = 'Female'`).
//!
//! [`Validation`]: crate::error::Error::Validation

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// At least one value at the path equals the literal.
    Eq,
    /// No value at the path equals the literal.
    Ne,
    /// At least one value at the path contains the literal as a substring.
    Contains,
}

/// A literal operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    /// A quoted string literal.
    String(String),
    /// A numeric literal; values are compared numerically, so `9606.0`
    /// matches `9606`.
    Number(f64),
    /// A boolean literal.
    Bool(bool),
}

impl Literal {
    fn matches(&self, value: &str) -> bool {
        match self {
            Self::String(s) => value == s,
            Self::Number(n) => value.parse::<f64>().is_ok_and(|v| (v - n).abs() < f64::EPSILON),
            Self::Bool(b) => value.parse::<bool>().is_ok_and(|v| v == *b),
        }
    }

    fn as_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

/// A parsed search predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Both sides must match.
    And(Box<Predicate>, Box<Predicate>),
    /// Either side must match.
    Or(Box<Predicate>, Box<Predicate>),
    /// The inner predicate must not match.
    Not(Box<Predicate>),
    /// A single path comparison.
    Compare {
        /// Attribute path, optionally qualified with an object-type prefix.
        path: String,
        /// Comparison operator.
        op: CompareOp,
        /// Literal operand.
        value: Literal,
    },
}

impl Predicate {
    /// Parses a predicate from its textual form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the input is not a sentence of the
    /// predicate grammar.
    pub fn parse(input: &str) -> Result<Self> {
        let tokens = lex(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let predicate = parser.or_expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(Error::validation(format!(
                "unexpected trailing input at token {}",
                parser.pos + 1
            )));
        }
        Ok(predicate)
    }

    /// Evaluates the predicate, resolving each path to its observed string
    /// values through `resolve`.
    pub fn matches(&self, resolve: &dyn Fn(&str) -> Vec<String>) -> bool {
        match self {
            Self::And(a, b) => a.matches(resolve) && b.matches(resolve),
            Self::Or(a, b) => a.matches(resolve) || b.matches(resolve),
            Self::Not(inner) => !inner.matches(resolve),
            Self::Compare { path, op, value } => {
                let observed = resolve(path);
                match op {
                    CompareOp::Eq => observed.iter().any(|v| value.matches(v)),
                    CompareOp::Ne => !observed.iter().any(|v| value.matches(v)),
                    CompareOp::Contains => {
                        let needle = value.as_text();
                        observed.iter().any(|v| v.contains(&needle))
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Eq,
    Ne,
    Str(String),
    Word(String),
}

fn lex(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
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
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '!' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err(Error::validation("expected '=' after '!'"));
                }
                tokens.push(Token::Ne);
            }
            quote @ ('\'' | '"') => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some(c) => text.push(c),
                        None => return Err(Error::validation("unterminated string literal")),
                    }
                }
                tokens.push(Token::Str(text));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '=' | '!' | '\'' | '"') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
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

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn or_expr(&mut self) -> Result<Predicate> {
        let mut left = self.and_expr()?;
        while self.peek_keyword("or") {
            self.next();
            let right = self.and_expr()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Predicate> {
        let mut left = self.unary()?;
        while self.peek_keyword("and") {
            self.next();
            let right = self.unary()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Predicate> {
        if self.peek_keyword("not") {
            self.next();
            return Ok(Predicate::Not(Box::new(self.unary()?)));
        }
        if self.peek() == Some(&Token::LParen) {
            self.next();
            let inner = self.or_expr()?;
            if self.next() != Some(Token::RParen) {
                return Err(Error::validation("expected ')'"));
            }
            return Ok(inner);
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Predicate> {
        let path = match self.next() {
            Some(Token::Word(w)) if !is_keyword(&w) => w,
            other => {
                return Err(Error::validation(format!(
                    "expected attribute path, found {other:?}"
                )))
            }
        };
        let op = match self.next() {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::Ne) => CompareOp::Ne,
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("contains") => CompareOp::Contains,
            other => {
                return Err(Error::validation(format!(
                    "expected '=', '!=' or CONTAINS, found {other:?}"
                )))
            }
        };
        let value = match self.next() {
            Some(Token::Str(s)) => Literal::String(s),
            Some(Token::Word(w)) => {
                if let Ok(b) = w.parse::<bool>() {
                    Literal::Bool(b)
                } else if let Ok(n) = w.parse::<f64>() {
                    Literal::Number(n)
                } else {
                    return Err(Error::validation(format!(
                        "unquoted literal {w:?}; string literals must be quoted"
                    )));
                }
            }
            other => {
                return Err(Error::validation(format!(
                    "expected literal, found {other:?}"
                )))
            }
        };
        Ok(Predicate::Compare { path, op, value })
    }
}

fn is_keyword(word: &str) -> bool {
    ["and", "or", "not", "contains"]
        .iter()
        .any(|k| word.eq_ignore_ascii_case(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver<'a>(pairs: &'a [(&'a str, &'a [&'a str])]) -> impl Fn(&str) -> Vec<String> + 'a {
        move |path: &str| {
            pairs
                .iter()
                .find(|(p, _)| *p == path)
                .map(|(_, vs)| vs.iter().map(|v| (*v).to_owned()).collect())
                .unwrap_or_default()
        }
    }

    #[test]
    fn parses_and_evaluates_comparison() {
        let p = Predicate::parse("sample>DONOR_SEX = 'Female'").unwrap();
        assert!(p.matches(&resolver(&[("sample>DONOR_SEX", &["Female"])])));
        assert!(!p.matches(&resolver(&[("sample>DONOR_SEX", &["Male"])])));
        assert!(!p.matches(&resolver(&[])));
    }

    #[test]
    fn boolean_connectives_and_grouping() {
        let p = Predicate::parse("(a = 1 OR a = 2) AND NOT b = 'x'").unwrap();
        assert!(p.matches(&resolver(&[("a", &["2"]), ("b", &["y"])])));
        assert!(!p.matches(&resolver(&[("a", &["2"]), ("b", &["x"])])));
        assert!(!p.matches(&resolver(&[("a", &["3"]), ("b", &["y"])])));
    }

    #[test]
    fn numbers_compare_numerically() {
        let p = Predicate::parse("taxon_id = 9606").unwrap();
        assert!(p.matches(&resolver(&[("taxon_id", &["9606.0"])])));
    }

    #[test]
    fn contains_is_substring_match() {
        let p = Predicate::parse("assay CONTAINS 'K27'").unwrap();
        assert!(p.matches(&resolver(&[("assay", &["H3K27me3"])])));
        assert!(!p.matches(&resolver(&[("assay", &["WGBS"])])));
    }

    #[test]
    fn ne_means_no_value_equals() {
        let p = Predicate::parse("state != 'open'").unwrap();
        assert!(p.matches(&resolver(&[("state", &["closed"])])));
        assert!(!p.matches(&resolver(&[("state", &["closed", "open"])])));
        // Vacuously true on missing paths.
        assert!(p.matches(&resolver(&[])));
    }

    #[test]
    fn injection_shaped_input_is_rejected() {
        for bad in [
            "1 = 1; DROP TABLE documents",
            "a = 'x' UNION SELECT",
            "a = ",
            "= 'x'",
            "a = 'unterminated",
            "a CONTAINS unquoted",
            "(a = 1",
            "a = 1 extra",
        ] {
            assert!(
                Predicate::parse(bad).is_err(),
                "predicate {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let p = Predicate::parse("a = 1 and b = 2").unwrap();
        assert!(matches!(p, Predicate::And(_, _)));
    }
}
