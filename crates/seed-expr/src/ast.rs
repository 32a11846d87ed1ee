use std::fmt;

use regex::Regex;

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Variable(String),
    String(String),
    Pattern(Pattern),
    Null,
    Compare {
        left: Box<Expression>,
        op: CompareOp,
        right: Box<Expression>,
    },
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equals,
    NotEquals,
    Matches,
    NotMatches,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Equals => "==",
            CompareOp::NotEquals => "!=",
            CompareOp::Matches => "=~",
            CompareOp::NotMatches => "!~",
        }
    }
}

/// A `/regex/flags` literal with its compiled matcher.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    flags: String,
    regex: Regex,
}

impl Pattern {
    /// Compile `source` with the given flags (`i`, `m`, `s`, `x`).
    pub fn new(source: &str, flags: &str) -> Result<Self, regex::Error> {
        let mut unique: Vec<char> = Vec::new();
        for c in flags.chars() {
            if !unique.contains(&c) {
                unique.push(c);
            }
        }
        let flags: String = unique.into_iter().collect();
        let full = if flags.is_empty() {
            source.to_string()
        } else {
            format!("(?{flags}){source}")
        };
        Ok(Self {
            source: source.to_string(),
            flags,
            regex: Regex::new(&full)?,
        })
    }

    /// Parse a `/regex/flags` literal from a runtime string such as a
    /// variable value. Returns `None` when `text` is not shaped like a literal.
    pub fn from_literal(text: &str) -> Option<Result<Self, regex::Error>> {
        let body = text.strip_prefix('/')?;
        let end = body.rfind('/')?;
        let (source, flags) = (&body[..end], &body[end + 1..]);
        if !flags.chars().all(|c| matches!(c, 'i' | 'm' | 's' | 'x')) {
            return None;
        }
        Some(Self::new(&source.replace("\\/", "/"), flags))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn flags(&self) -> &str {
        &self.flags
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.flags == other.flags
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}
