//! CI variable expressions: `$VAR == "value" && $OTHER =~ /pattern/i`.
//!
//! Grammar:
//! ```text
//! Statement   ::= OrExpr
//! OrExpr      ::= AndExpr ( '||' AndExpr )*
//! AndExpr     ::= Comparison ( '&&' Comparison )*
//! Comparison  ::= Operand ( Operator Operand )?
//! Operand     ::= '$' Name | '"' Text '"' | '\'' Text '\'' | '/' Regex '/' Flags | 'null' | '(' OrExpr ')'
//! Operator    ::= '==' | '!=' | '=~' | '!~'
//! ```
//!
//! # Example
//! ```
//! let stmt = seed_expr::Statement::parse(r#"$CI_COMMIT_BRANCH == "main""#).unwrap();
//! let resolve = |name: &str| (name == "CI_COMMIT_BRANCH").then(|| "main".to_string());
//! assert!(stmt.truthful(&resolve).unwrap());
//! ```

pub mod ast;
mod eval;
mod parser;

pub use ast::{CompareOp, Expression, Pattern};
pub use eval::{evaluate, ExprValue};
pub use parser::parse;

use seed_types::{Result, SeedError};

/// A parsed expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    source: String,
    root: Expression,
}

impl Statement {
    pub fn parse(source: &str) -> Result<Self> {
        let root = parse(source)?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Expression {
        &self.root
    }

    pub fn evaluate(&self, resolve: &dyn Fn(&str) -> Option<String>) -> Result<ExprValue> {
        evaluate(&self.root, resolve).map_err(|message| SeedError::ExpressionEval {
            expression: self.source.clone(),
            message,
        })
    }

    /// Whether the statement evaluates to a non-empty string or `true`.
    pub fn truthful(&self, resolve: &dyn Fn(&str) -> Option<String>) -> Result<bool> {
        let value = self.evaluate(resolve)?;
        tracing::trace!(expression = %self.source, ?value, "Expression evaluated");
        Ok(value.is_present())
    }
}
