//! Expression evaluation against a variable resolver.

use crate::ast::{CompareOp, Expression, Pattern};

/// Runtime value of an expression node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprValue {
    String(String),
    Bool(bool),
    Null,
}

impl ExprValue {
    /// Truthiness used by `&&` / `||`: only `null` and `false` are falsy.
    fn is_truthy(&self) -> bool {
        !matches!(self, ExprValue::Null | ExprValue::Bool(false))
    }

    /// Truthiness of a whole statement: non-empty string or `true`.
    pub fn is_present(&self) -> bool {
        match self {
            ExprValue::String(s) => !s.is_empty(),
            ExprValue::Bool(b) => *b,
            ExprValue::Null => false,
        }
    }

    fn as_text(&self) -> String {
        match self {
            ExprValue::String(s) => s.clone(),
            ExprValue::Bool(b) => b.to_string(),
            ExprValue::Null => String::new(),
        }
    }
}

/// Evaluate `expr`. `resolve` maps a variable name to its value, `None` when
/// the variable is not defined.
///
/// Errors are messages describing a runtime failure, e.g. a variable used as
/// a pattern that does not hold a `/pattern/` literal.
pub fn evaluate(
    expr: &Expression,
    resolve: &dyn Fn(&str) -> Option<String>,
) -> Result<ExprValue, String> {
    match expr {
        Expression::Variable(name) => Ok(resolve(name).map_or(ExprValue::Null, ExprValue::String)),
        Expression::String(s) => Ok(ExprValue::String(s.clone())),
        Expression::Pattern(p) => Ok(ExprValue::String(p.to_string())),
        Expression::Null => Ok(ExprValue::Null),
        Expression::Compare { left, op, right } => {
            let result = match op {
                CompareOp::Equals => evaluate(left, resolve)? == evaluate(right, resolve)?,
                CompareOp::NotEquals => evaluate(left, resolve)? != evaluate(right, resolve)?,
                CompareOp::Matches => matches(left, right, resolve)?,
                CompareOp::NotMatches => !matches(left, right, resolve)?,
            };
            Ok(ExprValue::Bool(result))
        }
        Expression::And(left, right) => {
            let value = evaluate(left, resolve)?;
            if !value.is_truthy() {
                return Ok(value);
            }
            evaluate(right, resolve)
        }
        Expression::Or(left, right) => {
            let value = evaluate(left, resolve)?;
            if value.is_truthy() {
                return Ok(value);
            }
            evaluate(right, resolve)
        }
    }
}

fn matches(
    left: &Expression,
    right: &Expression,
    resolve: &dyn Fn(&str) -> Option<String>,
) -> Result<bool, String> {
    let text = evaluate(left, resolve)?.as_text();
    match right {
        Expression::Pattern(pattern) => Ok(pattern.is_match(&text)),
        other => {
            let value = evaluate(other, resolve)?;
            let ExprValue::String(literal) = value else {
                return Err(format!(
                    "right-hand side of a match must be a pattern, got {value:?}"
                ));
            };
            match Pattern::from_literal(&literal) {
                Some(Ok(pattern)) => Ok(pattern.is_match(&text)),
                Some(Err(err)) => Err(format!("'{literal}' is not a valid pattern: {err}")),
                None => Err(format!("'{literal}' is not a valid pattern")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn vars(key: &str) -> Option<String> {
        match key {
            "CI_COMMIT_BRANCH" => Some("main".into()),
            "EMPTY" => Some(String::new()),
            "DEPLOY" => Some("true".into()),
            "RELEASE_PATTERN" => Some("/^release-.*$/".into()),
            "NOT_A_PATTERN" => Some("release".into()),
            _ => None,
        }
    }

    fn truthful(src: &str) -> bool {
        evaluate(&parse(src).unwrap(), &vars).unwrap().is_present()
    }

    #[test]
    fn variable_presence() {
        assert!(truthful("$DEPLOY"));
        assert!(!truthful("$EMPTY"));
        assert!(!truthful("$UNDEFINED"));
    }

    #[test]
    fn equality_and_null() {
        assert!(truthful(r#"$CI_COMMIT_BRANCH == "main""#));
        assert!(!truthful(r#"$CI_COMMIT_BRANCH == "develop""#));
        assert!(truthful(r#"$CI_COMMIT_BRANCH != "develop""#));
        assert!(truthful("$UNDEFINED == null"));
        assert!(!truthful("$EMPTY == null"));
        assert!(truthful(r#"$EMPTY == """#));
        assert!(!truthful(r#"$UNDEFINED == """#));
    }

    #[test]
    fn pattern_matching() {
        assert!(truthful("$CI_COMMIT_BRANCH =~ /^ma/"));
        assert!(!truthful("$CI_COMMIT_BRANCH =~ /^MA/"));
        assert!(truthful("$CI_COMMIT_BRANCH =~ /^MA/i"));
        assert!(truthful("$CI_COMMIT_BRANCH !~ /^release/"));
    }

    #[test]
    fn undefined_variable_matches_as_empty_string() {
        assert!(truthful("$UNDEFINED =~ /^$/"));
        assert!(!truthful("$UNDEFINED =~ /.+/"));
    }

    #[test]
    fn pattern_from_variable() {
        let expr = parse("$CI_COMMIT_BRANCH =~ $RELEASE_PATTERN").unwrap();
        assert_eq!(evaluate(&expr, &vars).unwrap(), ExprValue::Bool(false));
    }

    #[test]
    fn invalid_pattern_variable_is_runtime_error() {
        let expr = parse("$CI_COMMIT_BRANCH =~ $NOT_A_PATTERN").unwrap();
        let err = evaluate(&expr, &vars).unwrap_err();
        assert!(err.contains("not a valid pattern"), "{err}");

        let expr = parse("$CI_COMMIT_BRANCH =~ $UNDEFINED").unwrap();
        assert!(evaluate(&expr, &vars).is_err());
    }

    #[test]
    fn boolean_operators() {
        assert!(truthful(r#"$DEPLOY && $CI_COMMIT_BRANCH == "main""#));
        assert!(!truthful(r#"$UNDEFINED && $CI_COMMIT_BRANCH == "main""#));
        assert!(truthful(r#"$UNDEFINED || $CI_COMMIT_BRANCH == "main""#));
        assert!(!truthful(r#"$UNDEFINED || $EMPTY"#));
    }

    #[test]
    fn or_short_circuits_before_runtime_error() {
        let expr = parse("$DEPLOY || $CI_COMMIT_BRANCH =~ $NOT_A_PATTERN").unwrap();
        assert!(evaluate(&expr, &vars).unwrap().is_present());
    }
}
