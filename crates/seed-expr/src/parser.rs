use winnow::ascii::multispace0;
use winnow::combinator::{alt, cut_err, delimited, eof, not, opt, preceded, repeat};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::token::{any, literal, one_of, take_till, take_while};
use winnow::{ModalResult, Parser};

use crate::ast::{CompareOp, Expression, Pattern};

fn make_cut_error(desc: &'static str) -> ErrMode<ContextError<StrContext>> {
    let mut e = ContextError::new();
    e.push(StrContext::Expected(StrContextValue::Description(desc)));
    ErrMode::Cut(e)
}

fn ws<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    multispace0.parse_next(input)
}

fn next_char(input: &mut &str) -> ModalResult<char> {
    any.parse_next(input)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// `$NAME`
fn variable(input: &mut &str) -> ModalResult<Expression> {
    preceded('$', take_while(1.., is_name_char))
        .map(|name: &str| Expression::Variable(name.to_string()))
        .parse_next(input)
}

/// `"text"` or `'text'`; no escapes.
fn string_literal(input: &mut &str) -> ModalResult<Expression> {
    alt((
        delimited('"', take_till(0.., '"'), cut_err('"')),
        delimited('\'', take_till(0.., '\''), cut_err('\'')),
    ))
    .map(|s: &str| Expression::String(s.to_string()))
    .parse_next(input)
}

/// `/regex/flags`; `\/` inside the body is an escaped slash.
fn pattern_literal(input: &mut &str) -> ModalResult<Expression> {
    let _ = '/'.parse_next(input)?;
    let mut source = String::new();
    loop {
        let c = cut_err(next_char)
            .context(StrContext::Expected(StrContextValue::Description(
                "closing '/' of pattern",
            )))
            .parse_next(input)?;
        match c {
            '/' => break,
            '\\' => {
                let escaped = cut_err(next_char).parse_next(input)?;
                if escaped != '/' {
                    source.push('\\');
                }
                source.push(escaped);
            }
            other => source.push(other),
        }
    }
    let flags: &str =
        take_while(0.., |c: char| matches!(c, 'i' | 'm' | 's' | 'x')).parse_next(input)?;
    Pattern::new(&source, flags)
        .map(Expression::Pattern)
        .map_err(|_| make_cut_error("valid regular expression"))
}

/// `null`, not followed by a name character.
fn null_literal(input: &mut &str) -> ModalResult<Expression> {
    (literal("null"), not(one_of(is_name_char)))
        .value(Expression::Null)
        .parse_next(input)
}

fn parenthesized(input: &mut &str) -> ModalResult<Expression> {
    delimited(('(', ws), or_expr, (ws, cut_err(')'))).parse_next(input)
}

fn operand(input: &mut &str) -> ModalResult<Expression> {
    alt((
        variable,
        string_literal,
        pattern_literal,
        null_literal,
        parenthesized,
    ))
    .context(StrContext::Expected(StrContextValue::Description("operand")))
    .parse_next(input)
}

fn compare_op(input: &mut &str) -> ModalResult<CompareOp> {
    alt((
        "==".value(CompareOp::Equals),
        "!=".value(CompareOp::NotEquals),
        "=~".value(CompareOp::Matches),
        "!~".value(CompareOp::NotMatches),
    ))
    .parse_next(input)
}

/// operand ( op operand )?
fn comparison(input: &mut &str) -> ModalResult<Expression> {
    let left = operand.parse_next(input)?;
    let rest = opt((ws, compare_op, ws, cut_err(operand))).parse_next(input)?;
    Ok(match rest {
        Some((_, op, _, right)) => Expression::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        None => left,
    })
}

/// comparison ( '&&' comparison )*
fn and_expr(input: &mut &str) -> ModalResult<Expression> {
    let first = comparison.parse_next(input)?;
    let rest: Vec<Expression> =
        repeat(0.., preceded((ws, "&&", ws), cut_err(comparison))).parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |acc, next| Expression::And(Box::new(acc), Box::new(next))))
}

/// and_expr ( '||' and_expr )*
fn or_expr(input: &mut &str) -> ModalResult<Expression> {
    let first = and_expr.parse_next(input)?;
    let rest: Vec<Expression> =
        repeat(0.., preceded((ws, "||", ws), cut_err(and_expr))).parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |acc, next| Expression::Or(Box::new(acc), Box::new(next))))
}

fn statement(input: &mut &str) -> ModalResult<Expression> {
    delimited(ws, or_expr, (ws, eof)).parse_next(input)
}

/// Public entry point.
pub fn parse(source: &str) -> seed_types::Result<Expression> {
    let mut remaining = source;
    statement.parse_next(&mut remaining).map_err(|e| {
        let offset = source.len() - remaining.len();
        let message = match e.to_string() {
            m if m.trim().is_empty() => "unexpected input".to_string(),
            m => m,
        };
        seed_types::SeedError::ExpressionParse {
            expression: source.to_string(),
            offset,
            message,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Box<Expression> {
        Box::new(Expression::Variable(name.into()))
    }

    fn string(s: &str) -> Box<Expression> {
        Box::new(Expression::String(s.into()))
    }

    #[test]
    fn parse_bare_variable() {
        assert_eq!(parse("$DEPLOY").unwrap(), Expression::Variable("DEPLOY".into()));
        assert_eq!(parse("  $DEPLOY  ").unwrap(), Expression::Variable("DEPLOY".into()));
    }

    #[test]
    fn parse_equality_with_both_quote_styles() {
        let expected = Expression::Compare {
            left: var("CI_COMMIT_BRANCH"),
            op: CompareOp::Equals,
            right: string("main"),
        };
        assert_eq!(parse(r#"$CI_COMMIT_BRANCH == "main""#).unwrap(), expected);
        assert_eq!(parse("$CI_COMMIT_BRANCH == 'main'").unwrap(), expected);
        assert_eq!(parse(r#"$CI_COMMIT_BRANCH=="main""#).unwrap(), expected);
    }

    #[test]
    fn parse_all_operators() {
        for (src, op) in [
            ("$A == $B", CompareOp::Equals),
            ("$A != $B", CompareOp::NotEquals),
            ("$A =~ /x/", CompareOp::Matches),
            ("$A !~ /x/", CompareOp::NotMatches),
        ] {
            match parse(src).unwrap() {
                Expression::Compare { op: parsed, .. } => assert_eq!(parsed, op, "{src}"),
                other => panic!("unexpected {other:?} for {src}"),
            }
        }
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse("$A || $B && $C").unwrap();
        assert_eq!(
            expr,
            Expression::Or(var("A"), Box::new(Expression::And(var("B"), var("C"))))
        );
    }

    #[test]
    fn parentheses_override_precedence() {
        let expr = parse("($A || $B) && $C").unwrap();
        assert_eq!(
            expr,
            Expression::And(Box::new(Expression::Or(var("A"), var("B"))), var("C"))
        );
    }

    #[test]
    fn parse_pattern_with_flags_and_escaped_slash() {
        match parse(r"$REF =~ /^release\/.*$/i").unwrap() {
            Expression::Compare { right, .. } => match *right {
                Expression::Pattern(p) => {
                    assert_eq!(p.source(), "^release/.*$");
                    assert_eq!(p.flags(), "i");
                    assert!(p.is_match("RELEASE/1.0"));
                }
                other => panic!("expected pattern, got {other:?}"),
            },
            other => panic!("expected comparison, got {other:?}"),
        }
    }

    #[test]
    fn parse_null_literal() {
        assert_eq!(
            parse("$A == null").unwrap(),
            Expression::Compare {
                left: var("A"),
                op: CompareOp::Equals,
                right: Box::new(Expression::Null),
            }
        );
    }

    #[test]
    fn parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("$A ==").is_err());
        assert!(parse("$A == \"unterminated").is_err());
        assert!(parse("$A =~ /unterminated").is_err());
        assert!(parse("$A =~ /(unbalanced/").is_err());
        assert!(parse("$A && ").is_err());
        assert!(parse("($A").is_err());
        assert!(parse("$A $B").is_err());
        assert!(parse("nullish").is_err());
    }

    #[test]
    fn parse_error_carries_expression() {
        match parse("$A ==") {
            Err(seed_types::SeedError::ExpressionParse { expression, .. }) => {
                assert_eq!(expression, "$A ==");
            }
            other => panic!("expected ExpressionParse, got {other:?}"),
        }
    }
}
