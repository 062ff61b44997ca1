//! pest-based parser producing the expression AST.
//!
//! The grammar lives in `condition.pest`. Precedence from loosest to
//! tightest: `or`, `and`, `not`, comparison, operand.

use pest::error::LineColLocation;
use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;
use serde_json::Value;

use crate::error::StepError;

/// Deepest bracket/parenthesis nesting accepted.
pub const MAX_NESTING_DEPTH: usize = 32;

#[derive(Parser)]
#[grammar = "expression/condition.pest"]
struct ConditionParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Field(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Path(Vec<Segment>),
    List(Vec<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
}

type ParseResult<T> = Result<T, StepError>;

/* ===================== Public API ===================== */

/// Parse a complete condition.
pub(crate) fn parse_condition(source: &str) -> ParseResult<Expr> {
    check_nesting(source)?;
    let mut pairs = ConditionParser::parse(Rule::condition, source).map_err(syntax_error)?;
    let condition = next_inner(&mut pairs, "condition")?;
    build_expr(first_inner(condition)?)
}

/// Parse a bare path such as `order.items[0].sku`.
pub(crate) fn parse_path(source: &str) -> ParseResult<Vec<Segment>> {
    check_nesting(source)?;
    let mut pairs = ConditionParser::parse(Rule::path_only, source).map_err(syntax_error)?;
    let path_only = next_inner(&mut pairs, "path")?;
    build_path(first_inner(path_only)?)
}

/* ===================== Errors ===================== */

fn syntax_error(err: pest::error::Error<Rule>) -> StepError {
    let column = match err.line_col {
        LineColLocation::Pos((_, col)) => col,
        LineColLocation::Span((_, col), _) => col,
    };
    StepError::Expression(format!(
        "syntax error at column {}: {}",
        column,
        err.variant.message()
    ))
}

fn build_error(message: impl Into<String>) -> StepError {
    StepError::Expression(message.into())
}

/// Reject nesting the recursive grammar could not descend safely.
fn check_nesting(source: &str) -> ParseResult<()> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in source.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => {
                depth += 1;
                if depth > MAX_NESTING_DEPTH {
                    return Err(build_error(format!(
                        "expression nests deeper than {} levels",
                        MAX_NESTING_DEPTH
                    )));
                }
            }
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

/* ===================== AST Builder ===================== */

fn next_inner<'i>(pairs: &mut Pairs<'i, Rule>, what: &str) -> ParseResult<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| build_error(format!("missing {}", what)))
}

fn first_inner(pair: Pair<'_, Rule>) -> ParseResult<Pair<'_, Rule>> {
    let rule = pair.as_rule();
    pair.into_inner()
        .next()
        .ok_or_else(|| build_error(format!("empty {:?}", rule)))
}

fn build_expr(pair: Pair<'_, Rule>) -> ParseResult<Expr> {
    match pair.as_rule() {
        Rule::or_expr => build_chain(pair, Rule::op_or, Expr::Or),
        Rule::and_expr => build_chain(pair, Rule::op_and, Expr::And),
        Rule::unary => build_unary(pair),
        Rule::comparison => build_comparison(pair),
        Rule::group => build_expr(first_inner(pair)?),
        Rule::list => pair
            .into_inner()
            .map(build_expr)
            .collect::<ParseResult<Vec<_>>>()
            .map(Expr::List),
        Rule::template => Ok(Expr::Path(build_path(first_inner(pair)?)?)),
        Rule::path => Ok(Expr::Path(build_path(pair)?)),
        Rule::number => {
            let text = pair.as_str();
            text.parse::<f64>()
                .map(|n| Expr::Literal(number(n)))
                .map_err(|_| build_error(format!("invalid number '{}'", text)))
        }
        Rule::string => Ok(Expr::Literal(Value::String(build_string(pair)?))),
        Rule::true_lit => Ok(Expr::Literal(Value::Bool(true))),
        Rule::false_lit => Ok(Expr::Literal(Value::Bool(false))),
        Rule::null_lit => Ok(Expr::Literal(Value::Null)),
        other => Err(build_error(format!("unexpected expression rule {:?}", other))),
    }
}

/// Left-associative fold of `operand (op operand)*`.
fn build_chain(
    pair: Pair<'_, Rule>,
    op: Rule,
    combine: fn(Box<Expr>, Box<Expr>) -> Expr,
) -> ParseResult<Expr> {
    let mut operands = pair.into_inner().filter(|p| p.as_rule() != op);
    let first = operands
        .next()
        .ok_or_else(|| build_error("missing left operand"))?;

    operands.try_fold(build_expr(first)?, |left, right| {
        Ok(combine(Box::new(left), Box::new(build_expr(right)?)))
    })
}

fn build_unary(pair: Pair<'_, Rule>) -> ParseResult<Expr> {
    let mut negations = 0usize;
    let mut operand = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::op_not => negations += 1,
            _ => operand = Some(inner),
        }
    }
    let expr = build_expr(operand.ok_or_else(|| build_error("missing operand after 'not'"))?)?;

    // `not` always yields a bool, so only parity past the first two matters.
    Ok(match negations {
        0 => expr,
        n if n % 2 == 1 => Expr::Not(Box::new(expr)),
        _ => Expr::Not(Box::new(Expr::Not(Box::new(expr)))),
    })
}

fn build_comparison(pair: Pair<'_, Rule>) -> ParseResult<Expr> {
    let mut inner = pair.into_inner();
    let left = build_expr(next_inner(&mut inner, "operand")?)?;

    let Some(op_pair) = inner.next() else {
        return Ok(left);
    };
    let op = match op_pair.as_rule() {
        Rule::op_eq => CmpOp::Eq,
        Rule::op_ne => CmpOp::Ne,
        Rule::op_gt => CmpOp::Gt,
        Rule::op_lt => CmpOp::Lt,
        Rule::op_ge => CmpOp::Ge,
        Rule::op_le => CmpOp::Le,
        Rule::op_in => CmpOp::In,
        Rule::op_not_in => CmpOp::NotIn,
        other => return Err(build_error(format!("unexpected operator {:?}", other))),
    };
    let right = build_expr(next_inner(&mut inner, "right operand")?)?;

    Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
}

fn build_path(pair: Pair<'_, Rule>) -> ParseResult<Vec<Segment>> {
    pair.into_inner()
        .map(|segment| match segment.as_rule() {
            Rule::ident => Ok(Segment::Field(segment.as_str().to_string())),
            Rule::string => build_string(segment).map(Segment::Field),
            Rule::index_num => segment
                .as_str()
                .parse::<usize>()
                .map(Segment::Index)
                .map_err(|_| build_error(format!("invalid index '{}'", segment.as_str()))),
            other => Err(build_error(format!("unexpected path segment {:?}", other))),
        })
        .collect()
}

fn build_string(pair: Pair<'_, Rule>) -> ParseResult<String> {
    let raw = first_inner(pair)?.as_str();
    let mut value = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => value.push('\n'),
            Some('t') => value.push('\t'),
            Some(other) => value.push(other),
            None => value.push('\\'),
        }
    }
    Ok(value)
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_comparison() {
        let expr = parse_condition("amount > 100").unwrap();
        assert_eq!(
            expr,
            Expr::Compare(
                CmpOp::Gt,
                Box::new(Expr::Path(vec![Segment::Field("amount".into())])),
                Box::new(Expr::Literal(json!(100)))
            )
        );
        assert_eq!(
            parse_condition("x > -3.5").unwrap(),
            Expr::Compare(
                CmpOp::Gt,
                Box::new(Expr::Path(vec![Segment::Field("x".into())])),
                Box::new(Expr::Literal(json!(-3.5)))
            )
        );
    }

    #[test]
    fn test_parse_precedence() {
        // and binds tighter than or
        let expr = parse_condition("a or b and c").unwrap();
        assert!(matches!(expr, Expr::Or(_, ref right) if matches!(**right, Expr::And(_, _))));

        let expr = parse_condition("a || b || c").unwrap();
        assert!(matches!(expr, Expr::Or(ref left, _) if matches!(**left, Expr::Or(_, _))));
    }

    #[test]
    fn test_parse_not_forms() {
        let expr = parse_condition("status not in ['closed', 'void']").unwrap();
        assert!(matches!(expr, Expr::Compare(CmpOp::NotIn, _, _)));

        let expr = parse_condition("!done").unwrap();
        assert!(matches!(expr, Expr::Not(_)));

        // keyword prefixes stay identifiers
        let expr = parse_condition("notes == nothing").unwrap();
        assert!(matches!(expr, Expr::Compare(CmpOp::Eq, _, _)));
        let expr = parse_condition("index in inbox").unwrap();
        assert!(matches!(expr, Expr::Compare(CmpOp::In, _, _)));
    }

    #[test]
    fn test_long_negation_chain_collapses() {
        let source = format!("{}flag", "!".repeat(501));
        assert_eq!(
            parse_condition(&source).unwrap(),
            Expr::Not(Box::new(Expr::Path(vec![Segment::Field("flag".into())])))
        );
    }

    #[test]
    fn test_parse_path_segments() {
        let path = parse_path("order.items[1]['sku']").unwrap();
        assert_eq!(
            path,
            vec![
                Segment::Field("order".into()),
                Segment::Field("items".into()),
                Segment::Index(1),
                Segment::Field("sku".into()),
            ]
        );
        assert_eq!(
            parse_path("$json.rows.0").unwrap(),
            vec![
                Segment::Field("$json".into()),
                Segment::Field("rows".into()),
                Segment::Index(0),
            ]
        );
    }

    #[test]
    fn test_parse_strings_and_templates() {
        assert_eq!(
            parse_condition(r#"'it\'s'"#).unwrap(),
            Expr::Literal(json!("it's"))
        );
        assert_eq!(
            parse_condition("\"a\\nb\"").unwrap(),
            Expr::Literal(json!("a\nb"))
        );
        assert_eq!(
            parse_condition("{{ order.total }}").unwrap(),
            Expr::Path(vec![Segment::Field("order".into()), Segment::Field("total".into())])
        );
    }

    #[test]
    fn test_parse_errors() {
        for source in ["", "a >", "(a > 1", "a > 1 b", "a.", "a; rm -rf", "'open", "__import__('os') + 1"] {
            assert!(parse_condition(source).is_err(), "accepted {:?}", source);
        }
    }

    #[test]
    fn test_nesting_limit() {
        let ok = format!("{}a{}", "(".repeat(MAX_NESTING_DEPTH), ")".repeat(MAX_NESTING_DEPTH));
        assert!(parse_condition(&ok).is_ok());

        let deep = format!("{}a{}", "(".repeat(499), ")".repeat(499));
        let err = parse_condition(&deep).unwrap_err();
        assert!(err.to_string().contains("nests deeper"));

        let deep_list = format!("x in {}1{}", "[".repeat(200), "]".repeat(200));
        assert!(parse_condition(&deep_list).is_err());

        // brackets inside strings do not count
        let quoted = format!("name == '{}'", "(".repeat(100));
        assert!(parse_condition(&quoted).is_ok());
    }
}
