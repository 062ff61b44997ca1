//! Condition expression mini-language used by flow-control steps.
//!
//! Expressions are parsed with a pest grammar into an AST, then evaluated
//! against a JSON scope. Only comparison and boolean operators exist; there is no way to
//! call functions or reach anything outside the scope value.

mod parser;

use serde_json::Value;
use std::cmp::Ordering;

use crate::error::StepError;
use parser::{CmpOp, Expr, Segment};

pub use parser::MAX_NESTING_DEPTH;

/// Longest expression source accepted.
pub const MAX_EXPRESSION_LENGTH: usize = 1000;

/// A parsed expression, reusable across many scopes.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    /// Parse an expression.
    pub fn parse(source: &str) -> Result<Self, StepError> {
        if source.len() > MAX_EXPRESSION_LENGTH {
            return Err(StepError::Expression(format!(
                "expression exceeds {} characters",
                MAX_EXPRESSION_LENGTH
            )));
        }
        let ast = parser::parse_condition(source)?;
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate to a JSON value.
    pub fn evaluate(&self, scope: &Value) -> Result<Value, StepError> {
        eval(&self.ast, scope)
    }

    /// Evaluate and reduce to truthiness.
    pub fn is_true(&self, scope: &Value) -> Result<bool, StepError> {
        self.evaluate(scope).map(|v| truthy(&v))
    }
}

/// Parse and evaluate a boolean condition against `scope`.
pub fn evaluate_condition(source: &str, scope: &Value) -> Result<bool, StepError> {
    Expression::parse(source)?.is_true(scope)
}

/// Parse and evaluate an expression to its value.
pub fn evaluate_value(source: &str, scope: &Value) -> Result<Value, StepError> {
    Expression::parse(source)?.evaluate(scope)
}

/// Resolve a dotted/indexed path (`order.items[0]`) inside `value`.
///
/// Returns `None` when the path is malformed or does not exist.
pub fn lookup_path(value: &Value, path: &str) -> Option<Value> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Some(value.clone());
    }
    let segments = parser::parse_path(trimmed).ok()?;
    resolve(value, &segments).ok().cloned()
}

/// JSON truthiness: null, false, 0, "" and empty collections are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Render a value the way it is compared against string keys (switch cases).
pub fn value_to_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn eval(expr: &Expr, scope: &Value) -> Result<Value, StepError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path(segments) => resolve(scope, segments).cloned(),
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, scope)?))),
        Expr::And(left, right) => {
            if !truthy(&eval(left, scope)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&eval(right, scope)?)))
        }
        Expr::Or(left, right) => {
            if truthy(&eval(left, scope)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&eval(right, scope)?)))
        }
        Expr::Compare(op, left, right) => {
            let left = eval(left, scope)?;
            let right = eval(right, scope)?;
            compare(*op, &left, &right).map(Value::Bool)
        }
    }
}

fn resolve<'a>(scope: &'a Value, segments: &[Segment]) -> Result<&'a Value, StepError> {
    let mut segments = segments;

    // `$json.x` / `$input.x` address the scope root
    if let Some(Segment::Field(first)) = segments.first() {
        if first == "$json" || first == "$input" {
            segments = &segments[1..];
        }
    }

    let mut current = scope;
    for segment in segments {
        current = match (segment, current) {
            (Segment::Field(name), Value::Object(map)) => map
                .get(name)
                .ok_or_else(|| StepError::Expression(format!("unknown field '{}'", name)))?,
            (Segment::Index(idx), Value::Array(items)) => items
                .get(*idx)
                .ok_or_else(|| StepError::Expression(format!("index {} out of range", idx)))?,
            (Segment::Field(name), _) => {
                return Err(StepError::Expression(format!(
                    "cannot read field '{}' of a non-object",
                    name
                )))
            }
            (Segment::Index(idx), _) => {
                return Err(StepError::Expression(format!(
                    "cannot index [{}] into a non-array",
                    idx
                )))
            }
        };
    }
    Ok(current)
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, StepError> {
    match op {
        CmpOp::Eq => Ok(loose_eq(left, right)),
        CmpOp::Ne => Ok(!loose_eq(left, right)),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => contains(right, left).map(|found| !found),
        CmpOp::Gt => order(left, right).map(|o| o == Ordering::Greater),
        CmpOp::Lt => order(left, right).map(|o| o == Ordering::Less),
        CmpOp::Ge => order(left, right).map(|o| o != Ordering::Less),
        CmpOp::Le => order(left, right).map(|o| o != Ordering::Greater),
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Result<Ordering, StepError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            a.partial_cmp(&b)
                .ok_or_else(|| StepError::Expression("cannot order NaN".into()))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(StepError::Expression(format!(
            "cannot order {} against {}",
            type_name(left),
            type_name(right)
        ))),
    }
}

fn contains(haystack: &Value, needle: &Value) -> Result<bool, StepError> {
    match (haystack, needle) {
        (Value::Array(items), _) => Ok(items.iter().any(|item| loose_eq(item, needle))),
        (Value::String(s), Value::String(sub)) => Ok(s.contains(sub.as_str())),
        (Value::Object(map), Value::String(key)) => Ok(map.contains_key(key)),
        _ => Err(StepError::Expression(format!(
            "'in' is not supported between {} and {}",
            type_name(needle),
            type_name(haystack)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
