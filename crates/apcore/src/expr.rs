use crate::error::EngineError;
use crate::vars::{truthy, Variables};
use crate::Result;
use serde_json::Value;

/// Evaluates branch guard expressions against a variable bag.
///
/// Host-pluggable: applications with an existing expression language
/// bind their own evaluator at engine construction.
pub trait ConditionEvaluator: Send + Sync {
    fn eval(&self, expression: &str, variables: &Variables) -> Result<bool>;
}

/// Built-in evaluator for the guard forms process designers actually
/// write: `flag`, `!flag`, and `name <op> literal` with `==`, `!=`,
/// `>`, `>=`, `<`, `<=`. Literals are JSON; bare words compare as
/// strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleConditionEvaluator;

impl ConditionEvaluator for SimpleConditionEvaluator {
    fn eval(&self, expression: &str, variables: &Variables) -> Result<bool> {
        let expr = expression.trim();
        if expr.is_empty() {
            return Ok(true);
        }
        for op in ["==", "!=", ">=", "<=", ">", "<"] {
            if let Some((lhs, rhs)) = expr.split_once(op) {
                let name = lhs.trim();
                let literal = parse_literal(rhs.trim());
                let value = variables.get(name).unwrap_or(&Value::Null);
                return compare(op, value, &literal);
            }
        }
        if let Some(name) = expr.strip_prefix('!') {
            let value = variables.get(name.trim()).unwrap_or(&Value::Null);
            return Ok(!truthy(value));
        }
        let value = variables.get(expr).unwrap_or(&Value::Null);
        Ok(truthy(value))
    }
}

fn parse_literal(raw: &str) -> Value {
    let unquoted = raw
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')));
    if let Some(s) = unquoted {
        return Value::String(s.to_string());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn compare(op: &str, value: &Value, literal: &Value) -> Result<bool> {
    match op {
        "==" => Ok(value == literal),
        "!=" => Ok(value != literal),
        _ => {
            let ordering = match (value, literal) {
                (Value::Number(a), Value::Number(b)) => {
                    let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                    a.partial_cmp(&b)
                }
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            };
            let Some(ordering) = ordering else {
                return Err(EngineError::validation(format!(
                    "values not comparable with `{op}`: {value} vs {literal}"
                )));
            };
            Ok(match op {
                ">" => ordering.is_gt(),
                ">=" => ordering.is_ge(),
                "<" => ordering.is_lt(),
                "<=" => ordering.is_le(),
                _ => false,
            })
        }
    }
}
