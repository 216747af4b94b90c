use serde_json::Value;
use std::collections::HashMap;

/// Variable bag threaded through instances, tasks and executions.
///
/// String keys, arbitrary JSON values. The engine never interprets the
/// values itself; condition evaluation is delegated to a
/// [`crate::expr::ConditionEvaluator`].
pub type Variables = HashMap<String, Value>;

/// Copy entries from `source` that are absent in `target`.
///
/// Used when instance variables are folded into the variables of a
/// single call: the call's own values win.
pub fn merge_missing(target: &mut Variables, source: &Variables) {
    for (key, value) in source {
        target
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}

/// Loose truthiness for condition guards over raw JSON values.
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
