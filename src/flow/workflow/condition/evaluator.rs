// SPDX-License-Identifier: MIT

//! Condition expression evaluator
//!
//! Expressions are evaluated against a JSON object of bound variables.
//! Comparison follows loose, JavaScript-like rules: a missing value equals
//! `null`, numeric strings compare as numbers, and `.length` works on strings
//! and arrays.

use super::ast::{CompareOp, Expression, Literal, Operand};
use serde_json::Value;

/// Evaluate a condition expression against bound variables
pub fn evaluate(expr: &Expression, bindings: &Value) -> bool {
    match expr {
        Expression::True => true,
        Expression::False => false,
        Expression::Compare { left, op, right } => {
            let left = resolve(left, bindings);
            let right = resolve(right, bindings);
            evaluate_compare(left.as_ref(), *op, right.as_ref())
        }
        Expression::Truthy(operand) => is_truthy(resolve(operand, bindings).as_ref()),
        Expression::And(left, right) => evaluate(left, bindings) && evaluate(right, bindings),
        Expression::Or(left, right) => evaluate(left, bindings) || evaluate(right, bindings),
        Expression::Not(inner) => !evaluate(inner, bindings),
    }
}

fn resolve(operand: &Operand, bindings: &Value) -> Option<Value> {
    match operand {
        Operand::Path(path) => lookup_path(bindings, path),
        Operand::Literal(Literal::Null) => Some(Value::Null),
        Operand::Literal(Literal::Boolean(b)) => Some(Value::Bool(*b)),
        Operand::Literal(Literal::String(s)) => Some(Value::String(s.clone())),
        Operand::Literal(Literal::Number(n)) => {
            serde_json::Number::from_f64(*n).map(Value::Number)
        }
    }
}

/// Resolve a dot path such as `input.items.0.name` or `output.length`
pub fn lookup_path(root: &Value, path: &str) -> Option<Value> {
    let mut current = root.clone();
    for segment in path.split('.') {
        current = match current {
            Value::Object(mut map) => map.remove(segment)?,
            Value::Array(mut items) => {
                if segment == "length" {
                    Value::from(items.len())
                } else {
                    let index: usize = segment.parse().ok()?;
                    if index >= items.len() {
                        return None;
                    }
                    items.swap_remove(index)
                }
            }
            Value::String(s) if segment == "length" => Value::from(s.chars().count()),
            _ => return None,
        };
    }
    Some(current)
}

fn evaluate_compare(left: Option<&Value>, op: CompareOp, right: Option<&Value>) -> bool {
    match op {
        CompareOp::Eq => loose_equal(left, right),
        CompareOp::NotEq => !loose_equal(left, right),
        CompareOp::Gt => compare_ordered(left, right, |o| o.is_gt()),
        CompareOp::Gte => compare_ordered(left, right, |o| o.is_ge()),
        CompareOp::Lt => compare_ordered(left, right, |o| o.is_lt()),
        CompareOp::Lte => compare_ordered(left, right, |o| o.is_le()),
        CompareOp::Contains => check_contains(left, right),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn loose_equal(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (None | Some(Value::Null), None | Some(Value::Null)) => true,
        (None | Some(Value::Null), _) | (_, None | Some(Value::Null)) => false,
        (Some(Value::String(a)), Some(Value::String(b))) => a == b,
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a == b,
        (Some(l @ (Value::Number(_) | Value::String(_))), Some(r @ (Value::Number(_) | Value::String(_)))) => {
            match (as_number(l), as_number(r)) {
                (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
                _ => false,
            }
        }
        (Some(a), Some(b)) => a == b,
    }
}

fn compare_ordered<F>(left: Option<&Value>, right: Option<&Value>, cmp: F) -> bool
where
    F: Fn(std::cmp::Ordering) -> bool,
{
    let (Some(left), Some(right)) = (left, right) else {
        return false;
    };

    if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
        return a.partial_cmp(&b).map(cmp).unwrap_or(false);
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => cmp(a.cmp(b)),
        _ => false,
    }
}

fn check_contains(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        // String contains substring
        (Some(Value::String(s)), Some(Value::String(sub))) => s.contains(sub.as_str()),
        (Some(Value::String(s)), Some(Value::Number(n))) => s.contains(&n.to_string()),
        // Array contains value
        (Some(Value::Array(items)), Some(needle)) => {
            items.iter().any(|v| loose_equal(Some(v), Some(needle)))
        }
        // Object has key
        (Some(Value::Object(map)), Some(Value::String(key))) => map.contains_key(key),
        _ => false,
    }
}

/// JavaScript truthiness
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::workflow::condition::parser::parse;
    use serde_json::json;

    fn eval(expr: &str, bindings: Value) -> bool {
        evaluate(&parse(expr).unwrap(), &bindings)
    }

    #[test]
    fn test_string_equality() {
        let b = json!({"input": "search"});
        assert!(eval("input == 'search'", b.clone()));
        assert!(!eval("input == 'code'", b.clone()));
        assert!(eval("input != 'code'", b));
    }

    #[test]
    fn test_number_comparison() {
        let b = json!({"output": {"score": 7.5}});
        assert!(eval("output.score > 5", b.clone()));
        assert!(!eval("output.score > 10", b.clone()));
        assert!(eval("output.score >= 7.5", b.clone()));
        assert!(eval("output.score < 10", b.clone()));
        assert!(eval("output.score <= 7.5", b.clone()));
        assert!(!eval("output.score <= 7", b));
    }

    #[test]
    fn test_numeric_strings_compare_as_numbers() {
        let b = json!({"input": "42"});
        assert!(eval("input == 42", b.clone()));
        assert!(eval("input > 40", b));
    }

    #[test]
    fn test_iteration_against_max_cycles() {
        let b = json!({"iteration": 2, "maxCycles": 3});
        assert!(eval("iteration < maxCycles", b.clone()));
        assert!(!eval("iteration >= maxCycles", b));
    }

    #[test]
    fn test_missing_field_is_null() {
        let b = json!({"input": {}});
        assert!(eval("input.missing == null", b.clone()));
        assert!(!eval("input.missing == 'value'", b.clone()));
        assert!(!eval("input.missing > 1", b));
    }

    #[test]
    fn test_length() {
        let b = json!({"input": {"items": [1, 2, 3], "name": "abc"}});
        assert!(eval("input.items.length == 3", b.clone()));
        assert!(eval("input.name.length > 2", b.clone()));
        assert!(eval("input.items[1] == 2", b));
    }

    #[test]
    fn test_contains() {
        let b = json!({"input": "hello world", "tags": ["bug", "urgent"]});
        assert!(eval("input contains 'world'", b.clone()));
        assert!(!eval("input contains 'foo'", b.clone()));
        assert!(eval("tags contains 'bug'", b.clone()));
        assert!(!eval("tags contains 'frontend'", b));
    }

    #[test]
    fn test_truthiness() {
        let b = json!({"input": {"done": true, "empty": "", "zero": 0, "list": []}});
        assert!(eval("input.done", b.clone()));
        assert!(!eval("input.empty", b.clone()));
        assert!(!eval("input.zero", b.clone()));
        assert!(eval("input.list", b.clone()));
        assert!(!eval("input.nothing", b.clone()));
        assert!(eval("!input.nothing", b));
    }

    #[test]
    fn test_and_or() {
        let b = json!({"input": {"kind": "feature", "priority": 5}});
        assert!(eval("input.kind == 'bug' or input.priority > 3", b.clone()));
        assert!(!eval("input.kind == 'bug' && input.priority > 3", b.clone()));
        assert!(eval("(input.kind == 'bug' || input.kind == 'feature') && input.priority == 5", b));
    }
}
