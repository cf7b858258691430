// SPDX-License-Identifier: MIT

//! Condition expression parser
//!
//! Parses expressions like:
//! - `input.status == 'done'`
//! - `iteration < maxCycles and output.score > 0.8`
//! - `!(input.items.length > 0) || input.force`
//!
//! Both word operators (`and`, `or`, `not`) and their C-style spellings are
//! accepted, since model-written graphs use either.

use super::ast::{CompareOp, Expression, Literal, Operand};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
#[error("Could not parse condition '{input}': {reason}")]
pub struct ParseError {
    pub input: String,
    pub reason: String,
}

impl ParseError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parse a condition expression string into an AST
pub fn parse(input: &str) -> Result<Expression, ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseError::new(input, "expression is empty"));
    }
    check_balanced(input)?;

    if let Some(inner) = strip_outer_parens(input) {
        return parse(inner);
    }

    // Lowest precedence first
    for op in ["||", " or "] {
        if let Some(pos) = find_top_level(input, op) {
            let left = parse(&input[..pos])?;
            let right = parse(&input[pos + op.len()..])?;
            return Ok(Expression::Or(Box::new(left), Box::new(right)));
        }
    }
    for op in ["&&", " and "] {
        if let Some(pos) = find_top_level(input, op) {
            let left = parse(&input[..pos])?;
            let right = parse(&input[pos + op.len()..])?;
            return Ok(Expression::And(Box::new(left), Box::new(right)));
        }
    }

    if let Some(rest) = input.strip_prefix("not ") {
        return Ok(Expression::Not(Box::new(parse(rest)?)));
    }
    if let Some(rest) = input.strip_prefix('!') {
        if !rest.starts_with('=') {
            return Ok(Expression::Not(Box::new(parse(rest)?)));
        }
    }

    match input {
        "true" => return Ok(Expression::True),
        "false" => return Ok(Expression::False),
        _ => {}
    }

    if let Some(expr) = parse_comparison(input)? {
        return Ok(expr);
    }

    Ok(Expression::Truthy(parse_operand(input)?))
}

fn parse_comparison(input: &str) -> Result<Option<Expression>, ParseError> {
    // Longest spelling first so `===` is not read as `==` followed by `=`
    let operators = [
        ("===", CompareOp::Eq),
        ("!==", CompareOp::NotEq),
        ("==", CompareOp::Eq),
        ("!=", CompareOp::NotEq),
        (">=", CompareOp::Gte),
        ("<=", CompareOp::Lte),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
        (" contains ", CompareOp::Contains),
    ];

    for (op_str, op) in operators {
        if let Some(pos) = find_top_level(input, op_str) {
            let left = parse_operand(&input[..pos])?;
            let right = parse_operand(&input[pos + op_str.len()..])?;
            return Ok(Some(Expression::Compare { left, op, right }));
        }
    }

    Ok(None)
}

/// Byte offset of the first `op` outside quotes and parentheses
fn find_top_level(input: &str, op: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in input.char_indices() {
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
            '(' => depth += 1,
            ')' => depth -= 1,
            _ if depth == 0 && input[i..].starts_with(op) => return Some(i),
            _ => {}
        }
    }
    None
}

fn check_balanced(input: &str) -> Result<(), ParseError> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in input.chars() {
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
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(ParseError::new(input, "unbalanced ')'"));
                }
            }
            _ => {}
        }
    }

    if quote.is_some() {
        return Err(ParseError::new(input, "unterminated string"));
    }
    if depth != 0 {
        return Err(ParseError::new(input, "unbalanced '('"));
    }
    Ok(())
}

/// `(a and b)` -> `a and b`, but `(a) and (b)` is left alone
fn strip_outer_parens(input: &str) -> Option<&str> {
    if !(input.starts_with('(') && input.ends_with(')')) {
        return None;
    }

    let last = input.len() - 1;
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in input.char_indices() {
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
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                // The opening paren closed before the end
                if depth == 0 && i != last {
                    return None;
                }
            }
            _ => {}
        }
    }
    Some(&input[1..last])
}

fn parse_operand(input: &str) -> Result<Operand, ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseError::new(input, "missing operand"));
    }

    match input {
        "null" | "undefined" => return Ok(Operand::Literal(Literal::Null)),
        "true" => return Ok(Operand::Literal(Literal::Boolean(true))),
        "false" => return Ok(Operand::Literal(Literal::Boolean(false))),
        _ => {}
    }

    if input.len() >= 2
        && ((input.starts_with('\'') && input.ends_with('\''))
            || (input.starts_with('"') && input.ends_with('"')))
    {
        let s = &input[1..input.len() - 1];
        return Ok(Operand::Literal(Literal::String(unescape(s))));
    }

    if let Ok(n) = input.parse::<f64>() {
        return Ok(Operand::Literal(Literal::Number(n)));
    }

    parse_path(input).map(Operand::Path)
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Normalise `input.items[0].name` to `input.items.0.name`
fn parse_path(input: &str) -> Result<String, ParseError> {
    let normalised = input.replace('[', ".").replace(']', "");
    let valid_segment = |seg: &str| {
        !seg.is_empty()
            && seg
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    };

    if !normalised.split('.').all(valid_segment) {
        return Err(ParseError::new(input, "expected a variable path or literal"));
    }
    if normalised.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(ParseError::new(input, "variable names cannot start with a digit"));
    }
    Ok(normalised)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> Operand {
        Operand::Path(p.to_string())
    }

    #[test]
    fn test_parse_simple_equality() {
        let expr = parse("input == 'search'").unwrap();
        assert_eq!(
            expr,
            Expression::Compare {
                left: path("input"),
                op: CompareOp::Eq,
                right: Operand::Literal(Literal::String("search".to_string())),
            }
        );
    }

    #[test]
    fn test_parse_strict_equality_spelling() {
        let expr = parse("input.status === \"done\"").unwrap();
        assert_eq!(
            expr,
            Expression::Compare {
                left: path("input.status"),
                op: CompareOp::Eq,
                right: Operand::Literal(Literal::String("done".to_string())),
            }
        );

        let expr = parse("input.status !== 'done'").unwrap();
        assert!(matches!(
            expr,
            Expression::Compare {
                op: CompareOp::NotEq,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_path_to_path() {
        let expr = parse("iteration < maxCycles").unwrap();
        assert_eq!(
            expr,
            Expression::Compare {
                left: path("iteration"),
                op: CompareOp::Lt,
                right: path("maxCycles"),
            }
        );
    }

    #[test]
    fn test_parse_numeric_comparison() {
        let expr = parse("output.score >= 0.8").unwrap();
        assert_eq!(
            expr,
            Expression::Compare {
                left: path("output.score"),
                op: CompareOp::Gte,
                right: Operand::Literal(Literal::Number(0.8)),
            }
        );
    }

    #[test]
    fn test_parse_index_path() {
        let expr = parse("input.items[0] == 'a'").unwrap();
        match expr {
            Expression::Compare { left, .. } => assert_eq!(left, path("input.items.0")),
            other => panic!("Expected Compare, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_and_or_precedence() {
        // a or (b and c)
        let expr = parse("a == 1 or b == 2 and c == 3").unwrap();
        match expr {
            Expression::Or(_, right) => assert!(matches!(*right, Expression::And(_, _))),
            other => panic!("Expected Or, got {:?}", other),
        }

        let expr = parse("a == 1 && b == 2 || c == 3").unwrap();
        match expr {
            Expression::Or(left, _) => assert!(matches!(*left, Expression::And(_, _))),
            other => panic!("Expected Or, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_parentheses_and_not() {
        let expr = parse("!(a == 1 || b == 2) && c").unwrap();
        match expr {
            Expression::And(left, right) => {
                assert!(matches!(*left, Expression::Not(_)));
                assert_eq!(*right, Expression::Truthy(path("c")));
            }
            other => panic!("Expected And, got {:?}", other),
        }

        let expr = parse("not input.done").unwrap();
        assert_eq!(
            expr,
            Expression::Not(Box::new(Expression::Truthy(path("input.done"))))
        );
    }

    #[test]
    fn test_operator_inside_string_is_ignored() {
        let expr = parse("input == 'a and b'").unwrap();
        assert_eq!(
            expr,
            Expression::Compare {
                left: path("input"),
                op: CompareOp::Eq,
                right: Operand::Literal(Literal::String("a and b".to_string())),
            }
        );
    }

    #[test]
    fn test_parse_contains() {
        let expr = parse("output contains 'done'").unwrap();
        assert!(matches!(
            expr,
            Expression::Compare {
                op: CompareOp::Contains,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse("true").unwrap(), Expression::True);
        assert_eq!(parse(" false ").unwrap(), Expression::False);
        assert_eq!(
            parse("input == null").unwrap(),
            Expression::Compare {
                left: path("input"),
                op: CompareOp::Eq,
                right: Operand::Literal(Literal::Null),
            }
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse("").is_err());
        assert!(parse("this is not valid").is_err());
        assert!(parse("(a == 1").is_err());
        assert!(parse("a == 'open").is_err());
        assert!(parse("a ==").is_err());
    }
}
