//! Condition DSL (4.5, 9): a hand-written recursive-descent parser for the intentionally
//! tiny grammar `<path> (==|!=) <literal>`, `not <expr>`, or a bare `<path>` coerced to bool.
//! Anything outside the grammar is rejected; there is no general expression engine.

use serde_json::Value;

use super::io_resolver::{auto_resolve, resolve_path, state_as_value};
use super::state::WorkflowState;

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Bool(bool),
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Eq(String, Literal),
    Ne(String, Literal),
    Not(Box<Expr>),
    Truthy(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid condition expression: {0}")]
pub struct ConditionParseError(pub String);

fn parse_literal(raw: &str) -> Result<Literal, ConditionParseError> {
    let trimmed = raw.trim();
    match trimmed {
        "true" => return Ok(Literal::Bool(true)),
        "false" => return Ok(Literal::Bool(false)),
        _ => {}
    }
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        return Ok(Literal::Str(trimmed[1..trimmed.len() - 1].to_string()));
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(Literal::Int(n));
    }
    Err(ConditionParseError(format!("unrecognized literal: {raw}")))
}

fn parse_expr(raw: &str) -> Result<Expr, ConditionParseError> {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("not ") {
        return Ok(Expr::Not(Box::new(parse_expr(rest)?)));
    }
    if let Some((path, literal)) = split_operator(trimmed, "==") {
        return Ok(Expr::Eq(path, parse_literal(literal)?));
    }
    if let Some((path, literal)) = split_operator(trimmed, "!=") {
        return Ok(Expr::Ne(path, parse_literal(literal)?));
    }
    if trimmed.is_empty() {
        return Err(ConditionParseError("empty expression".to_string()));
    }
    Ok(Expr::Truthy(trimmed.to_string()))
}

fn split_operator<'a>(input: &'a str, op: &str) -> Option<(String, &'a str)> {
    input.find(op).map(|idx| {
        let path = input[..idx].trim().to_string();
        let literal = &input[idx + op.len()..];
        (path, literal)
    })
}

fn resolve(path: &str, state: &WorkflowState, state_value: &Value) -> Value {
    if path.contains('.') {
        resolve_path(path, state, state_value)
    } else {
        auto_resolve(path, state, state_value)
    }
}

fn value_eq(value: &Value, literal: &Literal) -> bool {
    match literal {
        Literal::Bool(b) => value.as_bool() == Some(*b),
        Literal::Int(n) => value.as_i64() == Some(*n),
        Literal::Str(s) => value.as_str() == Some(s.as_str()),
    }
}

fn value_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn eval_expr(expr: &Expr, state: &WorkflowState, state_value: &Value) -> bool {
    match expr {
        Expr::Eq(path, literal) => value_eq(&resolve(path, state, state_value), literal),
        Expr::Ne(path, literal) => !value_eq(&resolve(path, state, state_value), literal),
        Expr::Not(inner) => !eval_expr(inner, state, state_value),
        Expr::Truthy(path) => value_truthy(&resolve(path, state, state_value)),
    }
}

/// Evaluates one condition expression against `state`. A malformed expression or a path that
/// resolves to nothing yields `false` (the caller logs a warning); this function never panics.
pub fn evaluate(expression: &str, state: &WorkflowState) -> bool {
    let state_value = state_as_value(state);
    match parse_expr(expression) {
        Ok(expr) => eval_expr(&expr, state, &state_value),
        Err(_) => false,
    }
}

/// Evaluates every label in `conditions`, returning `{label -> bool}` for storage in
/// `node_outputs[name].condition_results`.
pub fn evaluate_all(
    conditions: &std::collections::HashMap<String, String>,
    state: &WorkflowState,
) -> std::collections::HashMap<String, bool> {
    let state_value = state_as_value(state);
    conditions
        .iter()
        .map(|(label, expr)| {
            let result = match parse_expr(expr) {
                Ok(parsed) => eval_expr(&parsed, state, &state_value),
                Err(_) => {
                    tracing::warn!(label, expr, "condition expression failed to parse");
                    false
                }
            };
            (label.clone(), result)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eq_on_context_field() {
        let mut state = WorkflowState::new("hi");
        state
            .context
            .insert("kind".to_string(), Value::String("faq".to_string()));
        assert!(evaluate("kind == \"faq\"", &state));
        assert!(!evaluate("kind == \"other\"", &state));
    }

    #[test]
    fn ne_on_context_field() {
        let mut state = WorkflowState::new("hi");
        state
            .context
            .insert("kind".to_string(), Value::String("faq".to_string()));
        assert!(!evaluate("kind != \"faq\"", &state));
    }

    #[test]
    fn not_negates_inner_expression() {
        let mut state = WorkflowState::new("hi");
        state.context.insert("flag".to_string(), Value::Bool(false));
        assert!(evaluate("not flag", &state));
    }

    #[test]
    fn bare_path_coerces_to_bool() {
        let mut state = WorkflowState::new("hi");
        state.context.insert("flag".to_string(), Value::Bool(true));
        assert!(evaluate("flag", &state));
    }

    #[test]
    fn malformed_expression_yields_false() {
        let state = WorkflowState::new("hi");
        assert!(!evaluate("== broken", &state));
    }

    #[test]
    fn dotted_path_reads_node_output() {
        let mut state = WorkflowState::new("hi");
        let mut record = super::super::state::NodeOutputRecord::default();
        record
            .outputs
            .insert("kind".to_string(), Value::String("faq".to_string()));
        state.node_outputs.insert("classify".to_string(), record);
        assert!(evaluate("classify.kind == \"faq\"", &state));
    }
}
