//! IO Resolver (4.4): the uniform input/output contract every node builder uses.

use std::collections::HashMap;

use serde_json::Value;

use super::protocol::model::WorkflowNode;
use super::state::{ChatRole, WorkflowState};

/// Resolves every declared input of `node` against `state`.
///
/// `source` paths: `<node>.<field>` reads `state.node_outputs[node].outputs[field]`;
/// `state.<path>` walks the shared state; `global.<path>` walks `state.context`. Unknown
/// paths yield `Value::Null`. Inputs without a `source` are auto-resolved by preference:
/// top-level state key, then `context[name]`, then the latest node's output field, then a
/// handful of specialized names (`user_input`, `message|messages|conversation_history`).
pub fn resolve_inputs(node: &WorkflowNode, state: &WorkflowState) -> HashMap<String, Value> {
    let state_value = serde_json::to_value(state).unwrap_or(Value::Null);
    let mut resolved = HashMap::new();
    for input in &node.inputs {
        let value = match &input.source {
            Some(source) => resolve_path(source, state, &state_value),
            None => auto_resolve(&input.name, state, &state_value),
        };
        let value = match value {
            Value::Null => input.default.clone().unwrap_or(Value::Null),
            other => other,
        };
        resolved.insert(input.name.clone(), value);
    }
    resolved
}

/// Resolves a single `<node>.<field>` / `state.<path>` / `global.<path>` source path against
/// `state`. Shared with [`condition`](crate::workflow::condition), whose grammar reuses these
/// same path semantics.
pub fn resolve_path(source: &str, state: &WorkflowState, state_value: &Value) -> Value {
    if let Some(rest) = source.strip_prefix("state.") {
        return walk_json_path(state_value, rest);
    }
    if let Some(rest) = source.strip_prefix("global.") {
        let context = serde_json::to_value(&state.context).unwrap_or(Value::Null);
        return walk_json_path(&context, rest);
    }
    if let Some((node_name, field)) = source.split_once('.') {
        return state
            .node_outputs
            .get(node_name)
            .and_then(|record| record.outputs.get(field))
            .cloned()
            .unwrap_or(Value::Null);
    }
    Value::Null
}

/// Serializes `state` to a `Value` once, for callers (e.g. [`resolve_path`]) that need to
/// walk several paths against the same snapshot.
pub fn state_as_value(state: &WorkflowState) -> Value {
    serde_json::to_value(state).unwrap_or(Value::Null)
}

fn walk_json_path(root: &Value, path: &str) -> Value {
    let mut current = root;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn latest_node_name(state: &WorkflowState) -> Option<&str> {
    // `current_step` is set by every node builder to `"<kind>:<node_name>"` or
    // `"<kind>_<outcome>:<node_name>"`; the name is always the part after the last ':'.
    state.current_step.rsplit(':').next().filter(|s| !s.is_empty())
}

pub(crate) fn auto_resolve(name: &str, state: &WorkflowState, state_value: &Value) -> Value {
    if let Some(top_level) = state_value.get(name) {
        if !top_level.is_null() {
            return top_level.clone();
        }
    }
    if let Some(context_value) = state.context.get(name) {
        return context_value.clone();
    }
    if let Some(latest) = latest_node_name(state) {
        if let Some(record) = state.node_outputs.get(latest) {
            if let Some(value) = record.outputs.get(name) {
                return value.clone();
            }
        }
    }
    match name {
        "user_input" => Value::String(state.user_input.clone()),
        "message" | "messages" | "conversation_history" => {
            serde_json::to_value(&state.messages).unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

/// Composes a prompt-friendly string for a plain (non-react) agent node: when `user_input` is
/// among the resolved inputs alongside other inputs, prefix those as `"key: value"` blocks;
/// message-history values are rendered as `"Human: …"` / `"Assistant: …"` turns.
pub fn build_agent_input(node: &WorkflowNode, resolved: &HashMap<String, Value>) -> String {
    let user_input = resolved.get("user_input").and_then(|v| v.as_str());
    let other_inputs: Vec<_> = node
        .inputs
        .iter()
        .filter(|i| i.name != "user_input")
        .collect();

    let mut parts = Vec::new();
    for input in &other_inputs {
        if let Some(value) = resolved.get(&input.name) {
            parts.push(format!("{}: {}", input.name, render_value(value)));
        }
    }

    match user_input {
        Some(text) if !other_inputs.is_empty() => {
            parts.push(format!("user_input: {text}"));
            parts.join("\n")
        }
        Some(text) if parts.is_empty() => text.to_string(),
        Some(text) => {
            parts.push(text.to_string());
            parts.join("\n")
        }
        None => parts.join("\n"),
    }
}

fn render_value(value: &Value) -> String {
    if let Some(arr) = value.as_array() {
        // Heuristic: an array of {role, content} objects is a message history.
        let turns: Vec<String> = arr
            .iter()
            .filter_map(|item| {
                let role = item.get("role")?.as_str()?;
                let content = item.get("content")?.as_str().unwrap_or_default();
                let speaker = match role {
                    "human" => "Human",
                    "ai" => "Assistant",
                    "system" => "System",
                    "tool" => "Tool",
                    other => other,
                };
                Some(format!("{speaker}: {content}"))
            })
            .collect();
        if turns.len() == arr.len() && !turns.is_empty() {
            return turns.join("\n");
        }
    }
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Writes `node`'s declared outputs into `state.node_outputs[node.name].outputs`, pulling each
/// from `result` by key, falling back to the specialized keys `message|response|final_report|output`.
pub fn store_outputs(node: &WorkflowNode, state: &mut WorkflowState, result: &Value) {
    let record = state.node_outputs.entry(node.name.clone()).or_default();
    for output in &node.outputs {
        let value = result
            .get(&output.name)
            .or_else(|| result.get("message"))
            .or_else(|| result.get("response"))
            .or_else(|| result.get("final_report"))
            .or_else(|| result.get("output"))
            .cloned()
            .unwrap_or(Value::Null);
        record.outputs.insert(output.name.clone(), value);
    }
}

pub(crate) fn role_str(role: ChatRole) -> &'static str {
    match role {
        ChatRole::Human => "human",
        ChatRole::Ai => "ai",
        ChatRole::System => "system",
        ChatRole::Tool => "tool",
    }
}
