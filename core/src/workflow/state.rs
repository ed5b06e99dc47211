//! Shared execution state (§3) carried through every node invocation of a compiled workflow.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    Human,
    Ai,
    System,
    Tool,
}

/// One chat-turn message. `tool_calls` carries pending calls on an AI message;
/// `tool_call_id` identifies which call a Tool message answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub additional_kwargs: HashMap<String, Value>,
}

impl ChatMessage {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Human,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            additional_kwargs: HashMap::new(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Ai,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            additional_kwargs: HashMap::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            additional_kwargs: HashMap::new(),
        }
    }

    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            additional_kwargs: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// Per-node execution record, stored under `node_outputs[<node_name>]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeOutputRecord {
    pub status: String,
    #[serde(default)]
    pub outputs: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_results: Option<HashMap<String, bool>>,
}

/// The shared execution state (§3), passed by mutable reference along the single active path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowState {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub user_input: String,
    #[serde(default)]
    pub current_step: String,
    #[serde(default)]
    pub tool_results: HashMap<String, Value>,
    #[serde(default)]
    pub final_response: String,
    #[serde(default)]
    pub context: HashMap<String, Value>,
    #[serde(default)]
    pub node_outputs: HashMap<String, NodeOutputRecord>,
    /// Transient dynamic-routing override; consumed and cleared by the router (4.6).
    #[serde(default)]
    pub _goto_node: Option<String>,
}

impl WorkflowState {
    /// A fresh state seeded with the user's initial request.
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            ..Default::default()
        }
    }
}
