//! Start node (4.5): seeds `messages` from `user_input` when the caller hasn't already.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AgentError;
use crate::graph::Next;

use crate::workflow::state::{ChatMessage, NodeOutputRecord, WorkflowState};

pub struct StartNode {
    name: String,
}

impl StartNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl crate::graph::Node<WorkflowState> for StartNode {
    fn id(&self) -> &str {
        &self.name
    }

    async fn run(&self, mut state: WorkflowState) -> Result<(WorkflowState, Next), AgentError> {
        state._goto_node.take();
        if state.messages.is_empty() && !state.user_input.is_empty() {
            state.messages.push(ChatMessage::human(state.user_input.clone()));
        }
        state.current_step = format!("started:{}", self.name);
        let mut outputs = std::collections::HashMap::new();
        outputs.insert(
            "user_input".to_string(),
            Value::String(state.user_input.clone()),
        );
        state.node_outputs.insert(
            self.name.clone(),
            NodeOutputRecord {
                status: "completed".to_string(),
                outputs,
                ..Default::default()
            },
        );
        Ok((state, Next::Continue))
    }
}
