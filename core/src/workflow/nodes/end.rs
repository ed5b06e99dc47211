//! End node (4.5): records a final snapshot of `final_response` and `tool_results`.

use async_trait::async_trait;

use crate::error::AgentError;
use crate::graph::Next;

use crate::workflow::state::{NodeOutputRecord, WorkflowState};

pub struct EndNode {
    name: String,
}

impl EndNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl crate::graph::Node<WorkflowState> for EndNode {
    fn id(&self) -> &str {
        &self.name
    }

    async fn run(&self, mut state: WorkflowState) -> Result<(WorkflowState, Next), AgentError> {
        state._goto_node.take();
        state.current_step = format!("completed:{}", self.name);
        let mut outputs = std::collections::HashMap::new();
        outputs.insert(
            "final_response".to_string(),
            serde_json::Value::String(state.final_response.clone()),
        );
        outputs.insert(
            "tool_results".to_string(),
            serde_json::to_value(&state.tool_results).unwrap_or(serde_json::Value::Null),
        );
        state.node_outputs.insert(
            self.name.clone(),
            NodeOutputRecord {
                status: "completed".to_string(),
                outputs,
                ..Default::default()
            },
        );
        Ok((state, Next::End))
    }
}
