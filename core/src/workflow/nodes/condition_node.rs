//! Condition node (4.5): evaluates every declared label and stores `condition_results`
//! for the router (4.6) to pick a branch from.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::graph::Next;

use crate::workflow::condition::evaluate_all;
use crate::workflow::state::{NodeOutputRecord, WorkflowState};

pub struct ConditionNode {
    name: String,
    conditions: HashMap<String, String>,
}

impl ConditionNode {
    pub fn new(name: impl Into<String>, conditions: HashMap<String, String>) -> Self {
        Self {
            name: name.into(),
            conditions,
        }
    }
}

#[async_trait]
impl crate::graph::Node<WorkflowState> for ConditionNode {
    fn id(&self) -> &str {
        &self.name
    }

    async fn run(&self, mut state: WorkflowState) -> Result<(WorkflowState, Next), AgentError> {
        state._goto_node.take();
        let results = evaluate_all(&self.conditions, &state);
        state.current_step = format!("condition_evaluated:{}", self.name);
        let mut outputs = HashMap::new();
        outputs.insert(
            "node_type".to_string(),
            serde_json::Value::String("condition".to_string()),
        );
        state.node_outputs.insert(
            self.name.clone(),
            NodeOutputRecord {
                status: "completed".to_string(),
                outputs,
                condition_results: Some(results),
                ..Default::default()
            },
        );
        Ok((state, Next::Continue))
    }
}
