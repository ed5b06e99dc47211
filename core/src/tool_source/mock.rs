//! A minimal `ToolSource` used as the default when `AgentOptions::tool_source` is `None`,
//! so that `run_agent("...", None)` works without wiring up real tools.

use async_trait::async_trait;
use serde_json::Value;

use super::{ToolCallContent, ToolSource, ToolSourceError, ToolSpec};

pub const TOOL_GET_TIME: &str = "get_time";

/// Single-tool mock source returning a fixed timestamp string.
pub struct MockToolSource {
    tools: Vec<ToolSpec>,
}

impl MockToolSource {
    /// A mock exposing one tool, `get_time`, that always returns a fixed timestamp.
    pub fn get_time_example() -> Self {
        Self {
            tools: vec![ToolSpec {
                name: TOOL_GET_TIME.to_string(),
                description: Some("Returns the current time.".to_string()),
                input_schema: serde_json::json!({"type": "object", "properties": {}}),
            }],
        }
    }
}

#[async_trait]
impl ToolSource for MockToolSource {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolSourceError> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, _arguments: Value) -> Result<ToolCallContent, ToolSourceError> {
        match name {
            TOOL_GET_TIME => Ok(ToolCallContent {
                text: "2024-01-01T00:00:00Z".to_string(),
            }),
            other => Err(ToolSourceError::NotFound(other.to_string())),
        }
    }
}
