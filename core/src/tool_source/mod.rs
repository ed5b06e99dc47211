//! Tool source abstraction: list tools and call a tool.
//!
//! A `ToolSource` groups a set of related tools (e.g. bash execution, web
//! fetching, short-term and long-term memory) behind one `list_tools`/`call_tool`
//! surface so an agent loop can gather tools from several sources uniformly.

mod bash_tools_source;
mod context;
mod mcp;
mod memory_tools_source;
mod mock;
mod short_term_memory_tool_source;
mod store_tool_source;
mod web_tools_source;
mod yaml_specs;

pub use bash_tools_source::{BashToolsSource, TOOL_BASH};
pub use context::ToolCallContext;
pub use mcp::{McpSession, McpSessionError, McpToolSource};
pub use memory_tools_source::MemoryToolsSource;
pub use mock::{MockToolSource, TOOL_GET_TIME};
pub use short_term_memory_tool_source::{ShortTermMemoryToolSource, TOOL_GET_RECENT_MESSAGES};
pub use store_tool_source::{
    StoreToolSource, TOOL_LIST_MEMORIES, TOOL_RECALL, TOOL_REMEMBER, TOOL_SEARCH_MEMORIES,
};
pub use web_tools_source::{WebToolsSource, TOOL_WEB_FETCHER};
pub use yaml_specs::{load_tool_specs, YamlSpecError, YamlSpecToolSource};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Describes one tool: name, human-readable description, and JSON-schema input shape.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Plain-text result of a tool call.
#[derive(Debug, Clone)]
pub struct ToolCallContent {
    pub text: String,
}

#[derive(Debug, Error)]
pub enum ToolSourceError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid arguments: {0}")]
    InvalidInput(String),
    #[error("MCP/transport error: {0}")]
    Transport(String),
    #[error("JSON-RPC error: {0}")]
    JsonRpc(String),
}

/// A named group of tools an agent can list and call.
#[async_trait]
pub trait ToolSource: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolSourceError>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolCallContent, ToolSourceError>;

    /// Like `call_tool`, but with access to the current run's `ToolCallContext`
    /// (recent messages, stream writer). Defaults to ignoring context.
    async fn call_tool_with_context(
        &self,
        name: &str,
        arguments: Value,
        ctx: Option<&ToolCallContext>,
    ) -> Result<ToolCallContent, ToolSourceError> {
        let _ = ctx;
        self.call_tool(name, arguments).await
    }

    /// Stash a call context for sources that need it ahead of `call_tool` (e.g.
    /// sources still on the two-arg call path). Defaults to a no-op.
    fn set_call_context(&self, _ctx: Option<ToolCallContext>) {}
}
