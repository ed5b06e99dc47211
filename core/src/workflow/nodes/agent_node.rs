//! Agent node (4.5): the workhorse node kind. Resolves its declared inputs into a prompt,
//! calls an LLM (optionally tool-augmented), and — when `loop.enable` is set — keeps
//! calling/acting until a tool-free reply, a completion marker, or `max_iterations`.
//!
//! `loop.no_tool_goto` only applies on the *first* iteration with no tool calls (§3): an
//! agent that never needed to call a tool at all routes elsewhere, while one that tried
//! tools and then settled on a final reply continues down the static/condition edge.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AgentError;
use crate::graph::Next;
use crate::llm::LlmClient;
use crate::message::Message;
use crate::tool_source::ToolSource;

use crate::workflow::error::RuntimeError;
use crate::workflow::io_resolver::{build_agent_input, resolve_inputs, store_outputs};
use crate::workflow::protocol::model::{AgentInfo, CompletionMarkers, WorkflowNode};
use crate::workflow::state::{ChatMessage, ChatRole, WorkflowState};

pub struct AgentNode {
    name: String,
    node: WorkflowNode,
    agent_info: AgentInfo,
    llm: Arc<dyn LlmClient>,
    tools: Vec<Arc<dyn ToolSource>>,
    completion_markers: CompletionMarkers,
}

impl AgentNode {
    pub fn new(
        node: WorkflowNode,
        agent_info: AgentInfo,
        llm: Arc<dyn LlmClient>,
        tools: Vec<Arc<dyn ToolSource>>,
        completion_markers: CompletionMarkers,
    ) -> Self {
        Self {
            name: node.name.clone(),
            node,
            agent_info,
            llm,
            tools,
            completion_markers,
        }
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<String, RuntimeError> {
        for source in &self.tools {
            let specs = source.list_tools().await.unwrap_or_default();
            if specs.iter().any(|s| s.name == name) {
                return source
                    .call_tool(name, args)
                    .await
                    .map(|content| content.text)
                    .map_err(|e| RuntimeError::Tool {
                        tool: name.to_string(),
                        reason: e.to_string(),
                    });
            }
        }
        Err(RuntimeError::Tool {
            tool: name.to_string(),
            reason: "no tool source exposes this tool".to_string(),
        })
    }

    fn to_legacy(message: &ChatMessage) -> Message {
        match message.role {
            ChatRole::System => Message::system(message.content.clone()),
            ChatRole::Human => Message::user(message.content.clone()),
            ChatRole::Ai => Message::assistant(message.content.clone()),
            ChatRole::Tool => Message::user(format!("[tool result] {}", message.content)),
        }
    }

    fn contains_any(text: &str, markers: &[String]) -> bool {
        markers.iter().any(|marker| text.contains(marker.as_str()))
    }
}

#[async_trait]
impl crate::graph::Node<WorkflowState> for AgentNode {
    fn id(&self) -> &str {
        &self.name
    }

    async fn run(&self, mut state: WorkflowState) -> Result<(WorkflowState, Next), AgentError> {
        state._goto_node.take();

        let resolved = resolve_inputs(&self.node, &state);
        let prompt = build_agent_input(&self.node, &resolved);

        let mut legacy_messages = Vec::new();
        if let Some(system_prompt) = &self.agent_info.system_prompt {
            legacy_messages.push(Message::system(system_prompt.clone()));
        }
        for message in &state.messages {
            legacy_messages.push(Self::to_legacy(message));
        }
        legacy_messages.push(Message::user(prompt));

        let loop_cfg = &self.agent_info.r#loop;
        let mut final_text = String::new();
        let mut iteration = 0u32;
        let mut tool_results: HashMap<String, Value> = HashMap::new();
        let mut tool_call_log: Vec<Value> = Vec::new();

        let mut failed = false;
        loop {
            iteration += 1;
            let response = match self.llm.invoke(&legacy_messages).await {
                Ok(response) => response,
                Err(e) => {
                    final_text = format!("error: {e}");
                    failed = true;
                    break;
                }
            };
            legacy_messages.push(Message::assistant(response.content.clone()));
            final_text = response.content.clone();

            if response.tool_calls.is_empty() {
                if iteration == 1 {
                    if let Some(target) = &loop_cfg.no_tool_goto {
                        state._goto_node = Some(target.clone());
                    }
                }
                break;
            }

            for call in &response.tool_calls {
                let args: Value = serde_json::from_str(&call.arguments).unwrap_or(Value::Null);
                let result_text = match self.call_tool(&call.name, args.clone()).await {
                    Ok(text) => text,
                    Err(e) => format!("error: {e}"),
                };
                tool_results.insert(call.name.clone(), Value::String(result_text.clone()));
                tool_call_log.push(serde_json::json!({
                    "id": call.id.clone().unwrap_or_default(),
                    "name": call.name,
                    "args": args,
                    "result": result_text,
                }));
                legacy_messages.push(Message::user(format!(
                    "[tool:{}] {}",
                    call.name, result_text
                )));
            }

            if !loop_cfg.enable {
                break;
            }
            if Self::contains_any(&final_text, &self.completion_markers.force_exit) {
                break;
            }
            let positive = Self::contains_any(&final_text, &self.completion_markers.contextual_positive);
            let negative = Self::contains_any(&final_text, &self.completion_markers.contextual_negative);
            if positive && !negative {
                break;
            }
            if iteration >= loop_cfg.max_iterations {
                break;
            }
        }

        state.messages.push(ChatMessage::ai(final_text.clone()));
        state.final_response = final_text.clone();
        for (tool_name, value) in &tool_results {
            state
                .tool_results
                .insert(format!("{}:{}", self.name, tool_name), value.clone());
        }
        store_outputs(&self.node, &mut state, &serde_json::json!({"response": final_text}));
        if let Some(record) = state.node_outputs.get_mut(&self.name) {
            record
                .outputs
                .insert("tool_calls".to_string(), Value::Array(tool_call_log));
        }

        if failed {
            state.current_step = format!("agent_failed:{}", self.name);
            if let Some(record) = state.node_outputs.get_mut(&self.name) {
                record.status = "failed".to_string();
                record.error = Some(final_text.clone());
            }
        } else {
            state.current_step = format!("agent_completed:{}", self.name);
            if let Some(record) = state.node_outputs.get_mut(&self.name) {
                record.status = "completed".to_string();
            }
        }

        // Runtime failures are recorded in state rather than aborting the graph (§7):
        // downstream nodes decide whether to recover.
        Ok((state, Next::Continue))
    }
}
