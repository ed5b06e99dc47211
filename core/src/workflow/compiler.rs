//! Graph Compiler (4.6): assembles a validated [`Protocol`] into an executable
//! [`StateGraph`](crate::graph::StateGraph). Every node — not only `condition` nodes — is wired
//! through one conditional-routing primitive with `path_map: None` (an identity mapping: the
//! router always returns either a real node id or [`END`](crate::graph::END) directly), giving a
//! single place that implements the precedence `_goto_node override` -> `condition label` ->
//! `static edge` -> `END`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::graph::{Node, StateGraph, END, START};
use crate::llm::{LlmClient, MockLlm};
use crate::memory::{MemorySaver, SqliteSaver};
use crate::tool_source::{McpToolSource, MockToolSource, ToolSource};

use crate::workflow::error::CompileError;
use crate::workflow::nodes::{AgentNode, ConditionNode, EndNode, StartNode};
use crate::workflow::protocol::model::{AgentInfo, McpServerRef, NodeKind, Protocol, WorkflowNode};
use crate::workflow::state::WorkflowState;
use crate::workflow::store_queries::CheckpointStore;

/// A compiled workflow ready to [`invoke`](crate::workflow::engine) or stream.
pub struct CompiledWorkflow {
    pub protocol: Protocol,
    pub graph: crate::graph::CompiledStateGraph<WorkflowState>,
    pub store: Arc<dyn CheckpointStore>,
}

fn build_llm_client(llm_config: &crate::workflow::protocol::model::LlmConfig) -> Arc<dyn LlmClient> {
    match llm_config.provider.as_deref() {
        Some("openai") => {
            let model = llm_config.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());
            Arc::new(crate::llm::ChatOpenAI::new(model))
        }
        _ => Arc::new(MockLlm::with_no_tool_calls("(no llm provider configured)")),
    }
}

fn gather_tools(agent_info: &AgentInfo) -> Vec<Arc<dyn ToolSource>> {
    let mut sources: Vec<Arc<dyn ToolSource>> = Vec::new();
    if !agent_info.tools.is_empty() {
        sources.push(Arc::new(MockToolSource::get_time_example()));
    }
    for server in &agent_info.mcp_servers {
        match server {
            McpServerRef::Stdio { cmd, args } => {
                match McpToolSource::new(cmd.clone(), args.clone(), false) {
                    Ok(source) => sources.push(Arc::new(source)),
                    Err(e) => {
                        tracing::warn!(cmd, error = %e, "failed to start MCP tool source, skipping");
                    }
                }
            }
            McpServerRef::Sse { url } => {
                tracing::warn!(url, "SSE MCP transport is declared but not wired; skipping");
            }
        }
    }
    sources
}

fn edges_from(workflow: &crate::workflow::protocol::model::Workflow, source: &str) -> Vec<crate::workflow::protocol::model::WorkflowEdge> {
    workflow
        .edges
        .iter()
        .filter(|edge| edge.from == source)
        .cloned()
        .collect()
}

fn router_for(
    node: &WorkflowNode,
    node_names: &std::collections::HashSet<String>,
    static_edges: Vec<crate::workflow::protocol::model::WorkflowEdge>,
) -> crate::graph::ConditionalRouterFn<WorkflowState> {
    let node_names = node_names.clone();
    let node_name = node.name.clone();
    let is_condition = node.kind == NodeKind::Condition;
    Arc::new(move |state: &WorkflowState| -> String {
        if let Some(goto) = &state._goto_node {
            if goto == "end" || goto.eq_ignore_ascii_case("__end__") {
                return END.to_string();
            }
            if node_names.contains(goto) {
                return goto.clone();
            }
        }
        if is_condition {
            if let Some(record) = state.node_outputs.get(&node_name) {
                if let Some(results) = &record.condition_results {
                    for edge in &static_edges {
                        if let Some(label) = &edge.condition {
                            if results.get(label).copied().unwrap_or(false) {
                                return edge.to.clone();
                            }
                        }
                    }
                }
            }
            return END.to_string();
        }
        static_edges
            .first()
            .map(|edge| edge.to.clone())
            .unwrap_or_else(|| END.to_string())
    })
}

/// Compiles `protocol` into an executable graph, attaching a checkpointer per
/// `global_config.memory` (4.1, 9): `memory` -> in-process, `sqlite` (+ `path`) -> SQLite-backed,
/// any other provider while `memory.enabled` is an error.
pub fn compile(protocol: Protocol, store: Arc<dyn CheckpointStore>) -> Result<CompiledWorkflow, CompileError> {
    let mut graph: StateGraph<WorkflowState> = StateGraph::new();
    let node_names: std::collections::HashSet<String> = protocol
        .workflow
        .nodes
        .iter()
        .map(|n| n.name.clone())
        .collect();

    for node in &protocol.workflow.nodes {
        let runtime_node: Arc<dyn Node<WorkflowState>> = match node.kind {
            NodeKind::Start => Arc::new(StartNode::new(node.name.clone())),
            NodeKind::End => Arc::new(EndNode::new(node.name.clone())),
            NodeKind::Condition => Arc::new(ConditionNode::new(node.name.clone(), node.conditions.clone())),
            NodeKind::Agent => {
                let agent_ref = node
                    .agent_ref
                    .clone()
                    .ok_or_else(|| CompileError::UnsupportedNodeKind(format!("agent node '{}' has no agent_ref", node.name)))?;
                let agent_info = protocol
                    .agents
                    .get(&agent_ref)
                    .cloned()
                    .unwrap_or_default();
                let llm_config = protocol.llm_config.override_with(agent_info.llm.as_ref().unwrap_or(&Default::default()));
                let llm = build_llm_client(&llm_config);
                let tools = gather_tools(&agent_info);
                let markers = protocol.global_config.completion_markers.clone().or_builtin_defaults();
                Arc::new(AgentNode::new(node.clone(), agent_info, llm, tools, markers))
            }
        };
        graph.add_node(node.name.clone(), runtime_node);
    }

    for node in &protocol.workflow.nodes {
        let static_edges = edges_from(&protocol.workflow, &node.name);
        let router = router_for(node, &node_names, static_edges);
        graph.add_conditional_edges(node.name.clone(), router, None);
    }

    let start_node = protocol
        .workflow
        .nodes
        .iter()
        .find(|n| n.kind == NodeKind::Start)
        .ok_or_else(|| CompileError::GraphAssembly("no start node".to_string()))?;
    graph.add_edge(START, start_node.name.clone());

    let memory = &protocol.global_config.memory;
    let compiled = if memory.enabled {
        match memory.provider.as_str() {
            "memory" => {
                let checkpointer: Arc<dyn crate::memory::Checkpointer<WorkflowState>> =
                    Arc::new(MemorySaver::new());
                graph
                    .compile_with_checkpointer(checkpointer)
                    .map_err(|e| CompileError::GraphAssembly(e.to_string()))?
            }
            "sqlite" => {
                let path = memory
                    .path
                    .clone()
                    .ok_or_else(|| CompileError::UnsupportedMemoryProvider("sqlite".to_string()))?;
                let serializer: Arc<dyn crate::memory::Serializer<WorkflowState>> =
                    Arc::new(crate::memory::JsonSerializer::new());
                let saver = SqliteSaver::new(path, serializer)
                    .map_err(|e| CompileError::UnsupportedMemoryProvider(e.to_string()))?;
                let checkpointer: Arc<dyn crate::memory::Checkpointer<WorkflowState>> = Arc::new(saver);
                graph
                    .compile_with_checkpointer(checkpointer)
                    .map_err(|e| CompileError::GraphAssembly(e.to_string()))?
            }
            other => return Err(CompileError::UnsupportedMemoryProvider(other.to_string())),
        }
    } else {
        graph
            .compile()
            .map_err(|e| CompileError::GraphAssembly(e.to_string()))?
    };

    Ok(CompiledWorkflow {
        protocol,
        graph: compiled,
        store,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::protocol::model::{Workflow, WorkflowEdge};
    use crate::workflow::store_queries::MemoryCheckpointStore;

    fn minimal_protocol() -> Protocol {
        Protocol {
            id: 1,
            protocol: Default::default(),
            global_config: Default::default(),
            llm_config: Default::default(),
            agents: HashMap::new(),
            workflow: Workflow {
                nodes: vec![
                    WorkflowNode {
                        name: "start".to_string(),
                        kind: NodeKind::Start,
                        agent_ref: None,
                        inputs: vec![],
                        outputs: vec![],
                        conditions: HashMap::new(),
                    },
                    WorkflowNode {
                        name: "end".to_string(),
                        kind: NodeKind::End,
                        agent_ref: None,
                        inputs: vec![],
                        outputs: vec![],
                        conditions: HashMap::new(),
                    },
                ],
                edges: vec![WorkflowEdge {
                    from: "start".to_string(),
                    to: "end".to_string(),
                    condition: None,
                }],
            },
        }
    }

    #[tokio::test]
    async fn compiles_minimal_start_end_graph() {
        let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
        let compiled = compile(minimal_protocol(), store).expect("compile");
        let state = WorkflowState::new("hi");
        let result = compiled.graph.invoke(state, None).await.expect("invoke");
        assert_eq!(result.node_outputs.len(), 2);
    }

    #[tokio::test]
    async fn unsupported_memory_provider_errors() {
        let mut protocol = minimal_protocol();
        protocol.global_config.memory.enabled = true;
        protocol.global_config.memory.provider = "mongo".to_string();
        let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
        let err = compile(protocol, store).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedMemoryProvider(_)));
    }
}
