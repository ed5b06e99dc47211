//! Execution Engine (4.7): drives a [`CompiledWorkflow`](crate::workflow::compiler::CompiledWorkflow)
//! to completion (unary `invoke`) or step-by-step (`stream`), translating the underlying
//! graph's [`StreamEvent`](crate::stream::StreamEvent)s into the workflow's own event
//! vocabulary and persisting one [`CheckpointStore`](crate::workflow::store_queries::CheckpointStore)
//! snapshot per run.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::memory::RunnableConfig;
use crate::stream::{StreamEvent, StreamMode};

use crate::workflow::assembler::{AssembledEvent, RawAgentEvent, ToolCallAssembler, ToolCallPiece};
use crate::workflow::compiler::CompiledWorkflow;
use crate::workflow::error::{EngineError, PersistenceError, RuntimeError};
use crate::workflow::protocol::model::NodeKind;
use crate::workflow::state::WorkflowState;
use crate::workflow::store_queries::derive_username;

/// One item of the typed event vocabulary (4.7) an agent-workflow run can emit.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    GraphStart {
        thread_id: String,
    },
    MessageChunk {
        thread_id: String,
        agent: String,
        #[serde(skip_serializing_if = "String::is_empty")]
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
    ToolCalls {
        thread_id: String,
        agent: String,
        tool_calls: Vec<ToolCallPayload>,
    },
    ToolCallResult {
        thread_id: String,
        agent: String,
        tool_call_id: String,
        result: Value,
    },
    /// Human-in-the-loop pause. No node kind in this workflow engine raises one yet;
    /// kept in the vocabulary because §6's SSE surface names it.
    Interrupt {
        thread_id: String,
        content: String,
        options: Vec<InterruptOption>,
    },
    Error {
        error: String,
        graph_id: i64,
    },
    Cancelled,
    GraphEnd {
        thread_id: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolCallPayload {
    pub id: String,
    pub name: String,
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InterruptOption {
    pub text: String,
    pub value: String,
}

/// Cooperative cancellation: dropping the handle or calling `cancel()` asks the
/// in-flight stream to stop forwarding events at its next suspension point (4.7, 5).
#[derive(Clone)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Drives one compiled workflow. Cheap to clone; holds only an `Arc` to the compiled graph.
#[derive(Clone)]
pub struct Engine {
    workflow: Arc<CompiledWorkflow>,
}

impl Engine {
    pub fn new(workflow: Arc<CompiledWorkflow>) -> Self {
        Self { workflow }
    }

    fn agent_names(&self) -> std::collections::HashSet<String> {
        self.workflow
            .protocol
            .workflow
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Agent)
            .map(|n| n.name.clone())
            .collect()
    }

    async fn persist(&self, thread_id: &str, state: &WorkflowState) -> Result<(), PersistenceError> {
        self.workflow
            .store
            .put(
                thread_id,
                self.workflow.protocol.id,
                &derive_username(thread_id),
                state,
                now_unix(),
            )
            .await
            .map(|_| ())
    }

    /// Runs to completion and returns the final state. Always persists one checkpoint,
    /// even when a node recorded a runtime failure in-band (§7: node errors don't abort).
    pub async fn invoke(&self, thread_id: &str, user_input: &str) -> Result<WorkflowState, EngineError> {
        let config = RunnableConfig {
            thread_id: Some(thread_id.to_string()),
            ..Default::default()
        };
        let state = WorkflowState::new(user_input);
        let result = self
            .workflow
            .graph
            .invoke(state, Some(config))
            .await
            .map_err(|e| EngineError::Runtime(RuntimeError::Llm(e.to_string())))?;
        self.persist(thread_id, &result).await?;
        Ok(result)
    }

    /// Streams the run as a sequence of [`EngineEvent`]s. Returns a handle the caller
    /// can use to request cancellation (e.g. on client disconnect).
    pub fn stream(&self, thread_id: impl Into<String>, user_input: impl Into<String>) -> (CancelHandle, ReceiverStream<EngineEvent>) {
        let thread_id = thread_id.into();
        let user_input = user_input.into();
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let (tx, rx) = mpsc::channel(128);
        let engine = self.clone();
        let agent_names = self.agent_names();

        tokio::spawn(async move {
            let _ = tx.send(EngineEvent::GraphStart {
                thread_id: thread_id.clone(),
            }).await;

            let config = RunnableConfig {
                thread_id: Some(thread_id.clone()),
                ..Default::default()
            };
            let state = WorkflowState::new(user_input);
            let mut inner = engine
                .workflow
                .graph
                .stream(state, Some(config), [StreamMode::Updates]);

            let mut last_state: Option<WorkflowState> = None;
            // Stop selecting on cancel_rx once its sender is gone (caller dropped the
            // handle without cancelling) so a permanent error there can't starve the
            // inner-stream branch in a biased select.
            let mut watching_cancel = true;
            loop {
                let next = if watching_cancel {
                    tokio::select! {
                        biased;
                        changed = cancel_rx.changed() => {
                            match changed {
                                Ok(()) if *cancel_rx.borrow() => {
                                    let _ = tx.send(EngineEvent::Cancelled).await;
                                    return;
                                }
                                Ok(()) => continue,
                                Err(_) => {
                                    watching_cancel = false;
                                    continue;
                                }
                            }
                        }
                        next = inner.next() => next,
                    }
                } else {
                    inner.next().await
                };

                match next {
                    Some(StreamEvent::Updates { node_id, state }) => {
                        for event in translate_update(&node_id, &agent_names, &state, &thread_id) {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        last_state = Some(state);
                    }
                    Some(_) => {}
                    None => break,
                }
            }

            if let Some(final_state) = last_state {
                if let Err(e) = engine.persist(&thread_id, &final_state).await {
                    tracing::warn!(error = %e, "checkpoint write failed, stream still delivered");
                }
            }
            let _ = tx.send(EngineEvent::GraphEnd { thread_id }).await;
        });

        (CancelHandle(cancel_tx), ReceiverStream::new(rx))
    }
}

fn translate_update(
    node_id: &str,
    agent_names: &std::collections::HashSet<String>,
    state: &WorkflowState,
    thread_id: &str,
) -> Vec<EngineEvent> {
    if !agent_names.contains(node_id) {
        return Vec::new();
    }
    let Some(record) = state.node_outputs.get(node_id) else {
        return Vec::new();
    };

    let mut events = Vec::new();
    let mut assembler = ToolCallAssembler::new();

    let raw_calls: Vec<Value> = record
        .outputs
        .get("tool_calls")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    if !raw_calls.is_empty() {
        let pieces: Vec<ToolCallPiece> = raw_calls
            .iter()
            .map(|c| ToolCallPiece {
                id: c.get("id").and_then(|v| v.as_str()).map(String::from),
                name: c.get("name").and_then(|v| v.as_str()).map(String::from),
                args: c.get("args").cloned(),
            })
            .collect();
        for assembled in assembler.process(RawAgentEvent {
            tool_calls: pieces,
            ..Default::default()
        }) {
            if let AssembledEvent::ToolCalls(calls) = assembled {
                events.push(EngineEvent::ToolCalls {
                    thread_id: thread_id.to_string(),
                    agent: node_id.to_string(),
                    tool_calls: calls
                        .iter()
                        .map(|c| ToolCallPayload {
                            id: c.id.clone(),
                            name: c.name.clone(),
                            args: c.args.clone(),
                        })
                        .collect(),
                });
                for (call, raw) in calls.iter().zip(raw_calls.iter()) {
                    let result = raw.get("result").cloned().unwrap_or(Value::Null);
                    events.push(EngineEvent::ToolCallResult {
                        thread_id: thread_id.to_string(),
                        agent: node_id.to_string(),
                        tool_call_id: call.id.clone(),
                        result,
                    });
                }
            }
        }
    }

    let response = record
        .outputs
        .get("response")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    for assembled in assembler.process(RawAgentEvent {
        content: Some(response.to_string()),
        ..Default::default()
    }) {
        if let AssembledEvent::MessageChunk { content, finish_reason } = assembled {
            events.push(EngineEvent::MessageChunk {
                thread_id: thread_id.to_string(),
                agent: node_id.to_string(),
                content,
                finish_reason,
            });
        }
    }

    events
}
