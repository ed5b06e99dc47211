//! Stream Assembler (4.8): reconstructs whole tool calls out of the token-sized
//! fragments many providers stream (`name`/`id` on the first chunk, `args` substrings on
//! the rest), normalises doubled-up tool-call ids, and frames every outgoing event as SSE.

use serde::Serialize;
use serde_json::Value;

/// One raw fragment of a streamed tool call. `args` is a partial JSON-string slice.
#[derive(Debug, Clone, Default)]
pub struct ToolCallChunk {
    pub id: Option<String>,
    pub name: Option<String>,
    pub args: Option<String>,
}

/// A fully-formed tool call as some providers emit it directly (no chunking).
#[derive(Debug, Clone, Default)]
pub struct ToolCallPiece {
    pub id: Option<String>,
    pub name: Option<String>,
    pub args: Option<Value>,
}

/// One step's raw event, before reassembly. Exactly one of `content`/`tool_call_chunks`/
/// `tool_calls` is normally populated; `finish_reason` may accompany any of them.
#[derive(Debug, Clone, Default)]
pub struct RawAgentEvent {
    pub content: Option<String>,
    pub tool_call_chunks: Vec<ToolCallChunk>,
    pub tool_calls: Vec<ToolCallPiece>,
    pub finish_reason: Option<String>,
}

/// A fully reconstructed tool call, ready to serialise into a `tool_calls` SSE event.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReconstructedToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// What the assembler produces for one raw event: zero or more content chunks and/or
/// one reconstructed tool-call batch, in the order they should be emitted.
#[derive(Debug, Clone, PartialEq)]
pub enum AssembledEvent {
    MessageChunk {
        content: String,
        finish_reason: Option<String>,
    },
    ToolCalls(Vec<ReconstructedToolCall>),
}

#[derive(Debug, Clone)]
enum State {
    Idle,
    Assembling { id: String, name: String, args_buf: String },
}

/// Per-agent-step state machine. One instance per in-flight agent turn.
pub struct ToolCallAssembler {
    state: State,
}

impl Default for ToolCallAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self { state: State::Idle }
    }

    /// Feeds one raw event through the machine, returning the events it produces.
    pub fn process(&mut self, event: RawAgentEvent) -> Vec<AssembledEvent> {
        let mut out = Vec::new();

        if let Some(content) = &event.content {
            if !content.is_empty() {
                out.push(AssembledEvent::MessageChunk {
                    content: content.clone(),
                    finish_reason: event.finish_reason.clone(),
                });
            }
        }

        if matches!(self.state, State::Idle) {
            if let Some(chunk) = event
                .tool_call_chunks
                .iter()
                .find(|c| c.name.as_deref().is_some_and(|n| !n.is_empty()))
            {
                self.state = State::Assembling {
                    id: normalize_tool_call_id(chunk.id.as_deref().unwrap_or_default()),
                    name: chunk.name.clone().unwrap_or_default(),
                    args_buf: chunk.args.clone().unwrap_or_default(),
                };
                for rest in event.tool_call_chunks.iter().skip(1) {
                    self.accumulate(rest);
                }
                return out;
            }
            if let Some(piece) = event
                .tool_calls
                .iter()
                .find(|p| p.name.as_deref().unwrap_or_default().is_empty() || p.args.is_none())
            {
                self.state = State::Assembling {
                    id: normalize_tool_call_id(piece.id.as_deref().unwrap_or_default()),
                    name: piece.name.clone().unwrap_or_default(),
                    args_buf: String::new(),
                };
                return out;
            }
            if !event.tool_calls.is_empty() {
                let calls = event
                    .tool_calls
                    .iter()
                    .map(|p| ReconstructedToolCall {
                        id: normalize_tool_call_id(p.id.as_deref().unwrap_or_default()),
                        name: p.name.clone().unwrap_or_default(),
                        args: p.args.clone().unwrap_or(Value::Null),
                    })
                    .collect();
                out.push(AssembledEvent::ToolCalls(calls));
            }
            return out;
        }

        for chunk in &event.tool_call_chunks {
            self.accumulate(chunk);
        }
        for piece in &event.tool_calls {
            if let Some(args) = &piece.args {
                if !matches!(args, Value::Object(map) if map.is_empty()) {
                    if let State::Assembling { id, name, .. } = &self.state {
                        out.push(AssembledEvent::ToolCalls(vec![ReconstructedToolCall {
                            id: id.clone(),
                            name: name.clone(),
                            args: args.clone(),
                        }]));
                    }
                    self.state = State::Idle;
                    return out;
                }
            }
        }

        let finished_without_chunks =
            event.tool_call_chunks.is_empty() && event.finish_reason.as_deref() == Some("tool_calls");
        if finished_without_chunks {
            if let State::Assembling { id, name, args_buf } = &self.state {
                let args = serde_json::from_str(args_buf)
                    .unwrap_or_else(|_| serde_json::json!({"raw_args": args_buf}));
                out.push(AssembledEvent::ToolCalls(vec![ReconstructedToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    args,
                }]));
            }
            self.state = State::Idle;
        }

        out
    }

    fn accumulate(&mut self, chunk: &ToolCallChunk) {
        if let State::Assembling { args_buf, .. } = &mut self.state {
            if let Some(args) = &chunk.args {
                args_buf.push_str(args);
            }
        }
    }
}

/// Reduces a doubled-up id (`call_X` repeated, or a 32-hex-char block repeated) to its
/// first occurrence; ids that aren't an exact halves-duplicate pass through unchanged.
pub fn normalize_tool_call_id(id: &str) -> String {
    let len = id.len();
    if len >= 2 && len % 2 == 0 {
        let (first, second) = id.split_at(len / 2);
        if !first.is_empty() && first == second {
            return first.to_string();
        }
    }
    id.to_string()
}

/// Serialises one event as an SSE frame: `event: <type>\ndata: <json>\n\n`. A `content`
/// field of `""` is dropped from the payload before serialising (4.8).
pub fn to_sse_frame(event_type: &str, mut payload: Value) -> String {
    if let Value::Object(map) = &mut payload {
        if matches!(map.get("content"), Some(Value::String(s)) if s.is_empty()) {
            map.remove("content");
        }
    }
    format!("event: {event_type}\ndata: {payload}\n\n")
}
