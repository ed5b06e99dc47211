//! Error taxonomy for the workflow engine: one `thiserror` enum per boundary
//! (config, compile, runtime, cancellation, persistence), composed into [`EngineError`].

use thiserror::Error;

/// Config Registry / Protocol Parser / Validator failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown config id: {0}")]
    UnknownId(i64),
    #[error("failed to parse {path}: {reason}")]
    ParseError { path: String, reason: String },
    #[error("validation failed: {0:?}")]
    ValidationError(Vec<String>),
}

/// Graph-assembly failures (after validation has already passed).
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("inconsistent edge: {from} -> {to} references a node that does not exist")]
    DanglingEdge { from: String, to: String },
    #[error("unsupported node kind: {0}")]
    UnsupportedNodeKind(String),
    #[error("unsupported checkpoint memory provider: {0}")]
    UnsupportedMemoryProvider(String),
    #[error("graph assembly failed: {0}")]
    GraphAssembly(String),
}

/// Node-level execution failures (LLM, tool, MCP transport).
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("LLM call failed: {0}")]
    Llm(String),
    #[error("tool call failed: {tool}: {reason}")]
    Tool { tool: String, reason: String },
    #[error("MCP transport error: {0}")]
    Mcp(String),
    #[error("agent node '{0}' referenced unknown agent '{1}'")]
    UnknownAgent(String, String),
}

/// Consumer-disconnect during a streaming run.
#[derive(Debug, Error)]
#[error("request cancelled by consumer")]
pub struct CancellationError;

/// Checkpoint-store connectivity / serialization failures.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("checkpoint store connectivity error: {0}")]
    Connectivity(String),
    #[error("checkpoint (de)serialization error: {0}")]
    Serialization(String),
}

/// Crate-wide error composing the five taxonomy members via `#[from]`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Cancellation(#[from] CancellationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
