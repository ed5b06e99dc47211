//! Protocol parser, validator, and config registry (4.1-4.3).

pub mod model;
pub mod parse;
pub mod registry;
pub mod validate;

pub use model::{
    AgentInfo, AgentKind, CompletionMarkers, GlobalConfig, LlmConfig, LoggingConfig, LoopConfig,
    McpServerRef, MemoryConfig, NodeInput, NodeKind, NodeOutput, Protocol, ProtocolMeta,
    RuntimeConfig, Workflow, WorkflowEdge, WorkflowNode, KNOWN_SCHEMA_VERSIONS,
};
pub use parse::{interpolate_env, parse as parse_protocol};
pub use registry::{ConfigRegistry, ConfigSummary};
pub use validate::{validate as validate_protocol, ValidationReport, ValidationWarning};
