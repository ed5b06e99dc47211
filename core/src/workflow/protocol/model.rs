//! Typed in-memory model for one YAML workflow document (schema v1.0.0).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Schema versions this build understands. Unknown versions fail validation.
pub const KNOWN_SCHEMA_VERSIONS: &[&str] = &["1.0.0"];

/// One parsed/validated workflow document. Immutable after compilation; cheap to `Arc` and share.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Protocol {
    pub id: i64,
    #[serde(default)]
    pub protocol: ProtocolMeta,
    #[serde(default)]
    pub global_config: GlobalConfig,
    #[serde(default)]
    pub llm_config: LlmConfig,
    #[serde(default)]
    pub agents: HashMap<String, AgentInfo>,
    pub workflow: Workflow,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub license: String,
}

fn default_schema_version() -> String {
    "1.0.0".to_string()
}

impl Default for ProtocolMeta {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: String::new(),
            schema_version: default_schema_version(),
            description: String::new(),
            author: String::new(),
            license: String::new(),
        }
    }
}

/// Runtime knobs, logging, and checkpoint backend selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Externalized agent-loop completion markers (§4.5 Open Question resolution).
    #[serde(default)]
    pub completion_markers: CompletionMarkers,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_log_output() -> String {
    "stdout".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            output: default_log_output(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_memory_provider")]
    pub provider: String,
    #[serde(default)]
    pub path: Option<String>,
}

fn default_memory_provider() -> String {
    "memory".to_string()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_memory_provider(),
            path: None,
        }
    }
}

/// Locale-specific agent-loop completion phrase lists (see 4.5): kept out of code so a
/// deployment can externalize them without a recompile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionMarkers {
    #[serde(default = "default_force_exit_markers")]
    pub force_exit: Vec<String>,
    #[serde(default = "default_contextual_positive")]
    pub contextual_positive: Vec<String>,
    #[serde(default = "default_contextual_negative")]
    pub contextual_negative: Vec<String>,
}

fn default_force_exit_markers() -> Vec<String> {
    [
        "最终答案",
        "final answer",
        "analysis complete",
        "task completed",
        "诊断完成",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_contextual_positive() -> Vec<String> {
    ["完成", "结束", "finished", "completed"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_contextual_negative() -> Vec<String> {
    ["未完成", "not completed"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl CompletionMarkers {
    fn is_empty(&self) -> bool {
        self.force_exit.is_empty()
            && self.contextual_positive.is_empty()
            && self.contextual_negative.is_empty()
    }

    /// Falls back to the built-in defaults when the document omits `completion_markers`
    /// entirely (distinguishing "omitted" from "explicitly emptied").
    pub fn or_builtin_defaults(self) -> Self {
        if self.is_empty() {
            Self {
                force_exit: default_force_exit_markers(),
                contextual_positive: default_contextual_positive(),
                contextual_negative: default_contextual_negative(),
            }
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl LlmConfig {
    /// Agent-local overrides take precedence field by field; unset fields fall through to `self`.
    pub fn override_with(&self, overrides: &LlmConfig) -> LlmConfig {
        LlmConfig {
            provider: overrides.provider.clone().or_else(|| self.provider.clone()),
            model: overrides.model.clone().or_else(|| self.model.clone()),
            temperature: overrides.temperature.or(self.temperature),
            max_tokens: overrides.max_tokens.or(self.max_tokens),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Agent,
    ReactAgent,
}

impl Default for AgentKind {
    fn default() -> Self {
        AgentKind::Agent
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentInfo {
    #[serde(rename = "type", default)]
    pub kind: AgentKind,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerRef>,
    #[serde(default)]
    pub r#loop: LoopConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum McpServerRef {
    Stdio { cmd: String, #[serde(default)] args: Vec<String> },
    Sse { url: String },
}

/// Normalized `agents.<name>.loop` block (4.2): missing fields take these defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_loop_delay_secs")]
    pub loop_delay: f64,
    #[serde(default)]
    pub force_exit_keywords: Vec<String>,
    #[serde(default)]
    pub no_tool_goto: Option<String>,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_loop_delay_secs() -> f64 {
    1.0
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            enable: false,
            max_iterations: default_max_iterations(),
            loop_delay: default_loop_delay_secs(),
            force_exit_keywords: Vec::new(),
            no_tool_goto: None,
        }
    }
}

impl LoopConfig {
    /// `loop_delay` clamped to >= 0, as a `Duration`.
    pub fn loop_delay_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.loop_delay.max(0.0))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workflow {
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    End,
    Agent,
    Condition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub agent_ref: Option<String>,
    #[serde(default)]
    pub inputs: Vec<NodeInput>,
    #[serde(default)]
    pub outputs: Vec<NodeOutput>,
    /// `label -> expression`, condition nodes only.
    #[serde(default)]
    pub conditions: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInput {
    pub name: String,
    #[serde(default = "default_input_type")]
    pub r#type: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

fn default_input_type() -> String {
    "string".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOutput {
    pub name: String,
    #[serde(default = "default_input_type")]
    pub r#type: String,
}

/// One workflow edge. YAML uses `from`/`to` verbatim; they already match the internal
/// field names (4.2 notes the parser "remaps" them — here the spelling happens to agree).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub condition: Option<String>,
}
