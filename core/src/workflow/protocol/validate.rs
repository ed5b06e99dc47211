//! Structural and referential checks over a parsed [`Protocol`], applied before compilation.

use std::collections::{HashMap, HashSet};

use super::model::{NodeKind, Protocol, KNOWN_SCHEMA_VERSIONS};
use crate::workflow::error::ConfigError;

/// A non-fatal finding surfaced alongside a passing validation (currently only the
/// "condition on a non-condition node" case per the Open Question resolution in DESIGN.md).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub message: String,
}

/// Result of a validation pass: either a confirmed-valid protocol (with warnings) or the
/// aggregated list of fatal errors.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub warnings: Vec<ValidationWarning>,
}

/// Runs all structural/referential checks; returns the aggregated error list via
/// [`ConfigError::ValidationError`] if any are fatal, else a report carrying warnings.
pub fn validate(protocol: &Protocol) -> Result<ValidationReport, ConfigError> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let nodes = &protocol.workflow.nodes;
    let node_names: HashMap<&str, &crate::workflow::protocol::model::WorkflowNode> =
        nodes.iter().map(|n| (n.name.as_str(), n)).collect();

    if node_names.len() != nodes.len() {
        errors.push("node names must be unique within a workflow".to_string());
    }

    let start_count = nodes.iter().filter(|n| n.kind == NodeKind::Start).count();
    if start_count != 1 {
        errors.push(format!(
            "workflow must have exactly one start node, found {start_count}"
        ));
    }
    let end_count = nodes.iter().filter(|n| n.kind == NodeKind::End).count();
    if end_count < 1 {
        errors.push("workflow must have at least one end node".to_string());
    }

    for node in nodes {
        if node.kind == NodeKind::Agent {
            match &node.agent_ref {
                None => errors.push(format!("agent node '{}' is missing agent_ref", node.name)),
                Some(agent_ref) if !protocol.agents.contains_key(agent_ref) => errors.push(
                    format!(
                        "agent node '{}' references unknown agent '{agent_ref}'",
                        node.name
                    ),
                ),
                Some(_) => {}
            }
        }
    }

    let mut seen_agent_names: HashSet<&str> = HashSet::new();
    for name in protocol.agents.keys() {
        if !seen_agent_names.insert(name.as_str()) {
            errors.push(format!("duplicate agent name '{name}'"));
        }
    }

    for edge in &protocol.workflow.edges {
        if !node_names.contains_key(edge.from.as_str()) {
            errors.push(format!("edge references unknown source node '{}'", edge.from));
        }
        if !node_names.contains_key(edge.to.as_str()) {
            errors.push(format!("edge references unknown target node '{}'", edge.to));
        }
        if let Some(source) = node_names.get(edge.from.as_str()) {
            if edge.condition.is_some() && source.kind != NodeKind::Condition {
                warnings.push(ValidationWarning {
                    message: format!(
                        "edge {}->{} carries a condition but source node '{}' is not a condition node; treated as static",
                        edge.from, edge.to, edge.from
                    ),
                });
            }
            if source.kind == NodeKind::Condition {
                if let Some(label) = &edge.condition {
                    if !source.conditions.contains_key(label) {
                        errors.push(format!(
                            "edge {}->{} references condition label '{label}' not declared on node '{}'",
                            edge.from, edge.to, edge.from
                        ));
                    }
                } else {
                    warnings.push(ValidationWarning {
                        message: format!(
                            "edge {}->{} leaves a condition node without a condition label",
                            edge.from, edge.to
                        ),
                    });
                }
            }
        }
    }

    if !KNOWN_SCHEMA_VERSIONS.contains(&protocol.protocol.schema_version.as_str()) {
        errors.push(format!(
            "unknown schema_version '{}'",
            protocol.protocol.schema_version
        ));
    }

    if !errors.is_empty() {
        return Err(ConfigError::ValidationError(errors));
    }
    Ok(ValidationReport { warnings })
}
