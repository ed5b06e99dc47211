//! Node builders (4.5): one [`Node`](crate::graph::Node) implementation per [`NodeKind`](super::protocol::model::NodeKind).

pub mod agent_node;
pub mod condition_node;
pub mod end;
pub mod start;

pub use agent_node::AgentNode;
pub use condition_node::ConditionNode;
pub use end::EndNode;
pub use start::StartNode;
