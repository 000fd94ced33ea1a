//! Workflow templates, nodes and branches.

use crate::condition::{BooleanExpression, BranchError};
use crate::interface::TypedInterface;
use crate::literals::Binding;
use crate::task::Resources;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::time::Duration;
use weft_core::Identifier;

/// Per-node execution settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Display name
    pub name: String,
    /// Node timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Retry count
    #[serde(default)]
    pub retries: u32,
    /// Whether the node may run on preemptible capacity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interruptible: Option<bool>,
}

/// Renames an output of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    /// Output variable
    pub var: String,
    /// New name
    pub alias: String,
}

/// Resource overrides applied to a task node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNodeOverrides {
    /// Resources replacing the task's own
    pub resources: Resources,
}

/// Node that runs a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNode {
    /// Task to run
    pub reference_id: Identifier,
    /// Overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<TaskNodeOverrides>,
}

/// Node that runs a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowNode {
    /// Launch a registered launch plan as a child execution
    LaunchplanRef(Identifier),
    /// Inline a workflow as a sub-workflow
    SubWorkflowRef(Identifier),
}

/// One `if` arm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfBlock {
    /// Guard
    pub condition: BooleanExpression,
    /// Node run when the guard holds
    pub then_node: Box<Node>,
}

/// Full `if / elif / else` chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfElseBlock {
    /// First case
    pub case: IfBlock,
    /// Further cases, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other: Vec<IfBlock>,
    /// Fallback node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub else_node: Option<Box<Node>>,
    /// Failure when no case matches and there is no fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<BranchError>,
}

/// Conditional node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchNode {
    /// Chain of cases
    pub if_else: IfElseBlock,
}

impl BranchNode {
    /// Then-nodes of every case followed by the else node, in order
    pub fn leaf_nodes(&self) -> impl Iterator<Item = &Node> {
        std::iter::once(self.if_else.case.then_node.as_ref())
            .chain(self.if_else.other.iter().map(|c| c.then_node.as_ref()))
            .chain(self.if_else.else_node.as_deref())
    }
}

/// What a node executes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeTarget {
    /// A task
    TaskNode(TaskNode),
    /// A workflow or launch plan
    WorkflowNode(WorkflowNode),
    /// A conditional
    BranchNode(Box<BranchNode>),
}

/// Workflow node IR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node id, unique within its workflow
    pub id: String,
    /// Execution settings
    pub metadata: NodeMetadata,
    /// Input bindings
    pub inputs: Vec<Binding>,
    /// Ids of nodes that must finish first
    pub upstream_node_ids: Vec<String>,
    /// Output renames
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_aliases: Vec<Alias>,
    /// What the node runs
    pub target: NodeTarget,
}

/// Behaviour when a node fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowFailurePolicy {
    /// Abort running nodes at the first failure
    #[default]
    FailImmediately,
    /// Let runnable nodes finish before failing
    FailAfterExecutableNodesComplete,
}

/// Workflow-level settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    /// Failure policy
    pub on_failure: WorkflowFailurePolicy,
}

/// Defaults applied to every node of a workflow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowMetadataDefaults {
    /// Default interruptibility
    pub interruptible: bool,
}

/// Registrable workflow definition
///
/// Equality and hashing consider only `id`, which is what sub-workflow
/// deduplication relies on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    /// Identifier
    pub id: Identifier,
    /// Settings
    pub metadata: WorkflowMetadata,
    /// Node defaults
    pub metadata_defaults: WorkflowMetadataDefaults,
    /// Typed interface
    pub interface: TypedInterface,
    /// Nodes in declaration order
    pub nodes: Vec<Node>,
    /// Output bindings
    pub outputs: Vec<Binding>,
}

impl PartialEq for WorkflowTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WorkflowTemplate {}

impl Hash for WorkflowTemplate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Workflow registration payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    /// Main template
    pub template: WorkflowTemplate,
    /// Every workflow reachable as a sub-workflow, once each
    pub sub_workflows: Vec<WorkflowTemplate>,
}
