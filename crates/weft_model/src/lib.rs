//! weft wire model
//!
//! Control plane records produced by lowering: task, workflow and launch
//! plan specs, node and branch IR, interfaces, literals and bindings.
//! Records are plain data; constructing them never fails.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod condition;
pub mod entity;
pub mod interface;
pub mod launch_plan;
pub mod literals;
pub mod task;
pub mod types;
pub mod workflow;

pub use condition::{
    BooleanExpression, BranchError, ComparisonExpression, ComparisonOperator,
    ConjunctionExpression, ConjunctionOperator, Operand,
};
pub use entity::ControlPlaneEntity;
pub use interface::{Parameter, ParameterMap, TypedInterface, Variable, VariableMap};
pub use launch_plan::{
    Annotations, AuthRole, Labels, LaunchPlan, LaunchPlanClosure, LaunchPlanMetadata,
    LaunchPlanSpec, LaunchPlanState, Notification, NotificationTarget, RawOutputDataConfig,
    Schedule, ScheduleExpression, WorkflowExecutionPhase,
};
pub use literals::{Binding, BindingData, Literal, LiteralMap, OutputReference, Primitive, Scalar};
pub use task::{
    Container, Identity, ResourceEntry, ResourceName, Resources, RetryStrategy, RuntimeMetadata,
    Secret, SecurityContext, TaskMetadata, TaskSpec, TaskTemplate,
};
pub use types::{BlobDimensionality, BlobType, LiteralType, SimpleType};
pub use workflow::{
    Alias, BranchNode, IfBlock, IfElseBlock, Node, NodeMetadata, NodeTarget, TaskNode,
    TaskNodeOverrides, WorkflowFailurePolicy, WorkflowMetadata, WorkflowMetadataDefaults,
    WorkflowNode, WorkflowSpec, WorkflowTemplate,
};
