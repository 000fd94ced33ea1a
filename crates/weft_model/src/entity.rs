//! The lowered form of any authored entity.

use crate::launch_plan::LaunchPlan;
use crate::task::TaskSpec;
use crate::workflow::{BranchNode, Node, WorkflowSpec};
use serde::{Deserialize, Serialize};
use weft_core::Identifier;

/// Result of lowering one authored entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "spec")]
pub enum ControlPlaneEntity {
    /// Task registration payload
    Task(TaskSpec),
    /// Workflow registration payload
    Workflow(WorkflowSpec),
    /// Node IR
    Node(Node),
    /// Launch plan
    LaunchPlan(LaunchPlan),
    /// Branch IR
    Branch(BranchNode),
    /// Stand-in for a reference to an already registered entity
    Placeholder,
}

impl ControlPlaneEntity {
    /// Identifier of specs that carry one
    #[must_use]
    pub fn identifier(&self) -> Option<&Identifier> {
        match self {
            Self::Task(spec) => Some(&spec.template.id),
            Self::Workflow(spec) => Some(&spec.template.id),
            Self::LaunchPlan(lp) => Some(&lp.id),
            Self::Node(_) | Self::Branch(_) | Self::Placeholder => None,
        }
    }

    /// Whether this entry is submitted to the control plane on its own
    #[must_use]
    pub fn is_registrable(&self) -> bool {
        matches!(self, Self::Task(_) | Self::Workflow(_) | Self::LaunchPlan(_))
    }

    /// Short label of the variant
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Task(_) => "task",
            Self::Workflow(_) => "workflow",
            Self::Node(_) => "node",
            Self::LaunchPlan(_) => "launch_plan",
            Self::Branch(_) => "branch",
            Self::Placeholder => "placeholder",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_not_registrable() {
        let p = ControlPlaneEntity::Placeholder;
        assert!(!p.is_registrable());
        assert!(p.identifier().is_none());
        assert_eq!(p.kind(), "placeholder");
    }
}
