//! Launch plans.

use crate::interface::{ParameterMap, VariableMap};
use crate::literals::LiteralMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use weft_core::Identifier;

/// When a schedule fires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleExpression {
    /// Cron expression
    Cron(String),
    /// Fixed rate
    Rate {
        /// Interval length
        value: u32,
        /// Interval unit, e.g. `minute`
        unit: String,
    },
}

/// Launch plan schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Trigger
    pub expression: ScheduleExpression,
    /// Input receiving the scheduled time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kickoff_time_input_arg: Option<String>,
}

/// Execution phases a notification can watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowExecutionPhase {
    /// Succeeded
    Succeeded,
    /// Failed
    Failed,
    /// Aborted
    Aborted,
    /// Timed out
    TimedOut,
}

/// Notification channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTarget {
    /// Email recipients
    Email(Vec<String>),
    /// PagerDuty recipients
    PagerDuty(Vec<String>),
    /// Slack recipients
    Slack(Vec<String>),
}

/// Notification on execution completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Phases that trigger it
    pub phases: Vec<WorkflowExecutionPhase>,
    /// Where it goes
    pub target: NotificationTarget,
}

/// Labels attached to executions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Labels {
    /// Label values
    pub values: IndexMap<String, String>,
}

/// Annotations attached to executions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    /// Annotation values
    pub values: IndexMap<String, String>,
}

/// Role executions run under
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRole {
    /// IAM-style role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assumable_iam_role: Option<String>,
    /// Kubernetes service account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_service_account: Option<String>,
}

/// Where raw task outputs are written
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutputDataConfig {
    /// Location prefix; empty means the platform default
    pub output_location_prefix: String,
}

/// Schedule and notifications
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchPlanMetadata {
    /// Schedule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    /// Notifications
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notifications: Vec<Notification>,
}

/// Launch plan body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchPlanSpec {
    /// Workflow launched
    pub workflow_id: Identifier,
    /// Schedule and notifications
    pub entity_metadata: LaunchPlanMetadata,
    /// Inputs with defaults
    pub default_inputs: ParameterMap,
    /// Inputs pinned to a value
    pub fixed_inputs: LiteralMap,
    /// Labels
    pub labels: Labels,
    /// Annotations
    pub annotations: Annotations,
    /// Role
    pub auth_role: AuthRole,
    /// Raw output location
    pub raw_output_data_config: RawOutputDataConfig,
    /// Concurrent node bound; `None` leaves it to the platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallelism: Option<u32>,
}

/// Activation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchPlanState {
    /// Not scheduled
    Inactive,
    /// Scheduled
    Active,
}

/// Server-computed part of a launch plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchPlanClosure {
    /// Activation state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<LaunchPlanState>,
    /// Inputs the plan expects
    pub expected_inputs: ParameterMap,
    /// Outputs the plan produces
    pub expected_outputs: VariableMap,
}

/// Registrable launch plan
///
/// Equality and hashing consider only `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchPlan {
    /// Identifier
    pub id: Identifier,
    /// Body
    pub spec: LaunchPlanSpec,
    /// Server-computed part
    pub closure: LaunchPlanClosure,
}

impl PartialEq for LaunchPlan {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LaunchPlan {}

impl Hash for LaunchPlan {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
