//! Task templates.

use crate::interface::TypedInterface;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::time::Duration;
use weft_core::Identifier;

/// Compute resource kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceName {
    /// CPU cores
    Cpu,
    /// GPU devices
    Gpu,
    /// Memory
    Memory,
    /// Persistent storage
    Storage,
    /// Scratch storage
    EphemeralStorage,
}

/// One resource quantity, e.g. `memory = "2Gi"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceEntry {
    /// Resource kind
    pub name: ResourceName,
    /// Quantity in Kubernetes notation
    pub value: String,
}

/// Resource requests and limits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    /// Guaranteed amounts
    pub requests: Vec<ResourceEntry>,
    /// Upper bounds
    pub limits: Vec<ResourceEntry>,
}

impl Resources {
    /// Create empty resources
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request
    #[must_use]
    pub fn with_request(mut self, name: ResourceName, value: impl Into<String>) -> Self {
        self.requests.push(ResourceEntry {
            name,
            value: value.into(),
        });
        self
    }

    /// Add a limit
    #[must_use]
    pub fn with_limit(mut self, name: ResourceName, value: impl Into<String>) -> Self {
        self.limits.push(ResourceEntry {
            name,
            value: value.into(),
        });
        self
    }

    /// Whether nothing is requested or limited
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.limits.is_empty()
    }
}

/// SDK that produced a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeMetadata {
    /// SDK name
    pub flavor: String,
    /// SDK version
    pub version: String,
}

impl Default for RuntimeMetadata {
    fn default() -> Self {
        Self {
            flavor: "weft".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Retry policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryStrategy {
    /// Attempts after the first failure
    pub retries: u32,
}

/// Execution metadata of a task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Whether outputs may be cached
    pub discoverable: bool,
    /// Producing SDK
    pub runtime: RuntimeMetadata,
    /// Execution timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Retry policy
    pub retries: RetryStrategy,
    /// Whether the task may run on preemptible capacity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interruptible: Option<bool>,
    /// Cache key version
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub discovery_version: String,
    /// Set when the task is deprecated
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deprecated_error_message: String,
}

/// Container that runs a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Image reference
    pub image: String,
    /// Entrypoint override
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Arguments
    pub args: Vec<String>,
    /// Resources
    pub resources: Resources,
    /// Environment
    pub env: IndexMap<String, String>,
}

/// Identity a task runs as
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// IAM-style role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iam_role: Option<String>,
    /// Kubernetes service account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k8s_service_account: Option<String>,
}

/// Secret mounted into a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    /// Secret group
    pub group: String,
    /// Key within the group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Security settings of a task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityContext {
    /// Identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as: Option<Identity>,
    /// Secrets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<Secret>,
}

/// Registrable task definition
///
/// Equality and hashing consider only `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTemplate {
    /// Identifier
    pub id: Identifier,
    /// Plugin type, e.g. `python-task`
    #[serde(rename = "type")]
    pub task_type: String,
    /// Execution metadata
    pub metadata: TaskMetadata,
    /// Typed interface
    pub interface: TypedInterface,
    /// Plugin-specific payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<serde_json::Value>,
    /// Container, for container-based tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,
    /// Pod spec, for pod-based tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k8s_pod: Option<serde_json::Value>,
    /// Version of the plugin payload format
    pub task_type_version: u32,
    /// Security settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,
    /// Plugin configuration
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub config: IndexMap<String, String>,
}

impl PartialEq for TaskTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TaskTemplate {}

impl Hash for TaskTemplate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Task registration payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Template
    pub template: TaskTemplate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::ResourceType;

    fn template(name: &str, task_type: &str) -> TaskTemplate {
        TaskTemplate {
            id: Identifier::new(ResourceType::Task, "p", "d", name, "v"),
            task_type: task_type.to_string(),
            metadata: TaskMetadata::default(),
            interface: TypedInterface::default(),
            custom: None,
            container: None,
            k8s_pod: None,
            task_type_version: 0,
            security_context: None,
            config: IndexMap::new(),
        }
    }

    #[test]
    fn test_resources_builder() {
        let res = Resources::new()
            .with_request(ResourceName::Cpu, "500m")
            .with_limit(ResourceName::Memory, "2Gi");
        assert_eq!(res.requests.len(), 1);
        assert_eq!(res.limits[0].value, "2Gi");
        assert!(!res.is_empty());
        assert!(Resources::new().is_empty());
    }

    #[test]
    fn test_template_equality_is_by_identifier() {
        assert_eq!(template("t", "python-task"), template("t", "sql"));
        assert_ne!(template("t", "python-task"), template("u", "python-task"));
    }

    #[test]
    fn test_metadata_skips_empty_fields() {
        let json = serde_json::to_value(TaskMetadata::default()).unwrap();
        assert!(json.get("timeout").is_none());
        assert!(json.get("discovery_version").is_none());
        assert_eq!(json["runtime"]["flavor"], "weft");
    }
}
