//! Identifiers for authored entities and registered resources.
//!
//! [`EntityId`] names an authored object for the lifetime of one process and
//! is what lowering memoizes on. [`Identifier`] is the control plane's
//! globally unique name for a registered resource.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identity of an authored entity
///
/// Assigned once when the entity is constructed and shared by every handle
/// to it. Two entities with equal content but separate construction have
/// distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Create a new random EntityId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ent_{}", self.0)
    }
}

/// Kind of resource an [`Identifier`] points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Not set
    #[default]
    Unspecified,
    /// A task definition
    Task,
    /// A workflow definition
    Workflow,
    /// A launch plan
    LaunchPlan,
    /// A dataset
    Dataset,
}

impl ResourceType {
    /// Stable lowercase name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Task => "task",
            Self::Workflow => "workflow",
            Self::LaunchPlan => "launch_plan",
            Self::Dataset => "dataset",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control plane identifier of a registered resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier {
    /// Resource kind
    pub resource_type: ResourceType,
    /// Owning project
    pub project: String,
    /// Domain within the project
    pub domain: String,
    /// Resource name
    pub name: String,
    /// Registration version
    pub version: String,
}

impl Identifier {
    /// Create a new identifier
    #[must_use]
    pub fn new(
        resource_type: ResourceType,
        project: impl Into<String>,
        domain: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            resource_type,
            project: project.into(),
            domain: domain.into(),
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}/{}@{}",
            self.resource_type, self.project, self.domain, self.name, self.version
        )
    }
}
