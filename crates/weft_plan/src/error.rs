//! Lowering errors.

use weft_core::ResourceType;
use weft_types::TypeError;

/// Result type for lowering
pub type LowerResult<T> = Result<T, LowerError>;

/// Error raised while lowering an authored entity
///
/// Lowering stops at the first error; entries already recorded in the
/// mapping stay valid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LowerError {
    /// A node was authored without an entity to run
    #[error("node '{node}' has no entity to run")]
    MissingEntity {
        /// Authored node id
        node: String,
    },

    /// A node wraps something that cannot be run as a node
    #[error("node '{node}' wraps a {kind}, which cannot be serialized as a node")]
    NonSerializableEntity {
        /// Authored node id
        node: String,
        /// Kind of the wrapped entity
        kind: &'static str,
    },

    /// A reference points at a resource type nodes cannot target
    #[error("reference {reference} has unsupported resource type {resource_type}")]
    UnknownReferenceType {
        /// Referenced identifier
        reference: String,
        /// Its resource type
        resource_type: ResourceType,
    },

    /// A workflow embeds a reference to another workflow
    #[error("node '{node}' references a registered workflow; reference sub-workflows cannot be embedded")]
    ReferenceSubWorkflow {
        /// Authored node id
        node: String,
    },

    /// An entity depends on itself
    #[error("dependency cycle through {entity}")]
    Cycle {
        /// Entity reached again while still being lowered
        entity: String,
    },

    /// Two nodes of one workflow share an id once normalized
    #[error("node '{node}' of workflow '{workflow}' normalizes to '{normalized}', which another node already uses")]
    DuplicateNodeId {
        /// Workflow name
        workflow: String,
        /// Authored node id
        node: String,
        /// Normalized id both nodes map to
        normalized: String,
    },

    /// An auto-container task has no image
    #[error("task '{task}' has no image and no default image is configured")]
    MissingImage {
        /// Task name
        task: String,
    },

    /// A mapping entry has a different kind than its entity
    #[error("{entity} was lowered to a {found}, expected a {expected}")]
    UnexpectedSpec {
        /// Entity description
        entity: String,
        /// Expected kind
        expected: &'static str,
        /// Kind found in the mapping
        found: &'static str,
    },

    /// A declared type could not be mapped
    #[error("interface of {entity}: {source}")]
    Type {
        /// Entity description
        entity: String,
        /// Underlying failure
        #[source]
        source: TypeError,
    },
}

impl LowerError {
    /// Whether the failure comes from an unsupported declared type
    #[must_use]
    pub fn is_unsupported_type(&self) -> bool {
        matches!(self, Self::Type { source, .. } if source.is_unsupported())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = LowerError::MissingEntity {
            node: "n0".to_string(),
        };
        assert_eq!(err.to_string(), "node 'n0' has no entity to run");

        let err = LowerError::UnknownReferenceType {
            reference: "dataset:p/d/x@v".to_string(),
            resource_type: ResourceType::Dataset,
        };
        assert!(err.to_string().contains("dataset"));
    }

    #[test]
    fn test_unsupported_type_detection() {
        let err = LowerError::Type {
            entity: "task 't'".to_string(),
            source: TypeError::UnsupportedType {
                native: "tuple".to_string(),
                reason: "no".to_string(),
            },
        };
        assert!(err.is_unsupported_type());
        assert!(!LowerError::Cycle {
            entity: "x".to_string()
        }
        .is_unsupported_type());
    }
}
