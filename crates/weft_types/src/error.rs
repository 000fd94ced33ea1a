//! Type mapping errors.

use thiserror::Error;

/// Result type for type mapping
pub type TypeResult<T> = Result<T, TypeError>;

/// Error raised for types the control plane cannot represent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// The type has no structural representation
    #[error("type {native} is not supported: {reason}")]
    UnsupportedType {
        /// Offending type, in textual form
        native: String,
        /// Why it was rejected
        reason: String,
    },

    /// A record field failed to map
    #[error("field '{field}': {source}")]
    Field {
        /// Field name
        field: String,
        /// Underlying failure
        #[source]
        source: Box<TypeError>,
    },

    /// Textual type description is malformed
    #[error("cannot parse type '{input}' at {position}: {reason}")]
    Parse {
        /// Full input
        input: String,
        /// Byte offset of the failure
        position: usize,
        /// What was expected
        reason: String,
    },
}

impl TypeError {
    /// Innermost error, skipping field context
    #[must_use]
    pub fn root(&self) -> &TypeError {
        match self {
            Self::Field { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the root cause is an unsupported type
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self.root(), Self::UnsupportedType { .. })
    }
}
