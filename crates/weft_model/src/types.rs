//! Structural type vocabulary of the control plane.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimpleType {
    /// Absence of a value
    None,
    /// 64-bit signed integer
    Integer,
    /// 64-bit float
    Float,
    /// UTF-8 text
    String,
    /// Boolean
    Boolean,
    /// Instant in time
    Datetime,
    /// Span of time
    Duration,
    /// Raw bytes
    Binary,
    /// Error value
    Error,
    /// Untyped key/value document
    Struct,
}

/// Whether a blob is a single object or a directory of objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobDimensionality {
    /// One object
    Single,
    /// Many objects under a prefix
    Multipart,
}

/// Opaque blob handle type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobType {
    /// Format tag; empty means unspecified
    pub format: String,
    /// Object layout
    pub dimensionality: BlobDimensionality,
}

impl BlobType {
    /// Single-object blob of the given format
    #[must_use]
    pub fn single(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            dimensionality: BlobDimensionality::Single,
        }
    }
}

/// Structural type descriptor
///
/// Map keys are always strings and are not represented.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralType {
    /// Scalar
    Simple(SimpleType),
    /// Opaque blob
    Blob(BlobType),
    /// Homogeneous list
    CollectionType(Box<LiteralType>),
    /// String-keyed map
    MapValueType(Box<LiteralType>),
}

impl LiteralType {
    /// Collection of `element`
    #[must_use]
    pub fn collection(element: LiteralType) -> Self {
        Self::CollectionType(Box::new(element))
    }

    /// Map from string to `value`
    #[must_use]
    pub fn map(value: LiteralType) -> Self {
        Self::MapValueType(Box::new(value))
    }

    /// Nesting depth; scalars and blobs are 0
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Simple(_) | Self::Blob(_) => 0,
            Self::CollectionType(inner) | Self::MapValueType(inner) => 1 + inner.depth(),
        }
    }
}

impl fmt::Display for LiteralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(kind) => write!(f, "{:?}", kind),
            Self::Blob(blob) => write!(f, "Blob({:?}, {:?})", blob.format, blob.dimensionality),
            Self::CollectionType(inner) => write!(f, "Collection({})", inner),
            Self::MapValueType(inner) => write!(f, "Map({})", inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_depth() {
        let t = LiteralType::collection(LiteralType::map(LiteralType::Simple(SimpleType::Float)));
        assert_eq!(t.depth(), 2);
    }

    #[test]
    fn test_display() {
        let t = LiteralType::map(LiteralType::collection(LiteralType::Simple(SimpleType::Integer)));
        assert_eq!(format!("{}", t), "Map(Collection(Integer))");
    }

    #[test]
    fn test_serde_shape() {
        let t = LiteralType::collection(LiteralType::Blob(BlobType::single("csv")));
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["collection_type"]["blob"]["format"], "csv");
        assert_eq!(json["collection_type"]["blob"]["dimensionality"], "single");
    }
}
