//! Typed interfaces of tasks, workflows and launch plans.

use crate::literals::Literal;
use crate::types::LiteralType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A named, typed input or output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Declared type
    #[serde(rename = "type")]
    pub literal_type: LiteralType,
    /// Free-form description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Variable {
    /// Variable with no description
    #[must_use]
    pub fn new(literal_type: LiteralType) -> Self {
        Self {
            literal_type,
            description: String::new(),
        }
    }
}

/// Variables by name
pub type VariableMap = IndexMap<String, Variable>;

/// Inputs and outputs of an executable entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedInterface {
    /// Inputs by name
    pub inputs: VariableMap,
    /// Outputs by name
    pub outputs: VariableMap,
}

/// A launch plan input with an optional default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Declared variable
    pub var: Variable,
    /// Default used when the caller supplies nothing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Literal>,
    /// Whether the caller must supply a value
    #[serde(default)]
    pub required: bool,
}

/// Parameters by name
pub type ParameterMap = IndexMap<String, Parameter>;
