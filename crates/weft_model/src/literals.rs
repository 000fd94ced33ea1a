//! Literal values and node input bindings.

use crate::types::BlobType;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Primitive scalar value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    /// Integer
    Integer(i64),
    /// Float
    Float(f64),
    /// Text
    String(String),
    /// Boolean
    Boolean(bool),
    /// Instant in time
    Datetime(DateTime<Utc>),
    /// Span of time
    Duration(Duration),
}

/// Scalar literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    /// Primitive value
    Primitive(Primitive),
    /// Untyped document
    Generic(serde_json::Value),
    /// Reference to a stored blob
    Blob {
        /// Blob type
        metadata: BlobType,
        /// Location
        uri: String,
    },
    /// No value
    NoneType,
}

/// Literal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    /// Scalar value
    Scalar(Scalar),
    /// List of literals
    Collection(Vec<Literal>),
    /// String-keyed map of literals
    Map(IndexMap<String, Literal>),
}

impl Literal {
    /// Integer literal
    #[must_use]
    pub fn integer(value: i64) -> Self {
        Self::Scalar(Scalar::Primitive(Primitive::Integer(value)))
    }

    /// String literal
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::Scalar(Scalar::Primitive(Primitive::String(value.into())))
    }
}

/// Literals by name
pub type LiteralMap = IndexMap<String, Literal>;

/// Output of another node, resolved at execution time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputReference {
    /// Producing node id
    pub node_id: String,
    /// Output variable of the producing node
    pub var: String,
}

/// Value bound to a node input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingData {
    /// Constant
    Scalar(Scalar),
    /// List of bindings
    Collection(Vec<BindingData>),
    /// Map of bindings
    Map(IndexMap<String, BindingData>),
    /// Upstream output
    Promise(OutputReference),
}

/// Input variable binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Bound variable
    pub var: String,
    /// Value
    pub binding: BindingData,
}

impl Binding {
    /// Bind `var` to a constant
    #[must_use]
    pub fn constant(var: impl Into<String>, value: Scalar) -> Self {
        Self {
            var: var.into(),
            binding: BindingData::Scalar(value),
        }
    }

    /// Bind `var` to the output `output` of node `node_id`
    #[must_use]
    pub fn promise(var: impl Into<String>, node_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            binding: BindingData::Promise(OutputReference {
                node_id: node_id.into(),
                var: output.into(),
            }),
        }
    }

    /// Upstream node ids this binding reads from
    #[must_use]
    pub fn upstream_node_ids(&self) -> Vec<&str> {
        fn walk<'a>(data: &'a BindingData, out: &mut Vec<&'a str>) {
            match data {
                BindingData::Scalar(_) => {}
                BindingData::Collection(items) => items.iter().for_each(|d| walk(d, out)),
                BindingData::Map(items) => items.values().for_each(|d| walk(d, out)),
                BindingData::Promise(r) => out.push(r.node_id.as_str()),
            }
        }
        let mut out = Vec::new();
        walk(&self.binding, &mut out);
        out
    }

    /// Rewrite the producing node id of every promise with `rename`
    #[must_use]
    pub fn rename_nodes(mut self, rename: impl Fn(&str) -> String) -> Self {
        self.binding.rename_nodes(&rename);
        self
    }
}

impl BindingData {
    /// Rewrite the producing node id of every nested promise
    pub fn rename_nodes(&mut self, rename: &impl Fn(&str) -> String) {
        match self {
            Self::Scalar(_) => {}
            Self::Collection(items) => items.iter_mut().for_each(|d| d.rename_nodes(rename)),
            Self::Map(items) => items.values_mut().for_each(|d| d.rename_nodes(rename)),
            Self::Promise(r) => r.node_id = rename(&r.node_id),
        }
    }
}
