//! Native type to literal type mapping.

use crate::catalog::base_type;
use crate::error::{TypeError, TypeResult};
use crate::native::{NativeType, Origin};
use indexmap::IndexMap;
use weft_model::{LiteralType, TypedInterface, Variable, VariableMap};

/// Declared inputs and outputs of a task or workflow, by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    /// Inputs in declaration order
    pub inputs: IndexMap<String, NativeType>,
    /// Outputs in declaration order
    pub outputs: IndexMap<String, NativeType>,
}

impl Signature {
    /// Empty signature
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input
    #[must_use]
    pub fn with_input(mut self, name: impl Into<String>, ty: NativeType) -> Self {
        self.inputs.insert(name.into(), ty);
        self
    }

    /// Add an output
    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>, ty: NativeType) -> Self {
        self.outputs.insert(name.into(), ty);
        self
    }
}

/// Maps native type descriptions to literal types
///
/// Stateless; every call is pure and deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeEngine;

impl TypeEngine {
    /// Create a new engine
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Map one native type
    ///
    /// Catalog entries map verbatim, `list[T]` maps to a collection of `T`,
    /// `dict[str, V]` maps to a map of `V`.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::UnsupportedType`] for tuples, bare lists, records,
    /// non-string map keys, unknown types and wrong argument counts
    pub fn to_literal_type(&self, native: &NativeType) -> TypeResult<LiteralType> {
        if let Some(base) = base_type(native) {
            return Ok(base.clone());
        }

        let desc = native.describe();
        match (desc.origin, desc.args) {
            (Origin::List, [element]) => Ok(LiteralType::collection(self.to_literal_type(element)?)),
            (Origin::Dict, [key, value]) => {
                if key.origin() != &Origin::Str || !key.is_bare() {
                    return Err(unsupported(
                        native,
                        format!("map keys must be str, found {}", key),
                    ));
                }
                Ok(LiteralType::map(self.to_literal_type(value)?))
            }
            (Origin::List, []) => Err(unsupported(native, "list element type is unknown")),
            (Origin::List | Origin::Dict, args) => Err(unsupported(
                native,
                format!("unexpected {} type arguments", args.len()),
            )),
            (Origin::Tuple, _) => Err(unsupported(native, "tuples have no structural form")),
            (Origin::Record(_), _) => Err(unsupported(
                native,
                "records are only supported as interface declarations",
            )),
            (_, _) => Err(unsupported(native, "no mapping is registered")),
        }
    }

    /// Map every field of a record independently
    ///
    /// Fails as a whole when any field fails; no partial map is returned.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::Field`] wrapping the first failing or repeated
    /// field
    pub fn to_variable_map<'a, I>(&self, fields: I) -> TypeResult<VariableMap>
    where
        I: IntoIterator<Item = (&'a str, &'a NativeType)>,
    {
        let mut variables = VariableMap::new();
        for (name, native) in fields {
            if variables.contains_key(name) {
                return Err(TypeError::Field {
                    field: name.to_string(),
                    source: Box::new(unsupported(native, "field is declared more than once")),
                });
            }
            let literal_type = self.to_literal_type(native).map_err(|e| {
                tracing::debug!(field = name, error = %e, "field type rejected");
                TypeError::Field {
                    field: name.to_string(),
                    source: Box::new(e),
                }
            })?;
            variables.insert(name.to_string(), Variable::new(literal_type));
        }
        Ok(variables)
    }

    /// Map the fields of a `record[...]` native type
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::UnsupportedType`] if `record` is not a record, or
    /// the field failure otherwise
    pub fn record_to_variable_map(&self, record: &NativeType) -> TypeResult<VariableMap> {
        let desc = record.describe();
        let Origin::Record(names) = desc.origin else {
            return Err(unsupported(record, "expected a record"));
        };
        if names.len() != desc.args.len() {
            return Err(unsupported(
                record,
                format!("{} field names for {} field types", names.len(), desc.args.len()),
            ));
        }
        self.to_variable_map(names.iter().map(String::as_str).zip(desc.args.iter()))
    }

    /// Map a declared signature into a typed interface
    ///
    /// # Errors
    ///
    /// Returns the first field failure among inputs, then outputs
    pub fn to_interface(&self, signature: &Signature) -> TypeResult<TypedInterface> {
        Ok(TypedInterface {
            inputs: self.to_variable_map(signature.inputs.iter().map(|(k, v)| (k.as_str(), v)))?,
            outputs: self
                .to_variable_map(signature.outputs.iter().map(|(k, v)| (k.as_str(), v)))?,
        })
    }
}

fn unsupported(native: &NativeType, reason: impl Into<String>) -> TypeError {
    TypeError::UnsupportedType {
        native: native.to_string(),
        reason: reason.into(),
    }
}
