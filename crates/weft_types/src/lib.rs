//! weft type system
//!
//! Maps native type descriptions onto the control plane's literal types:
//! a closed catalog of scalars and blob handles, plus string-keyed maps and
//! homogeneous lists built recursively from them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod engine;
pub mod error;
pub mod native;

pub use catalog::{base_type, FileFormat};
pub use engine::{Signature, TypeEngine};
pub use error::{TypeError, TypeResult};
pub use native::{NativeType, Origin, TypeDescription};
