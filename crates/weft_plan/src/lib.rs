//! WEFT Planner
//!
//! Authored entity graph and the translator that lowers it into
//! control-plane specs, recording every result in an [`EntityMapping`]
//! whose insertion order is a valid registration order.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entity;
pub mod error;
pub mod mapping;
pub mod translator;

pub use entity::{
    BranchNode, Case, CommandFn, GLOBAL_INPUT_NODE_ID, LaunchPlan, LocalEntity, Node,
    ReferenceEntity, Task, TaskBuilder, TaskKind, Workflow,
};
pub use error::{LowerError, LowerResult};
pub use mapping::{EntityMapping, MappingEntry};
pub use translator::{CommandOverride, Translator, fast_command, lower};
