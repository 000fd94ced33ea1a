//! weft core types
//!
//! Identifiers shared by the authoring side and the wire side, the
//! serialization settings every identifier is stamped with, and the
//! naming rules the control plane imposes on node ids.
//! This crate performs no I/O beyond reading a settings file on request.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod id;
pub mod naming;
pub mod settings;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use id::{EntityId, Identifier, ResourceType};
pub use naming::dnsify;
pub use settings::{DefaultAuthRole, SerializationSettings, SettingsOverrides};
