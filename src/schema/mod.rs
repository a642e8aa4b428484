//! Schema registry: the structural contract each task kind's output must meet.
//!
//! Schemas are declared in YAML (the built-in set is embedded in the binary),
//! checked once at load and read-only afterwards.

mod registry;
mod types;

pub use registry::SchemaRegistry;
pub use types::{
    AdditionalFields, Constraints, FieldSpec, FieldType, InputSpec, Schema, SchemaRef, TaskKind,
};
