//! Validation of model output against the schema registry.

pub mod artifact_validator;

pub use artifact_validator::{ArtifactValidator, ValidatedContent, ROOT};
