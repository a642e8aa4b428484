//! content-forge: schema-validated content generation against hosted LLM APIs.
//!
//! A task names a kind and its inputs. The pipeline renders a prompt from the
//! kind's schema, calls the model, validates the reply against the schema
//! and retries until it conforms. Accepted output is stored as an immutable
//! artifact with its provenance.

pub mod cli;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod prompts;
pub mod schema;
pub mod storage;
pub mod utils;
pub mod validation;

// Re-export commonly used types
pub use error::{FieldViolation, LlmError, PromptError, RegistryError, ValidationError};
pub use pipeline::{
    ErrorKind, PipelineConfig, PipelineFailure, PipelineOrchestrator, PipelineResult, TaskSpec,
};
pub use schema::{Schema, SchemaRegistry, TaskKind};
pub use storage::{Artifact, ArtifactId, ArtifactStore, StorageError};
