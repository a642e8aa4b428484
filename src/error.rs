//! Error types for content-forge operations.
//!
//! Defines the typed failure causes for each pipeline component:
//! - LLM API interactions (transport level)
//! - Schema registry loading and lookup
//! - Prompt construction from task specifications
//! - Validation of model output against a schema
//!
//! Storage and configuration errors live next to their modules
//! (`storage::StorageError`, `pipeline::ConfigError`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during a single LLM API call.
///
/// These are raw transport outcomes. The model client adapter classifies
/// them into retryable and fatal failures.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("Missing API key: set CONTENT_FORGE_API_KEY or pass --api-key")]
    MissingApiKey,

    #[error("HTTP client configuration error: {0}")]
    Configuration(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Request timed out after {millis} ms")]
    Timeout { millis: u64 },

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("LLM response contained no choices")]
    EmptyResponse,

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Context length exceeded: {limit} tokens")]
    ContextLengthExceeded { limit: u32 },

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Errors that can occur while loading or querying the schema registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown task kind '{0}'")]
    UnknownTaskKind(String),

    #[error("Duplicate schema for task kind '{0}'")]
    DuplicateKind(String),

    #[error("Invalid schema '{schema}': {message}")]
    InvalidDefinition { schema: String, message: String },

    #[error("Invalid range [{min}, {max}] for field '{field}' in schema '{schema}': min must be <= max")]
    InvalidRange {
        schema: String,
        field: String,
        min: String,
        max: String,
    },

    #[error("Invalid regex pattern '{pattern}' for field '{field}': {message}")]
    InvalidPattern {
        field: String,
        pattern: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors raised while turning a task specification into a prompt payload.
///
/// All of these are caller errors and are never retried.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Invalid task spec for '{kind}': missing required inputs {missing:?}, unknown inputs {unknown:?}")]
    InvalidTaskSpec {
        kind: String,
        missing: Vec<String>,
        unknown: Vec<String>,
    },

    #[error("Schema lookup failed: {0}")]
    Registry(#[from] RegistryError),
}

/// A single field that failed schema validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Dotted path of the offending field (`"$"` for the document root).
    pub field: String,
    /// Description of what was wrong.
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors that can occur while validating model output.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Schema violation in '{schema}': {}", summarize(.violations))]
    SchemaViolation {
        schema: String,
        violations: Vec<FieldViolation>,
    },
}

impl ValidationError {
    /// Returns the individual field violations.
    pub fn violations(&self) -> &[FieldViolation] {
        match self {
            ValidationError::SchemaViolation { violations, .. } => violations,
        }
    }
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
