//! Terminal results of a pipeline run.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FieldViolation;
use crate::llm::TransportFailure;
use crate::storage::{Artifact, TokenUsage};

/// Why a run failed, at the granularity callers act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The task spec was rejected before any remote call.
    InvalidInput,
    /// The remote API failed, or the budget forbade calling it.
    RemoteError,
    /// Every allowed attempt produced output that violated the schema.
    ValidationExhausted,
    /// Valid output could not be persisted.
    StoreFailure,
    Cancelled,
}

impl ErrorKind {
    /// snake_case label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::RemoteError => "remote_error",
            ErrorKind::ValidationExhausted => "validation_exhausted",
            ErrorKind::StoreFailure => "store_failure",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::RemoteError => "RemoteError",
            ErrorKind::ValidationExhausted => "ValidationExhausted",
            ErrorKind::StoreFailure => "StoreFailure",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// Typed cause attached to a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureCause {
    InvalidInput {
        message: String,
    },
    Transport {
        failure: TransportFailure,
        message: String,
    },
    BudgetExceeded {
        daily_spent: f64,
        monthly_spent: f64,
    },
    SchemaViolation {
        schema: String,
        violations: Vec<FieldViolation>,
    },
    Store {
        message: String,
    },
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::InvalidInput { message } => f.write_str(message),
            FailureCause::Transport { failure, message } => write!(f, "{}: {}", failure, message),
            FailureCause::BudgetExceeded {
                daily_spent,
                monthly_spent,
            } => write!(
                f,
                "budget exceeded (daily ${:.2}, monthly ${:.2})",
                daily_spent, monthly_spent
            ),
            FailureCause::SchemaViolation { schema, violations } => {
                let listed = violations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                write!(f, "schema '{}' violated: {}", schema, listed)
            }
            FailureCause::Store { message } => write!(f, "store failure: {}", message),
        }
    }
}

/// How a single pipeline attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptPhase {
    Accepted,
    SchemaViolation,
    TransportError,
    StoreFailure,
    Cancelled,
}

impl AttemptPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptPhase::Accepted => "accepted",
            AttemptPhase::SchemaViolation => "schema_violation",
            AttemptPhase::TransportError => "transport_error",
            AttemptPhase::StoreFailure => "store_failure",
            AttemptPhase::Cancelled => "cancelled",
        }
    }
}

/// Record of one pipeline attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    pub phase: AttemptPhase,
    pub temperature: f64,
    pub transport_calls: u32,
    pub usage: TokenUsage,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<FieldViolation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A run that ended without an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineFailure {
    pub task_id: String,
    pub kind: ErrorKind,
    /// Pipeline attempts started, including a cancelled one.
    pub attempts_made: u32,
    pub cause: Option<FailureCause>,
    pub history: Vec<AttemptRecord>,
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} after {} attempt(s)", self.kind, self.attempts_made)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for PipelineFailure {}

/// Terminal result of `PipelineOrchestrator::run`.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineResult {
    Success(Artifact),
    Failure(PipelineFailure),
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success(_))
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            PipelineResult::Success(artifact) => Some(artifact),
            PipelineResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&PipelineFailure> {
        match self {
            PipelineResult::Success(_) => None,
            PipelineResult::Failure(failure) => Some(failure),
        }
    }

    /// Pipeline attempts made, successful or not.
    pub fn attempts_made(&self) -> u32 {
        match self {
            PipelineResult::Success(artifact) => artifact.provenance.attempt_count,
            PipelineResult::Failure(failure) => failure.attempts_made,
        }
    }

    pub fn into_result(self) -> Result<Artifact, PipelineFailure> {
        match self {
            PipelineResult::Success(artifact) => Ok(artifact),
            PipelineResult::Failure(failure) => Err(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(kind: ErrorKind, cause: Option<FailureCause>) -> PipelineFailure {
        PipelineFailure {
            task_id: "t".to_string(),
            kind,
            attempts_made: 3,
            cause,
            history: Vec::new(),
        }
    }

    #[test]
    fn test_failure_display_names_kind_and_attempts() {
        let f = failure(
            ErrorKind::ValidationExhausted,
            Some(FailureCause::SchemaViolation {
                schema: "content_draft@1.0.0".to_string(),
                violations: vec![FieldViolation::new("slug", "must match /x/")],
            }),
        );
        let text = f.to_string();
        assert!(text.starts_with("ValidationExhausted after 3 attempt(s)"));
        assert!(text.contains("slug: must match /x/"));

        assert_eq!(
            failure(ErrorKind::Cancelled, None).to_string(),
            "Cancelled after 3 attempt(s)"
        );
    }

    #[test]
    fn test_cause_serializes_with_type_tag() {
        let cause = FailureCause::Transport {
            failure: TransportFailure::AuthError,
            message: "401".to_string(),
        };
        let json = serde_json::to_value(&cause).unwrap();
        assert_eq!(json["type"], "transport");
        assert_eq!(json["failure"], "auth_error");
    }

    #[test]
    fn test_result_accessors() {
        let result = PipelineResult::Failure(failure(ErrorKind::RemoteError, None));
        assert!(!result.is_success());
        assert!(result.artifact().is_none());
        assert_eq!(result.attempts_made(), 3);
        assert_eq!(result.into_result().unwrap_err().kind, ErrorKind::RemoteError);
    }

    #[test]
    fn test_error_kind_labels() {
        assert_eq!(ErrorKind::StoreFailure.as_str(), "store_failure");
        assert_eq!(ErrorKind::InvalidInput.to_string(), "InvalidInput");
        assert_eq!(AttemptPhase::SchemaViolation.as_str(), "schema_violation");
    }
}
