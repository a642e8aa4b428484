//! Generation pipeline.
//!
//! - **Task**: the declarative request ([`TaskSpec`], [`ModelParams`])
//! - **Config**: retry ceilings, timeouts, budgets ([`PipelineConfig`])
//! - **Orchestrator**: drives one task to a [`PipelineResult`]
//! - **Chain**: background discovery → structural planning → draft generation
//!
//! # Example
//!
//! ```rust,ignore
//! use content_forge::pipeline::{PipelineConfig, PipelineOrchestrator, TaskSpec};
//! use content_forge::schema::{SchemaRegistry, TaskKind};
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::from_env()?;
//! let orchestrator = PipelineOrchestrator::new(config, registry, provider, store)?;
//!
//! let task = TaskSpec::new(TaskKind::BackgroundDiscovery).with_input("topic", "Tidal energy");
//! match orchestrator.run(task).await {
//!     PipelineResult::Success(artifact) => println!("stored {}", artifact.id),
//!     PipelineResult::Failure(failure) => eprintln!("{}", failure),
//! }
//! ```

pub mod chain;
pub mod config;
pub mod orchestrator;
pub mod result;
pub mod task;

pub use chain::{draft_title, ChainError, ChainParams, ChainResult, ContentChain};
pub use config::{ConfigError, PipelineConfig};
pub use orchestrator::{PipelineOrchestrator, PipelineStats};
pub use result::{
    AttemptPhase, AttemptRecord, ErrorKind, FailureCause, PipelineFailure, PipelineResult,
};
pub use task::{ModelParams, TaskSpec, DEFAULT_MODEL};
