//! LLM integration: provider seam, model client adapter and cost tracking.
//!
//! Providers perform single remote calls behind the [`LlmProvider`] trait.
//! [`ModelClient`] wraps a provider with the retry, timeout, cancellation and
//! cost-attribution policy the pipeline relies on.
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use content_forge::llm::{CostTracker, InvokeOptions, ModelClient, OpenRouterProvider, RetryPolicy};
//!
//! let provider = Arc::new(OpenRouterProvider::new(api_key, "openai/gpt-4.1".to_string())?);
//! let client = ModelClient::new(provider, RetryPolicy::default(), Arc::new(CostTracker::new(10.0, 100.0)));
//! let response = client
//!     .invoke(&payload, &InvokeOptions::new(Duration::from_secs(120)), &CancellationToken::new())
//!     .await?;
//! ```

pub mod client;
pub mod cost;
pub mod provider;
pub mod providers;
pub mod retry;

pub use client::{
    classify, InvokeError, InvokeOptions, ModelClient, ModelResponse, TransportFailure,
};
pub use cost::{CostReport, CostTracker, ModelPricing, UsageRecord};
pub use provider::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
pub use providers::{OpenRouterProvider, ScriptedProvider, ScriptedReply};
pub use retry::RetryPolicy;
