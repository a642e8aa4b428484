//! Model client adapter: the single call boundary to the remote API.
//!
//! Owns transport retry, backoff, per-attempt timeout and cancellation, and
//! attributes every attempt to the cost tracker, tracing and metrics. It
//! never interprets the model's text; that is the validator's job.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::cost::{CostTracker, ModelPricing};
use super::provider::{GenerationResponse, LlmProvider, Usage};
use super::retry::RetryPolicy;
use crate::error::LlmError;
use crate::metrics::MetricsCollector;
use crate::prompts::PromptPayload;

/// Classified transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportFailure {
    /// Network error, timeout, 5xx or unparsable reply.
    TransientError,
    /// The API asked us to slow down.
    RateLimited,
    /// Credentials missing or rejected.
    AuthError,
    /// The API rejected the request itself.
    MalformedRequest,
}

impl TransportFailure {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportFailure::TransientError | TransportFailure::RateLimited
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportFailure::TransientError => "transient_error",
            TransportFailure::RateLimited => "rate_limited",
            TransportFailure::AuthError => "auth_error",
            TransportFailure::MalformedRequest => "malformed_request",
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a raw provider error onto the retry taxonomy.
pub fn classify(error: &LlmError) -> TransportFailure {
    match error {
        LlmError::RequestFailed(_)
        | LlmError::Timeout { .. }
        | LlmError::ParseError(_)
        | LlmError::EmptyResponse => TransportFailure::TransientError,
        LlmError::RateLimited(_) => TransportFailure::RateLimited,
        LlmError::MissingApiKey => TransportFailure::AuthError,
        LlmError::ApiError { code, .. } => match *code {
            401 | 403 => TransportFailure::AuthError,
            408 => TransportFailure::TransientError,
            429 => TransportFailure::RateLimited,
            500..=599 => TransportFailure::TransientError,
            _ => TransportFailure::MalformedRequest,
        },
        LlmError::InvalidModel(_)
        | LlmError::ContextLengthExceeded { .. }
        | LlmError::Configuration(_) => TransportFailure::MalformedRequest,
    }
}

/// Raw output of one successful remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub model: String,
    pub usage: Usage,
    pub latency: Duration,
    pub finish_reason: String,
    /// Remote calls made by this invoke, including failed retries.
    pub transport_calls: u32,
    /// Cost attributed to this invoke, in micro-dollars.
    pub cost_micros: u64,
}

impl ModelResponse {
    /// Convenience constructor for responses that did not come from a provider.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: String::new(),
            usage: Usage::default(),
            latency: Duration::ZERO,
            finish_reason: "stop".to_string(),
            transport_calls: 1,
            cost_micros: 0,
        }
    }

    pub fn with_finish_reason(mut self, reason: impl Into<String>) -> Self {
        self.finish_reason = reason.into();
        self
    }
}

/// Terminal outcome of an invoke that produced no response.
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    #[error("{kind} after {attempts} transport attempt(s): {source}")]
    Transport {
        kind: TransportFailure,
        attempts: u32,
        #[source]
        source: LlmError,
    },

    #[error("cancelled after {attempts} transport attempt(s)")]
    Cancelled { attempts: u32 },
}

impl InvokeError {
    /// Remote calls made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            InvokeError::Transport { attempts, .. } | InvokeError::Cancelled { attempts } => {
                *attempts
            }
        }
    }
}

/// Per-invoke limits supplied by the caller.
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    /// Timeout for each individual attempt.
    pub timeout: Duration,
    /// Remote calls this invoke may still make; caps the retry policy.
    pub max_calls: u32,
    /// Task the calls are attributed to.
    pub task_id: Option<String>,
}

impl InvokeOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            max_calls: u32::MAX,
            task_id: None,
        }
    }

    pub fn with_max_calls(mut self, max_calls: u32) -> Self {
        self.max_calls = max_calls;
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

/// Retrying, cost-attributing wrapper around an `LlmProvider`.
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn LlmProvider>,
    retry: RetryPolicy,
    cost: Arc<CostTracker>,
    pricing: ModelPricing,
    metrics: MetricsCollector,
}

impl ModelClient {
    pub fn new(provider: Arc<dyn LlmProvider>, retry: RetryPolicy, cost: Arc<CostTracker>) -> Self {
        Self {
            provider,
            retry,
            cost,
            pricing: ModelPricing::default(),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_pricing(mut self, pricing: ModelPricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn cost_tracker(&self) -> &Arc<CostTracker> {
        &self.cost
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Sends the payload, retrying transient and rate-limited failures.
    ///
    /// The number of remote calls is bounded by both the retry policy and
    /// `options.max_calls`. Cancellation is observed before every attempt,
    /// while a call is in flight and during backoff sleeps; the in-flight
    /// future is dropped and no further calls are made.
    pub async fn invoke(
        &self,
        payload: &PromptPayload,
        options: &InvokeOptions,
        cancel: &CancellationToken,
    ) -> Result<ModelResponse, InvokeError> {
        let allowed = self.retry.max_attempts.max(1).min(options.max_calls);
        if allowed == 0 {
            return Err(InvokeError::Transport {
                kind: TransportFailure::TransientError,
                attempts: 0,
                source: LlmError::RequestFailed("remote call ceiling reached".to_string()),
            });
        }

        let model = payload.model_params.model.as_str();
        let task_id = options.task_id.as_deref();
        let mut attempt = 0u32;
        let mut spent_micros = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Err(InvokeError::Cancelled { attempts: attempt });
            }
            attempt += 1;

            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(
                        task_id = task_id.unwrap_or("-"),
                        attempt,
                        "Remote call cancelled in flight"
                    );
                    return Err(InvokeError::Cancelled { attempts: attempt });
                }
                result = tokio::time::timeout(
                    options.timeout,
                    self.provider.generate(payload.to_request()),
                ) => result,
            };
            let latency = started.elapsed();

            let result = match outcome {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout {
                    millis: options.timeout.as_millis() as u64,
                }),
            };
            let result = result.and_then(|response| match response.first_choice() {
                Some(_) => Ok(response),
                None => Err(LlmError::EmptyResponse),
            });

            match result {
                Ok(response) => {
                    let served = served_model(&response, model);
                    let cost_micros = self
                        .cost
                        .record(&served, &response.usage, &self.pricing, task_id);
                    spent_micros += cost_micros;
                    self.metrics.record_llm_request(
                        self.provider.name(),
                        model,
                        "success",
                        latency.as_secs_f64(),
                        &response.usage,
                        cost_micros as f64 / 1_000_000.0,
                    );
                    tracing::debug!(
                        task_id = task_id.unwrap_or("-"),
                        model = model,
                        attempt,
                        latency_ms = latency.as_millis() as u64,
                        input_tokens = response.usage.prompt_tokens,
                        output_tokens = response.usage.completion_tokens,
                        "Remote call succeeded"
                    );
                    let (text, finish_reason) = response
                        .first_choice()
                        .map(|c| (c.message.content.clone(), c.finish_reason.clone()))
                        .unwrap_or_default();
                    return Ok(ModelResponse {
                        text,
                        model: served,
                        usage: response.usage,
                        latency,
                        finish_reason,
                        transport_calls: attempt,
                        cost_micros: spent_micros,
                    });
                }
                Err(err) => {
                    let kind = classify(&err);
                    spent_micros += self
                        .cost
                        .record(model, &Usage::default(), &self.pricing, task_id);
                    self.metrics.record_llm_request(
                        self.provider.name(),
                        model,
                        kind.as_str(),
                        latency.as_secs_f64(),
                        &Usage::default(),
                        0.0,
                    );

                    if !kind.is_retryable() || attempt >= allowed {
                        tracing::warn!(
                            task_id = task_id.unwrap_or("-"),
                            model = model,
                            attempt,
                            failure = %kind,
                            error = %err,
                            "Remote call failed"
                        );
                        return Err(InvokeError::Transport {
                            kind,
                            attempts: attempt,
                            source: err,
                        });
                    }

                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        task_id = task_id.unwrap_or("-"),
                        model = model,
                        attempt,
                        max_attempts = allowed,
                        delay_ms = delay.as_millis() as u64,
                        failure = %kind,
                        error = %err,
                        "Retryable remote failure, backing off"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Err(InvokeError::Cancelled { attempts: attempt });
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

/// Model that served the response, falling back to the requested one.
fn served_model(response: &GenerationResponse, requested: &str) -> String {
    if response.model.is_empty() {
        requested.to_string()
    } else {
        response.model.clone()
    }
}
