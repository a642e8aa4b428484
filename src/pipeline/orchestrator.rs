//! Top-level driver: prompt builder → model client → validator → store.
//!
//! A run moves through
//!
//! ```text
//! BUILDING -> CALLING -> VALIDATING -> {STORING -> DONE} | RETRY_DECISION -> {CALLING | FAILED}
//! ```
//!
//! Only this module turns component failures into retry decisions. Transport
//! retries happen inside the model client; validation retries happen here,
//! with a cooler temperature and the previous violations fed back into the
//! prompt. Both share one ceiling on remote calls per run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::config::{ConfigError, PipelineConfig};
use super::result::{
    AttemptPhase, AttemptRecord, ErrorKind, FailureCause, PipelineFailure, PipelineResult,
};
use super::task::TaskSpec;
use crate::error::FieldViolation;
use crate::llm::{CostTracker, InvokeError, InvokeOptions, LlmProvider, ModelClient};
use crate::metrics::MetricsCollector;
use crate::prompts::{PromptBuilder, PromptPayload};
use crate::schema::SchemaRegistry;
use crate::storage::{ArtifactStore, Provenance, TokenUsage};
use crate::validation::ArtifactValidator;

/// Statistics about pipeline execution.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Total number of runs that reached a terminal result.
    pub total_executed: u64,
    pub successful: u64,
    pub failed: u64,
    /// Failures keyed by `ErrorKind::as_str()`.
    pub failures_by_kind: BTreeMap<String, u64>,
    /// Pipeline attempts across all runs.
    pub total_attempts: u64,
    pub average_duration: Duration,
    /// Dollars attributed this month by the cost tracker.
    pub total_cost: f64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, result: &PipelineResult, duration: Duration) {
        self.total_executed += 1;
        self.total_attempts += u64::from(result.attempts_made());
        match result {
            PipelineResult::Success(_) => self.successful += 1,
            PipelineResult::Failure(failure) => {
                self.failed += 1;
                *self
                    .failures_by_kind
                    .entry(failure.kind.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }
        self.update_average_duration(duration);
    }

    /// Incremental average: avg = avg + (new - avg) / n
    fn update_average_duration(&mut self, duration: Duration) {
        if self.total_executed == 1 {
            self.average_duration = duration;
        } else {
            let n = self.total_executed as f64;
            let old_avg = self.average_duration.as_secs_f64();
            let new_avg = old_avg + (duration.as_secs_f64() - old_avg) / n;
            self.average_duration = Duration::from_secs_f64(new_avg.max(0.0));
        }
    }

    /// Fraction of runs that produced an artifact.
    pub fn success_rate(&self) -> f64 {
        if self.total_executed == 0 {
            0.0
        } else {
            self.successful as f64 / self.total_executed as f64
        }
    }
}

/// Mutable bookkeeping for one run.
struct RunState {
    task_id: String,
    attempt: u32,
    calls_used: u32,
    usage: TokenUsage,
    cost_micros: u64,
    history: Vec<AttemptRecord>,
    last_violation: Option<FailureCause>,
}

impl RunState {
    fn new(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            attempt: 0,
            calls_used: 0,
            usage: TokenUsage::default(),
            cost_micros: 0,
            history: Vec::new(),
            last_violation: None,
        }
    }

    fn fail(self, kind: ErrorKind, cause: Option<FailureCause>) -> PipelineResult {
        PipelineResult::Failure(PipelineFailure {
            task_id: self.task_id,
            kind,
            attempts_made: self.attempt,
            cause,
            history: self.history,
        })
    }
}

/// Runs task specs to a terminal [`PipelineResult`].
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    registry: Arc<SchemaRegistry>,
    builder: PromptBuilder,
    client: ModelClient,
    validator: ArtifactValidator,
    store: Arc<dyn ArtifactStore>,
    concurrency_limiter: Arc<Semaphore>,
    stats: Arc<tokio::sync::RwLock<PipelineStats>>,
    metrics: MetricsCollector,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator whose model client is built from `config`:
    /// its retry policy, pricing and budgets.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid.
    pub fn new(
        config: PipelineConfig,
        registry: Arc<SchemaRegistry>,
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn ArtifactStore>,
    ) -> Result<Self, ConfigError> {
        let cost = Arc::new(CostTracker::new(config.daily_budget, config.monthly_budget));
        let client =
            ModelClient::new(provider, config.retry.clone(), cost).with_pricing(config.pricing);
        Self::with_client(config, registry, client, store)
    }

    /// Creates an orchestrator around an existing model client.
    pub fn with_client(
        config: PipelineConfig,
        registry: Arc<SchemaRegistry>,
        client: ModelClient,
        store: Arc<dyn ArtifactStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let concurrency_limiter = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        Ok(Self {
            builder: PromptBuilder::new(Arc::clone(&registry)),
            registry,
            client,
            validator: ArtifactValidator::new(),
            store,
            concurrency_limiter,
            stats: Arc::new(tokio::sync::RwLock::new(PipelineStats::new())),
            metrics: MetricsCollector::new(),
            config,
        })
    }

    /// Runs a task to completion.
    pub async fn run(&self, task: TaskSpec) -> PipelineResult {
        self.run_with_cancel(task, CancellationToken::new()).await
    }

    /// Runs a task, stopping cooperatively once `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        task: TaskSpec,
        cancel: CancellationToken,
    ) -> PipelineResult {
        let started = Instant::now();
        let kind = task.kind;
        self.metrics.inc_runs_in_progress();

        let result = self.execute(task, &cancel).await;

        let duration = started.elapsed();
        self.metrics.dec_runs_in_progress();
        let outcome = match &result {
            PipelineResult::Success(_) => "success",
            PipelineResult::Failure(failure) => failure.kind.as_str(),
        };
        self.metrics
            .record_pipeline_run(kind.as_str(), outcome, duration.as_secs_f64());
        self.stats.write().await.record(&result, duration);
        result
    }

    /// Runs tasks concurrently, at most `max_concurrent_tasks` at a time.
    /// Results come back in input order.
    pub async fn run_batch(&self, tasks: Vec<TaskSpec>) -> Vec<PipelineResult> {
        self.run_batch_with_cancel(tasks, CancellationToken::new()).await
    }

    pub async fn run_batch_with_cancel(
        &self,
        tasks: Vec<TaskSpec>,
        cancel: CancellationToken,
    ) -> Vec<PipelineResult> {
        if tasks.is_empty() {
            return Vec::new();
        }

        let futures: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let cancel = cancel.clone();
                async move {
                    // The semaphore is never closed, so acquire only fails
                    // if that changes; run unthrottled in that case.
                    let _permit = self.concurrency_limiter.acquire().await.ok();
                    self.run_with_cancel(task, cancel).await
                }
            })
            .collect();

        futures::future::join_all(futures).await
    }

    /// Gets the current pipeline statistics.
    pub async fn stats(&self) -> PipelineStats {
        let mut result = self.stats.read().await.clone();
        result.total_cost = self.client.cost_tracker().get_cost_report().monthly_spent;
        result
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn cost_tracker(&self) -> &Arc<CostTracker> {
        self.client.cost_tracker()
    }

    async fn execute(&self, task: TaskSpec, cancel: &CancellationToken) -> PipelineResult {
        let mut state = RunState::new(&task.task_id);
        let kind = task.kind.as_str();

        if cancel.is_cancelled() {
            return state.fail(ErrorKind::Cancelled, None);
        }

        // BUILDING
        let schema = match self.registry.get(task.kind) {
            Ok(schema) => schema,
            Err(e) => {
                tracing::warn!(task_id = %task.task_id, kind, error = %e, "Task rejected");
                return state.fail(
                    ErrorKind::InvalidInput,
                    Some(FailureCause::InvalidInput {
                        message: e.to_string(),
                    }),
                );
            }
        };
        let base = match self.builder.build(&task) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(task_id = %task.task_id, kind, error = %e, "Task rejected");
                return state.fail(
                    ErrorKind::InvalidInput,
                    Some(FailureCause::InvalidInput {
                        message: e.to_string(),
                    }),
                );
            }
        };

        let cost = self.client.cost_tracker();
        if cost.is_over_budget() {
            tracing::warn!(
                task_id = %task.task_id,
                daily_spent = cost.daily_spent(),
                monthly_spent = cost.monthly_spent(),
                "Budget exhausted, refusing to start run"
            );
            return state.fail(
                ErrorKind::RemoteError,
                Some(FailureCause::BudgetExceeded {
                    daily_spent: cost.daily_spent(),
                    monthly_spent: cost.monthly_spent(),
                }),
            );
        }

        let fingerprint = base.fingerprint();
        tracing::info!(
            task_id = %task.task_id,
            kind,
            schema = %base.schema,
            model = %base.model_params.model,
            fingerprint = %fingerprint,
            "Starting pipeline run"
        );

        let mut feedback: Vec<FieldViolation> = Vec::new();
        loop {
            // RETRY_DECISION
            if cancel.is_cancelled() {
                tracing::info!(task_id = %task.task_id, attempts = state.attempt, "Run cancelled");
                return state.fail(ErrorKind::Cancelled, None);
            }
            if state.attempt > 0
                && (state.attempt >= self.config.max_validation_attempts
                    || state.calls_used >= self.config.max_total_calls)
            {
                tracing::warn!(
                    task_id = %task.task_id,
                    kind,
                    attempts = state.attempt,
                    transport_calls = state.calls_used,
                    "Validation attempts exhausted"
                );
                let cause = state.last_violation.take();
                return state.fail(ErrorKind::ValidationExhausted, cause);
            }

            state.attempt += 1;
            let payload = self.attempt_payload(&base, state.attempt, &feedback);
            let temperature = payload.model_params.temperature;
            let options = InvokeOptions::new(self.config.attempt_timeout)
                .with_max_calls(self.config.max_total_calls.saturating_sub(state.calls_used))
                .with_task_id(task.task_id.clone());
            let attempt_started = Instant::now();

            // CALLING
            let response = match self.client.invoke(&payload, &options, cancel).await {
                Ok(response) => response,
                Err(InvokeError::Cancelled { attempts }) => {
                    state.calls_used += attempts;
                    self.push_record(
                        &mut state,
                        kind,
                        AttemptPhase::Cancelled,
                        temperature,
                        attempts,
                        TokenUsage::default(),
                        attempt_started,
                        Vec::new(),
                        None,
                    );
                    tracing::info!(
                        task_id = %task.task_id,
                        attempts = state.attempt,
                        "Run cancelled during remote call"
                    );
                    return state.fail(ErrorKind::Cancelled, None);
                }
                Err(InvokeError::Transport {
                    kind: failure,
                    attempts,
                    source,
                }) => {
                    state.calls_used += attempts;
                    self.push_record(
                        &mut state,
                        kind,
                        AttemptPhase::TransportError,
                        temperature,
                        attempts,
                        TokenUsage::default(),
                        attempt_started,
                        Vec::new(),
                        Some(source.to_string()),
                    );
                    tracing::error!(
                        task_id = %task.task_id,
                        kind,
                        attempt = state.attempt,
                        failure = %failure,
                        error = %source,
                        "Remote call failed"
                    );
                    return state.fail(
                        ErrorKind::RemoteError,
                        Some(FailureCause::Transport {
                            failure,
                            message: source.to_string(),
                        }),
                    );
                }
            };

            state.calls_used += response.transport_calls;
            state.cost_micros += response.cost_micros;
            let mut attempt_usage = TokenUsage::default();
            attempt_usage.add(&response.usage);
            state.usage += attempt_usage;

            // VALIDATING
            let content = match self.validator.validate(&response, schema) {
                Ok(content) => content,
                Err(err) => {
                    let violations = err.violations().to_vec();
                    tracing::warn!(
                        task_id = %task.task_id,
                        kind,
                        attempt = state.attempt,
                        violations = violations.len(),
                        error = %err,
                        "Output failed validation"
                    );
                    self.push_record(
                        &mut state,
                        kind,
                        AttemptPhase::SchemaViolation,
                        temperature,
                        response.transport_calls,
                        attempt_usage,
                        attempt_started,
                        violations.clone(),
                        None,
                    );
                    state.last_violation = Some(FailureCause::SchemaViolation {
                        schema: schema.schema_ref().to_string(),
                        violations: violations.clone(),
                    });
                    feedback = violations;
                    continue;
                }
            };

            // A cancelled run never stores its reply. Rejected replies are
            // checked again at RETRY_DECISION.
            if cancel.is_cancelled() {
                self.push_record(
                    &mut state,
                    kind,
                    AttemptPhase::Cancelled,
                    temperature,
                    response.transport_calls,
                    attempt_usage,
                    attempt_started,
                    Vec::new(),
                    None,
                );
                tracing::info!(
                    task_id = %task.task_id,
                    attempts = state.attempt,
                    "Run cancelled before storing"
                );
                return state.fail(ErrorKind::Cancelled, None);
            }

            // STORING
            let provenance = Provenance {
                task_id: task.task_id.clone(),
                attempt_count: state.attempt,
                transport_calls: state.calls_used,
                model_params: task.model_params.clone(),
                prompt_fingerprint: fingerprint,
                usage: state.usage,
                parent: task.parent,
            };
            return match self.store.put(content, provenance).await {
                Ok(artifact) => {
                    self.push_record(
                        &mut state,
                        kind,
                        AttemptPhase::Accepted,
                        temperature,
                        response.transport_calls,
                        attempt_usage,
                        attempt_started,
                        Vec::new(),
                        None,
                    );
                    self.metrics.record_artifact_stored(kind);
                    tracing::info!(
                        task_id = %task.task_id,
                        kind,
                        artifact_id = %artifact.id,
                        attempts = state.attempt,
                        transport_calls = state.calls_used,
                        tokens = state.usage.total(),
                        cost_cents = state.cost_micros as f64 / 10_000.0,
                        "Artifact stored"
                    );
                    PipelineResult::Success(artifact)
                }
                Err(e) => {
                    self.push_record(
                        &mut state,
                        kind,
                        AttemptPhase::StoreFailure,
                        temperature,
                        response.transport_calls,
                        attempt_usage,
                        attempt_started,
                        Vec::new(),
                        Some(e.to_string()),
                    );
                    tracing::error!(
                        task_id = %task.task_id,
                        kind,
                        error = %e,
                        "Failed to store artifact"
                    );
                    state.fail(
                        ErrorKind::StoreFailure,
                        Some(FailureCause::Store {
                            message: e.to_string(),
                        }),
                    )
                }
            };
        }
    }

    /// Payload for attempt `attempt` (1-based). Retries cool the temperature
    /// by `temperature_step` per attempt and, when enabled, list the previous
    /// violations.
    fn attempt_payload(
        &self,
        base: &PromptPayload,
        attempt: u32,
        feedback: &[FieldViolation],
    ) -> PromptPayload {
        if attempt <= 1 {
            return base.clone();
        }
        let cooled = base.model_params.temperature
            - self.config.temperature_step * f64::from(attempt - 1);
        let payload = base.with_temperature(cooled.max(0.0));
        if self.config.validation_feedback {
            payload.with_feedback(feedback)
        } else {
            payload
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push_record(
        &self,
        state: &mut RunState,
        kind: &str,
        phase: AttemptPhase,
        temperature: f64,
        transport_calls: u32,
        usage: TokenUsage,
        started: Instant,
        violations: Vec<FieldViolation>,
        error: Option<String>,
    ) {
        self.metrics.record_attempt(kind, phase.as_str());
        state.history.push(AttemptRecord {
            attempt: state.attempt,
            phase,
            temperature,
            transport_calls,
            usage,
            latency_ms: started.elapsed().as_millis() as u64,
            violations,
            error,
        });
    }
}
