//! High-level recording interface over the raw Prometheus metrics.

use super::prometheus::{
    ARTIFACTS_STORED_TOTAL, LLM_COST_USD, LLM_LATENCY, LLM_REQUESTS_TOTAL, LLM_TOKENS_TOTAL,
    PIPELINE_ATTEMPTS_TOTAL, PIPELINE_DURATION, PIPELINE_RUNS_TOTAL, RUNS_IN_PROGRESS,
};
use crate::llm::Usage;

/// Records pipeline and LLM metrics with consistent labels.
///
/// Every method is a no-op until `init_metrics()` has run, so library code
/// can record unconditionally.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record a finished pipeline run.
    pub fn record_pipeline_run(&self, kind: &str, outcome: &str, duration_secs: f64) {
        if let Some(runs) = PIPELINE_RUNS_TOTAL.get() {
            runs.with_label_values(&[kind, outcome]).inc();
        }
        if let Some(duration) = PIPELINE_DURATION.get() {
            duration.with_label_values(&[kind]).observe(duration_secs);
        }
        tracing::trace!(
            kind = kind,
            outcome = outcome,
            duration_secs = duration_secs,
            "Recorded pipeline run metric"
        );
    }

    /// Record one pipeline attempt and the phase that concluded it
    /// (`accepted`, `schema_violation`, `transport_error`, ...).
    pub fn record_attempt(&self, kind: &str, phase: &str) {
        if let Some(attempts) = PIPELINE_ATTEMPTS_TOTAL.get() {
            attempts.with_label_values(&[kind, phase]).inc();
        }
    }

    /// Record one remote call, successful or not.
    pub fn record_llm_request(
        &self,
        provider: &str,
        model: &str,
        status: &str,
        latency_secs: f64,
        usage: &Usage,
        cost_usd: f64,
    ) {
        if let Some(requests) = LLM_REQUESTS_TOTAL.get() {
            requests.with_label_values(&[provider, model, status]).inc();
        }
        if let Some(latency) = LLM_LATENCY.get() {
            latency.with_label_values(&[model]).observe(latency_secs);
        }
        if let Some(tokens) = LLM_TOKENS_TOTAL.get() {
            tokens
                .with_label_values(&[model, "input"])
                .inc_by(usage.prompt_tokens as f64);
            tokens
                .with_label_values(&[model, "output"])
                .inc_by(usage.completion_tokens as f64);
        }
        if let Some(cost) = LLM_COST_USD.get() {
            cost.with_label_values(&[model]).inc_by(cost_usd.max(0.0));
        }
        tracing::trace!(
            provider = provider,
            model = model,
            status = status,
            latency_secs = latency_secs,
            "Recorded LLM request metric"
        );
    }

    pub fn record_artifact_stored(&self, kind: &str) {
        if let Some(stored) = ARTIFACTS_STORED_TOTAL.get() {
            stored.with_label_values(&[kind]).inc();
        }
    }

    pub fn inc_runs_in_progress(&self) {
        if let Some(gauge) = RUNS_IN_PROGRESS.get() {
            gauge.inc();
        }
    }

    pub fn dec_runs_in_progress(&self) {
        if let Some(gauge) = RUNS_IN_PROGRESS.get() {
            gauge.dec();
        }
    }
}
