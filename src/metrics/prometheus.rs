//! Prometheus metrics registration and export.
//!
//! All metrics live in a process-wide registry created by [`init_metrics`].
//! Recording before initialization is a no-op.

use prometheus::{CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all content_forge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Pipeline runs, labeled by task kind and terminal outcome.
pub static PIPELINE_RUNS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Wall-clock duration of pipeline runs in seconds, labeled by task kind.
pub static PIPELINE_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Pipeline attempts, labeled by task kind and the phase that ended them.
pub static PIPELINE_ATTEMPTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Runs currently executing.
pub static RUNS_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

/// Remote calls, labeled by provider, model and status.
pub static LLM_REQUESTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Remote call latency in seconds, labeled by model.
pub static LLM_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Tokens consumed, labeled by model and type (input/output).
pub static LLM_TOKENS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Attributed spend in dollars, labeled by model.
pub static LLM_COST_USD: OnceLock<CounterVec> = OnceLock::new();

/// Artifacts accepted into the store, labeled by task kind.
pub static ARTIFACTS_STORED_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Initialize all metrics and register them with the global registry.
///
/// Calling this more than once is harmless: later calls leave the first
/// set of metrics in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if a metric definition is invalid.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let pipeline_runs_total = CounterVec::new(
        Opts::new("content_forge_pipeline_runs_total", "Total pipeline runs"),
        &["kind", "outcome"],
    )?;
    let pipeline_duration = HistogramVec::new(
        HistogramOpts::new(
            "content_forge_pipeline_duration_seconds",
            "Pipeline run duration in seconds",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["kind"],
    )?;
    let pipeline_attempts_total = CounterVec::new(
        Opts::new(
            "content_forge_pipeline_attempts_total",
            "Pipeline attempts by the phase that concluded them",
        ),
        &["kind", "phase"],
    )?;
    let runs_in_progress = Gauge::new(
        "content_forge_runs_in_progress",
        "Number of pipeline runs currently executing",
    )?;

    let llm_requests_total = CounterVec::new(
        Opts::new("content_forge_llm_requests_total", "Total LLM API requests"),
        &["provider", "model", "status"],
    )?;
    let llm_latency = HistogramVec::new(
        HistogramOpts::new(
            "content_forge_llm_latency_seconds",
            "LLM API request latency in seconds",
        )
        .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["model"],
    )?;
    let llm_tokens_total = CounterVec::new(
        Opts::new("content_forge_llm_tokens_total", "Total tokens used"),
        &["model", "type"],
    )?;
    let llm_cost_usd = CounterVec::new(
        Opts::new("content_forge_llm_cost_usd_total", "Attributed LLM spend in dollars"),
        &["model"],
    )?;

    let artifacts_stored_total = CounterVec::new(
        Opts::new(
            "content_forge_artifacts_stored_total",
            "Artifacts accepted into the store",
        ),
        &["kind"],
    )?;

    registry.register(Box::new(pipeline_runs_total.clone()))?;
    registry.register(Box::new(pipeline_duration.clone()))?;
    registry.register(Box::new(pipeline_attempts_total.clone()))?;
    registry.register(Box::new(runs_in_progress.clone()))?;
    registry.register(Box::new(llm_requests_total.clone()))?;
    registry.register(Box::new(llm_latency.clone()))?;
    registry.register(Box::new(llm_tokens_total.clone()))?;
    registry.register(Box::new(llm_cost_usd.clone()))?;
    registry.register(Box::new(artifacts_stored_total.clone()))?;

    // A concurrent initializer may win the race; its metrics stay in place.
    let _ = REGISTRY.set(registry);
    let _ = PIPELINE_RUNS_TOTAL.set(pipeline_runs_total);
    let _ = PIPELINE_DURATION.set(pipeline_duration);
    let _ = PIPELINE_ATTEMPTS_TOTAL.set(pipeline_attempts_total);
    let _ = RUNS_IN_PROGRESS.set(runs_in_progress);
    let _ = LLM_REQUESTS_TOTAL.set(llm_requests_total);
    let _ = LLM_LATENCY.set(llm_latency);
    let _ = LLM_TOKENS_TOTAL.set(llm_tokens_total);
    let _ = LLM_COST_USD.set(llm_cost_usd);
    let _ = ARTIFACTS_STORED_TOTAL.set(artifacts_stored_total);

    tracing::debug!("Prometheus metrics initialized");
    Ok(())
}

/// Export all registered metrics in Prometheus text format.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
