//! Pipeline configuration.
//!
//! Everything the orchestrator and the model client need is passed in
//! explicitly through [`PipelineConfig`]; nothing reads the environment
//! after startup.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::llm::providers::openrouter::OPENROUTER_BASE_URL;
use crate::llm::{ModelPricing, RetryPolicy};
use crate::pipeline::task::DEFAULT_MODEL;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the pipeline orchestrator and its model client.
#[derive(Clone)]
pub struct PipelineConfig {
    // Remote API
    /// Model used when a task does not name one.
    pub default_model: String,
    /// Base URL of the OpenAI-compatible chat completions API.
    pub api_base: String,
    pub api_key: Option<String>,
    /// Timeout for a single remote call.
    pub attempt_timeout: Duration,
    /// Backoff for retryable transport failures.
    pub retry: RetryPolicy,

    // Validation retries
    /// Pipeline attempts allowed when output fails validation.
    pub max_validation_attempts: u32,
    /// Ceiling on remote calls per run across all attempts.
    pub max_total_calls: u32,
    /// Temperature reduction applied per validation retry.
    pub temperature_step: f64,
    /// Whether retry prompts list the previous attempt's violations.
    pub validation_feedback: bool,

    // Execution
    pub max_concurrent_tasks: usize,

    // Storage
    pub artifact_path: PathBuf,

    // Cost
    pub pricing: ModelPricing,
    /// Maximum daily spending limit in dollars.
    pub daily_budget: f64,
    /// Maximum monthly spending limit in dollars.
    pub monthly_budget: f64,
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("default_model", &self.default_model)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("attempt_timeout", &self.attempt_timeout)
            .field("retry", &self.retry)
            .field("max_validation_attempts", &self.max_validation_attempts)
            .field("max_total_calls", &self.max_total_calls)
            .field("temperature_step", &self.temperature_step)
            .field("validation_feedback", &self.validation_feedback)
            .field("max_concurrent_tasks", &self.max_concurrent_tasks)
            .field("artifact_path", &self.artifact_path)
            .field("pricing", &self.pricing)
            .field("daily_budget", &self.daily_budget)
            .field("monthly_budget", &self.monthly_budget)
            .finish()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            api_base: OPENROUTER_BASE_URL.to_string(),
            api_key: None,
            attempt_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),

            max_validation_attempts: 3,
            max_total_calls: 8,
            temperature_step: 0.2,
            validation_feedback: true,

            max_concurrent_tasks: 4,

            artifact_path: PathBuf::from("./out/artifacts"),

            pricing: ModelPricing::default(),
            daily_budget: 100.0,
            monthly_budget: 1000.0,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CONTENT_FORGE_MODEL`: Default model (default: openai/gpt-4.1)
    /// - `CONTENT_FORGE_API_BASE`: API base URL (default: OpenRouter)
    /// - `CONTENT_FORGE_API_KEY`: API key, falling back to `OPENROUTER_API_KEY`
    /// - `CONTENT_FORGE_TIMEOUT_SECS`: Per-call timeout (default: 120)
    /// - `CONTENT_FORGE_RETRY_MAX_ATTEMPTS`: Transport attempts per call (default: 3)
    /// - `CONTENT_FORGE_RETRY_BASE_DELAY_MS`: First backoff delay (default: 1000)
    /// - `CONTENT_FORGE_RETRY_MAX_DELAY_MS`: Backoff cap (default: 30000)
    /// - `CONTENT_FORGE_RETRY_MULTIPLIER`: Backoff growth factor (default: 2.0)
    /// - `CONTENT_FORGE_RETRY_JITTER`: Relative jitter (default: 0.2)
    /// - `CONTENT_FORGE_MAX_VALIDATION_ATTEMPTS`: Validation attempts (default: 3)
    /// - `CONTENT_FORGE_MAX_TOTAL_CALLS`: Remote calls per run (default: 8)
    /// - `CONTENT_FORGE_TEMPERATURE_STEP`: Cooling per retry (default: 0.2)
    /// - `CONTENT_FORGE_VALIDATION_FEEDBACK`: Feed violations back (default: true)
    /// - `CONTENT_FORGE_MAX_CONCURRENT`: Concurrent runs in a batch (default: 4)
    /// - `CONTENT_FORGE_STORE_PATH`: Artifact directory (default: ./out/artifacts)
    /// - `CONTENT_FORGE_PRICE_INPUT_PER_1M`: Input price in dollars (default: 2.0)
    /// - `CONTENT_FORGE_PRICE_OUTPUT_PER_1M`: Output price in dollars (default: 8.0)
    /// - `CONTENT_FORGE_DAILY_BUDGET`: Daily budget in dollars (default: 100.0)
    /// - `CONTENT_FORGE_MONTHLY_BUDGET`: Monthly budget in dollars (default: 1000.0)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("CONTENT_FORGE_MODEL") {
            config.default_model = val;
        }
        if let Some(val) = lookup("CONTENT_FORGE_API_BASE") {
            config.api_base = val;
        }
        let non_blank = |key: &String| !key.trim().is_empty();
        config.api_key = lookup("CONTENT_FORGE_API_KEY")
            .filter(non_blank)
            .or_else(|| lookup("OPENROUTER_API_KEY").filter(non_blank));
        if let Some(val) = lookup("CONTENT_FORGE_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "CONTENT_FORGE_TIMEOUT_SECS")?;
            config.attempt_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("CONTENT_FORGE_RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = parse_env_value(&val, "CONTENT_FORGE_RETRY_MAX_ATTEMPTS")?;
        }
        if let Some(val) = lookup("CONTENT_FORGE_RETRY_BASE_DELAY_MS") {
            let ms: u64 = parse_env_value(&val, "CONTENT_FORGE_RETRY_BASE_DELAY_MS")?;
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(val) = lookup("CONTENT_FORGE_RETRY_MAX_DELAY_MS") {
            let ms: u64 = parse_env_value(&val, "CONTENT_FORGE_RETRY_MAX_DELAY_MS")?;
            config.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(val) = lookup("CONTENT_FORGE_RETRY_MULTIPLIER") {
            config.retry.multiplier = parse_env_value(&val, "CONTENT_FORGE_RETRY_MULTIPLIER")?;
        }
        if let Some(val) = lookup("CONTENT_FORGE_RETRY_JITTER") {
            config.retry.jitter = parse_env_value(&val, "CONTENT_FORGE_RETRY_JITTER")?;
        }

        if let Some(val) = lookup("CONTENT_FORGE_MAX_VALIDATION_ATTEMPTS") {
            config.max_validation_attempts =
                parse_env_value(&val, "CONTENT_FORGE_MAX_VALIDATION_ATTEMPTS")?;
        }
        if let Some(val) = lookup("CONTENT_FORGE_MAX_TOTAL_CALLS") {
            config.max_total_calls = parse_env_value(&val, "CONTENT_FORGE_MAX_TOTAL_CALLS")?;
        }
        if let Some(val) = lookup("CONTENT_FORGE_TEMPERATURE_STEP") {
            config.temperature_step = parse_env_value(&val, "CONTENT_FORGE_TEMPERATURE_STEP")?;
        }
        if let Some(val) = lookup("CONTENT_FORGE_VALIDATION_FEEDBACK") {
            config.validation_feedback = parse_env_bool(&val, "CONTENT_FORGE_VALIDATION_FEEDBACK")?;
        }

        if let Some(val) = lookup("CONTENT_FORGE_MAX_CONCURRENT") {
            config.max_concurrent_tasks = parse_env_value(&val, "CONTENT_FORGE_MAX_CONCURRENT")?;
        }
        if let Some(val) = lookup("CONTENT_FORGE_STORE_PATH") {
            config.artifact_path = PathBuf::from(val);
        }

        if let Some(val) = lookup("CONTENT_FORGE_PRICE_INPUT_PER_1M") {
            config.pricing.input_per_1m =
                parse_env_value(&val, "CONTENT_FORGE_PRICE_INPUT_PER_1M")?;
        }
        if let Some(val) = lookup("CONTENT_FORGE_PRICE_OUTPUT_PER_1M") {
            config.pricing.output_per_1m =
                parse_env_value(&val, "CONTENT_FORGE_PRICE_OUTPUT_PER_1M")?;
        }
        if let Some(val) = lookup("CONTENT_FORGE_DAILY_BUDGET") {
            config.daily_budget = parse_env_value(&val, "CONTENT_FORGE_DAILY_BUDGET")?;
        }
        if let Some(val) = lookup("CONTENT_FORGE_MONTHLY_BUDGET") {
            config.monthly_budget = parse_env_value(&val, "CONTENT_FORGE_MONTHLY_BUDGET")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Returns the API key or `MissingEnvVar` when none is configured.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("CONTENT_FORGE_API_KEY".to_string()))
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "default_model cannot be empty".to_string(),
            ));
        }

        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err(ConfigError::ValidationFailed(format!(
                "api_base must be an http(s) URL, got '{}'",
                self.api_base
            )));
        }

        if self.attempt_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "attempt_timeout must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "retry max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.retry.base_delay > self.retry.max_delay {
            return Err(ConfigError::ValidationFailed(
                "retry base_delay cannot exceed max_delay".to_string(),
            ));
        }

        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::ValidationFailed(
                "retry multiplier must be at least 1.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(ConfigError::ValidationFailed(
                "retry jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.max_validation_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_validation_attempts must be greater than 0".to_string(),
            ));
        }

        if self.max_total_calls < self.max_validation_attempts {
            return Err(ConfigError::ValidationFailed(
                "max_total_calls cannot be lower than max_validation_attempts".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature_step) {
            return Err(ConfigError::ValidationFailed(
                "temperature_step must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_concurrent_tasks must be greater than 0".to_string(),
            ));
        }

        if self.pricing.input_per_1m < 0.0 || self.pricing.output_per_1m < 0.0 {
            return Err(ConfigError::ValidationFailed(
                "pricing cannot be negative".to_string(),
            ));
        }

        if self.daily_budget < 0.0 {
            return Err(ConfigError::ValidationFailed(
                "daily_budget cannot be negative".to_string(),
            ));
        }

        if self.monthly_budget < 0.0 {
            return Err(ConfigError::ValidationFailed(
                "monthly_budget cannot be negative".to_string(),
            ));
        }

        if self.daily_budget > self.monthly_budget {
            return Err(ConfigError::ValidationFailed(
                "daily_budget cannot exceed monthly_budget".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_validation_attempts(mut self, attempts: u32) -> Self {
        self.max_validation_attempts = attempts;
        self
    }

    pub fn with_max_total_calls(mut self, calls: u32) -> Self {
        self.max_total_calls = calls;
        self
    }

    pub fn with_temperature_step(mut self, step: f64) -> Self {
        self.temperature_step = step;
        self
    }

    pub fn with_validation_feedback(mut self, enabled: bool) -> Self {
        self.validation_feedback = enabled;
        self
    }

    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    pub fn with_artifact_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact_path = path.into();
        self
    }

    pub fn with_pricing(mut self, pricing: ModelPricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_daily_budget(mut self, budget: f64) -> Self {
        self.daily_budget = budget;
        self
    }

    pub fn with_monthly_budget(mut self, budget: f64) -> Self {
        self.monthly_budget = budget;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.default_model, "openai/gpt-4.1");
        assert_eq!(config.attempt_timeout, Duration::from_secs(120));
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.max_validation_attempts, 3);
        assert_eq!(config.max_total_calls, 8);
        assert!((config.temperature_step - 0.2).abs() < f64::EPSILON);
        assert!(config.validation_feedback);
        assert_eq!(config.max_concurrent_tasks, 4);
        assert_eq!(config.artifact_path, PathBuf::from("./out/artifacts"));
        assert!(config.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_default_model("anthropic/claude-sonnet-4")
            .with_api_key("sk-test")
            .with_attempt_timeout(Duration::from_secs(30))
            .with_retry_policy(RetryPolicy::no_retry())
            .with_max_validation_attempts(5)
            .with_max_total_calls(10)
            .with_temperature_step(0.1)
            .with_validation_feedback(false)
            .with_max_concurrent_tasks(2)
            .with_artifact_path("/tmp/artifacts");

        assert_eq!(config.default_model, "anthropic/claude-sonnet-4");
        assert_eq!(config.require_api_key().unwrap(), "sk-test");
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.max_validation_attempts, 5);
        assert!(!config.validation_feedback);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_masks_api_key() {
        let config = PipelineConfig::new().with_api_key("sk-very-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("CONTENT_FORGE_MODEL", "openai/gpt-4o-mini"),
            ("CONTENT_FORGE_API_KEY", "sk-env"),
            ("CONTENT_FORGE_TIMEOUT_SECS", "45"),
            ("CONTENT_FORGE_RETRY_MAX_ATTEMPTS", "5"),
            ("CONTENT_FORGE_RETRY_BASE_DELAY_MS", "250"),
            ("CONTENT_FORGE_MAX_VALIDATION_ATTEMPTS", "4"),
            ("CONTENT_FORGE_MAX_TOTAL_CALLS", "12"),
            ("CONTENT_FORGE_VALIDATION_FEEDBACK", "off"),
            ("CONTENT_FORGE_STORE_PATH", "/data/artifacts"),
            ("CONTENT_FORGE_PRICE_INPUT_PER_1M", "0.15"),
            ("CONTENT_FORGE_DAILY_BUDGET", "5"),
        ]))
        .unwrap();

        assert_eq!(config.default_model, "openai/gpt-4o-mini");
        assert_eq!(config.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.attempt_timeout, Duration::from_secs(45));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.max_validation_attempts, 4);
        assert_eq!(config.max_total_calls, 12);
        assert!(!config.validation_feedback);
        assert_eq!(config.artifact_path, PathBuf::from("/data/artifacts"));
        assert!((config.pricing.input_per_1m - 0.15).abs() < f64::EPSILON);
        assert!((config.daily_budget - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_lookup_falls_back_to_openrouter_key() {
        let config =
            PipelineConfig::from_lookup(lookup_from(&[("OPENROUTER_API_KEY", "sk-or")])).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-or"));

        let config =
            PipelineConfig::from_lookup(lookup_from(&[("CONTENT_FORGE_API_KEY", "  ")])).unwrap();
        assert!(config.api_key.is_none());
        assert!(matches!(
            config.require_api_key(),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn test_blank_primary_key_falls_back_to_openrouter_key() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("CONTENT_FORGE_API_KEY", ""),
            ("OPENROUTER_API_KEY", "sk-or-real"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-or-real"));

        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("CONTENT_FORGE_API_KEY", "sk-primary"),
            ("OPENROUTER_API_KEY", "sk-or-real"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-primary"));
    }

    #[test]
    fn test_from_lookup_invalid_value() {
        let err = PipelineConfig::from_lookup(lookup_from(&[(
            "CONTENT_FORGE_MAX_TOTAL_CALLS",
            "many",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("CONTENT_FORGE_MAX_TOTAL_CALLS"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            (PipelineConfig::default().with_default_model(" "), "default_model"),
            (PipelineConfig::default().with_api_base("ftp://x"), "api_base"),
            (
                PipelineConfig::default().with_attempt_timeout(Duration::ZERO),
                "attempt_timeout",
            ),
            (
                PipelineConfig::default().with_max_validation_attempts(0),
                "max_validation_attempts",
            ),
            (
                PipelineConfig::default()
                    .with_max_validation_attempts(5)
                    .with_max_total_calls(3),
                "max_total_calls",
            ),
            (
                PipelineConfig::default().with_temperature_step(3.0),
                "temperature_step",
            ),
            (
                PipelineConfig::default().with_max_concurrent_tasks(0),
                "max_concurrent_tasks",
            ),
            (
                PipelineConfig::default().with_daily_budget(-1.0),
                "daily_budget",
            ),
            (
                PipelineConfig::default()
                    .with_daily_budget(500.0)
                    .with_monthly_budget(100.0),
                "daily_budget cannot exceed",
            ),
        ];
        for (config, needle) in cases {
            let err = config.validate().unwrap_err();
            assert!(
                err.to_string().contains(needle),
                "expected '{}' in '{}'",
                needle,
                err
            );
        }
    }

    #[test]
    fn test_validation_rejects_bad_retry_policy() {
        let mut config = PipelineConfig::default();
        config.retry.base_delay = Duration::from_secs(60);
        assert!(config.validate().unwrap_err().to_string().contains("base_delay"));

        let mut config = PipelineConfig::default();
        config.retry.jitter = 1.5;
        assert!(config.validate().unwrap_err().to_string().contains("jitter"));
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "test").unwrap());
        assert!(parse_env_bool("YES", "test").unwrap());
        assert!(!parse_env_bool("0", "test").unwrap());
        assert!(!parse_env_bool("off", "test").unwrap());
        assert!(parse_env_bool("maybe", "test").is_err());
    }
}
