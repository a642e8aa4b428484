//! Cost attribution and budget enforcement for remote model calls.
//!
//! Every transport attempt is recorded, including failed and retried ones
//! that still reported token usage. Amounts are tracked internally in
//! micro-dollars so that small prompts do not round down to zero.
//!
//! Only the most recent calls are kept as individual records; the period
//! totals are counters and stay exact however many calls are made.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::llm::Usage;

const MICROS_PER_DOLLAR: f64 = 1_000_000.0;

/// Individual usage records kept by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Price of a model per one million tokens, in dollars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_1m: f64,
    pub output_per_1m: f64,
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self {
            input_per_1m: 2.0,
            output_per_1m: 8.0,
        }
    }
}

impl ModelPricing {
    pub fn new(input_per_1m: f64, output_per_1m: f64) -> Self {
        Self {
            input_per_1m,
            output_per_1m,
        }
    }

    /// Cost of one call in micro-dollars.
    pub fn cost_micros(&self, usage: &Usage) -> u64 {
        // tokens / 1M * $/1M * 1M micro-dollars per dollar == tokens * $/1M
        let input = usage.prompt_tokens as f64 * self.input_per_1m;
        let output = usage.completion_tokens as f64 * self.output_per_1m;
        (input + output).round().max(0.0) as u64
    }
}

/// One attributed remote call.
#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_micros: u64,
    pub task_id: Option<String>,
}

/// Summary of spending against the configured budgets, in dollars.
#[derive(Debug, Clone, Serialize)]
pub struct CostReport {
    pub daily_spent: f64,
    pub daily_remaining: f64,
    pub monthly_spent: f64,
    pub monthly_remaining: f64,
    pub by_model: HashMap<String, f64>,
    /// Calls recorded this month.
    pub calls: u64,
    /// Tokens recorded this month.
    pub total_tokens: u64,
}

/// Thread-safe spending tracker with daily and monthly budgets.
pub struct CostTracker {
    daily_budget_micros: u64,
    monthly_budget_micros: u64,
    spent_today_micros: AtomicU64,
    spent_month_micros: AtomicU64,
    calls_month: AtomicU64,
    tokens_month: AtomicU64,
    cost_by_model: RwLock<HashMap<String, u64>>,
    usage_history: RwLock<VecDeque<UsageRecord>>,
    history_limit: usize,
    /// (ordinal day, month) the counters belong to.
    period: RwLock<(u32, u32)>,
}

impl CostTracker {
    /// Creates a tracker with budgets in dollars.
    pub fn new(daily_budget: f64, monthly_budget: f64) -> Self {
        let now = Utc::now();
        Self {
            daily_budget_micros: dollars_to_micros(daily_budget),
            monthly_budget_micros: dollars_to_micros(monthly_budget),
            spent_today_micros: AtomicU64::new(0),
            spent_month_micros: AtomicU64::new(0),
            calls_month: AtomicU64::new(0),
            tokens_month: AtomicU64::new(0),
            cost_by_model: RwLock::new(HashMap::new()),
            usage_history: RwLock::new(VecDeque::new()),
            history_limit: DEFAULT_HISTORY_LIMIT,
            period: RwLock::new((now.ordinal(), now.month())),
        }
    }

    /// A tracker whose budgets can never be exhausted.
    pub fn unlimited() -> Self {
        Self::new(f64::MAX / MICROS_PER_DOLLAR, f64::MAX / MICROS_PER_DOLLAR)
    }

    /// Keeps at most `limit` individual records; older ones are evicted.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Attributes one remote call and returns its cost in micro-dollars.
    pub fn record(
        &self,
        model: &str,
        usage: &Usage,
        pricing: &ModelPricing,
        task_id: Option<&str>,
    ) -> u64 {
        self.maybe_reset_counters();

        let cost_micros = pricing.cost_micros(usage);
        self.spent_today_micros.fetch_add(cost_micros, Ordering::SeqCst);
        self.spent_month_micros.fetch_add(cost_micros, Ordering::SeqCst);
        self.calls_month.fetch_add(1, Ordering::SeqCst);
        self.tokens_month.fetch_add(
            u64::from(usage.prompt_tokens) + u64::from(usage.completion_tokens),
            Ordering::SeqCst,
        );

        {
            let mut cost_by_model = self
                .cost_by_model
                .write()
                .expect("cost_by_model lock poisoned");
            *cost_by_model.entry(model.to_string()).or_insert(0) += cost_micros;
        }

        if self.history_limit > 0 {
            let mut history = self
                .usage_history
                .write()
                .expect("usage_history lock poisoned");
            while history.len() >= self.history_limit {
                history.pop_front();
            }
            history.push_back(UsageRecord {
                timestamp: Utc::now(),
                model: model.to_string(),
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                cost_micros,
                task_id: task_id.map(str::to_string),
            });
        }

        tracing::debug!(
            model = model,
            input_tokens = usage.prompt_tokens,
            output_tokens = usage.completion_tokens,
            cost_cents = micros_to_dollars(cost_micros) * 100.0,
            task_id = task_id.unwrap_or("-"),
            "Recorded LLM usage"
        );
        cost_micros
    }

    /// True when either the daily or the monthly budget is used up.
    pub fn is_over_budget(&self) -> bool {
        self.maybe_reset_counters();
        self.spent_today_micros.load(Ordering::SeqCst) >= self.daily_budget_micros
            || self.spent_month_micros.load(Ordering::SeqCst) >= self.monthly_budget_micros
    }

    pub fn daily_spent(&self) -> f64 {
        self.maybe_reset_counters();
        micros_to_dollars(self.spent_today_micros.load(Ordering::SeqCst))
    }

    pub fn monthly_spent(&self) -> f64 {
        self.maybe_reset_counters();
        micros_to_dollars(self.spent_month_micros.load(Ordering::SeqCst))
    }

    pub fn daily_budget(&self) -> f64 {
        micros_to_dollars(self.daily_budget_micros)
    }

    pub fn monthly_budget(&self) -> f64 {
        micros_to_dollars(self.monthly_budget_micros)
    }

    pub fn get_cost_report(&self) -> CostReport {
        self.maybe_reset_counters();

        let daily = self.spent_today_micros.load(Ordering::SeqCst);
        let monthly = self.spent_month_micros.load(Ordering::SeqCst);
        let by_model = self
            .cost_by_model
            .read()
            .expect("cost_by_model lock poisoned")
            .iter()
            .map(|(model, &micros)| (model.clone(), micros_to_dollars(micros)))
            .collect();
        CostReport {
            daily_spent: micros_to_dollars(daily),
            daily_remaining: micros_to_dollars(self.daily_budget_micros.saturating_sub(daily)),
            monthly_spent: micros_to_dollars(monthly),
            monthly_remaining: micros_to_dollars(
                self.monthly_budget_micros.saturating_sub(monthly),
            ),
            by_model,
            calls: self.calls_month.load(Ordering::SeqCst),
            total_tokens: self.tokens_month.load(Ordering::SeqCst),
        }
    }

    /// Most recent records, oldest first.
    pub fn usage_history(&self) -> Vec<UsageRecord> {
        self.usage_history
            .read()
            .expect("usage_history lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Retained records attributed to one task.
    pub fn usage_for_task(&self, task_id: &str) -> Vec<UsageRecord> {
        self.usage_history
            .read()
            .expect("usage_history lock poisoned")
            .iter()
            .filter(|r| r.task_id.as_deref() == Some(task_id))
            .cloned()
            .collect()
    }

    fn maybe_reset_counters(&self) {
        let now = Utc::now();
        let current = (now.ordinal(), now.month());
        let mut period = self.period.write().expect("period lock poisoned");
        if period.0 != current.0 {
            self.spent_today_micros.store(0, Ordering::SeqCst);
            tracing::info!("Daily cost counter reset");
        }
        if period.1 != current.1 {
            self.spent_month_micros.store(0, Ordering::SeqCst);
            self.calls_month.store(0, Ordering::SeqCst);
            self.tokens_month.store(0, Ordering::SeqCst);
            self.usage_history
                .write()
                .expect("usage_history lock poisoned")
                .clear();
            self.cost_by_model
                .write()
                .expect("cost_by_model lock poisoned")
                .clear();
            tracing::info!("Monthly cost counter reset");
        }
        *period = current;
    }
}

fn dollars_to_micros(dollars: f64) -> u64 {
    (dollars * MICROS_PER_DOLLAR).round().max(0.0) as u64
}

fn micros_to_dollars(micros: u64) -> f64 {
    micros as f64 / MICROS_PER_DOLLAR
}
