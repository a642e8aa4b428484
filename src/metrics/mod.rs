//! Prometheus metrics for pipeline runs, remote calls and stored artifacts.
//!
//! ```ignore
//! use content_forge::metrics::{export_metrics, init_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! MetricsCollector::new().record_pipeline_run("draft_generation", "success", 12.5);
//! println!("{}", export_metrics());
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};
