//! Telemetry: structured logging and authorization metrics.
//!
//! - **Logging**: JSON/pretty/compact `tracing` subscriber with per-module levels
//! - **Metrics**: decision, denial, lifecycle and error counters through the
//!   `metrics` facade
//!
//! # Example
//!
//! ```rust,no_run
//! use flowguard_core::telemetry::{init_telemetry, LoggingConfig};
//!
//! init_telemetry(&LoggingConfig::default()).expect("Failed to initialize telemetry");
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{describe_metrics, DecisionMetrics, EvaluationTimer, LifecycleMetrics};

/// Install the logging subscriber and describe the engine's metrics.
///
/// Call once at application startup, after installing a metrics recorder.
pub fn init_telemetry(logging: &LoggingConfig) -> anyhow::Result<()> {
    describe_metrics();
    init_logging(logging)
}
