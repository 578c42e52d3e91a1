//! Authorization metrics recorded through the `metrics` facade.
//!
//! No exporter is bundled. Without an installed recorder every call here is a
//! no-op; embedding applications install whichever recorder they already use.
//!
//! # Example
//!
//! ```rust,no_run
//! use flowguard_core::telemetry::metrics::{DecisionMetrics, LifecycleMetrics};
//!
//! DecisionMetrics::record("Task", "READ", true);
//! LifecycleMetrics::record("create", 1);
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::sync::Once;
use std::time::Instant;

static DESCRIBE: Once = Once::new();

/// Register metric descriptions with the installed recorder.
///
/// Call after installing a recorder; repeated calls are ignored.
pub fn describe_metrics() {
    DESCRIBE.call_once(|| {
        describe_counter!(
            "flowguard_decisions_total",
            "Authorization decisions by resource type, permission and outcome"
        );
        describe_counter!(
            "flowguard_denials_total",
            "Authorization checks that surfaced as access-denied errors"
        );
        describe_counter!(
            "flowguard_lifecycle_mutations_total",
            "Authorization entry mutations staged by lifecycle events"
        );
        describe_counter!("flowguard_errors_total", "Errors raised by the authorization core");
        describe_histogram!(
            "flowguard_evaluation_duration_seconds",
            "Time spent evaluating one requirement, including the store round trip"
        );
    });
}

/// Counters for evaluation outcomes.
pub struct DecisionMetrics;

impl DecisionMetrics {
    pub fn record(resource_type: &str, permission: &str, granted: bool) {
        counter!(
            "flowguard_decisions_total",
            "resource_type" => resource_type.to_string(),
            "permission" => permission.to_string(),
            "decision" => if granted { "granted" } else { "denied" },
        )
        .increment(1);
    }

    pub fn record_denial() {
        counter!("flowguard_denials_total").increment(1);
    }
}

/// Counter for lifecycle-driven entry mutations.
pub struct LifecycleMetrics;

impl LifecycleMetrics {
    pub fn record(kind: &'static str, count: u64) {
        counter!("flowguard_lifecycle_mutations_total", "kind" => kind).increment(count);
    }
}

/// Records the elapsed evaluation time when dropped.
#[derive(Debug)]
pub struct EvaluationTimer {
    start: Instant,
}

impl EvaluationTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Drop for EvaluationTimer {
    fn drop(&mut self) {
        histogram!("flowguard_evaluation_duration_seconds")
            .record(self.start.elapsed().as_secs_f64());
    }
}
