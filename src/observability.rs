//! Metrics collection using metrics-rs.
//!
//! The engine records a small set of counters and one histogram:
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `camshaft_ticks_processed` | Counter | Ticks driven by the event loop |
//! | `camshaft_task_executions` | Counter | Task `process` calls |
//! | `camshaft_tasks_skipped` | Counter | Entries skipped by stream or filter gates |
//! | `camshaft_context_transitions` | Counter | Re-initializations after a context boundary |
//! | `camshaft_tick_time_ns` | Histogram | Wall-clock time per tick |
//!
//! Metrics are recorded unconditionally; without an installed recorder the
//! calls are no-ops. Use any `metrics` exporter (prometheus, statsd, ...)
//! to collect them.

use metrics::Unit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Whether metric descriptions have been registered.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

// Metric names as constants for consistency
const TICKS_PROCESSED: &str = "camshaft_ticks_processed";
const TASK_EXECUTIONS: &str = "camshaft_task_executions";
const TASKS_SKIPPED: &str = "camshaft_tasks_skipped";
const CONTEXT_TRANSITIONS: &str = "camshaft_context_transitions";
const TICK_TIME_NS: &str = "camshaft_tick_time_ns";

/// Initialize metric descriptions.
///
/// Call once at application startup, after installing a recorder. Safe to
/// call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        TICKS_PROCESSED,
        Unit::Count,
        "Ticks driven by the event loop"
    );
    metrics::describe_counter!(TASK_EXECUTIONS, Unit::Count, "Task process calls");
    metrics::describe_counter!(
        TASKS_SKIPPED,
        Unit::Count,
        "Entries skipped by stream or filter gates"
    );
    metrics::describe_counter!(
        CONTEXT_TRANSITIONS,
        Unit::Count,
        "Re-initializations after a context boundary"
    );
    metrics::describe_histogram!(TICK_TIME_NS, Unit::Nanoseconds, "Wall-clock time per tick");
}

/// Record one completed tick and its duration.
pub fn record_tick(elapsed: Duration) {
    metrics::counter!(TICKS_PROCESSED).increment(1);
    metrics::histogram!(TICK_TIME_NS).record(elapsed.as_nanos() as f64);
}

/// Record one task execution.
pub fn record_task_execution() {
    metrics::counter!(TASK_EXECUTIONS).increment(1);
}

/// Record an entry skipped by a stream or filter gate.
pub fn record_task_skipped() {
    metrics::counter!(TASKS_SKIPPED).increment(1);
}

/// Record a context transition (re-init sweep).
pub fn record_context_transition() {
    metrics::counter!(CONTEXT_TRANSITIONS).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_metrics();
        init_metrics();
    }

    #[test]
    fn test_recording_without_recorder_is_a_noop() {
        record_tick(Duration::from_micros(10));
        record_task_execution();
        record_task_skipped();
        record_context_transition();
    }
}
