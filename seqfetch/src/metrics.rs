//! Prometheus metrics for the fetch scheduler.
//!
//! Compiled only with the `metrics` feature.
//!
//! ## Counters
//! - `seqfetch_tasks_enqueued_total` - tasks accepted by the queue
//! - `seqfetch_tasks_finished_total` - tasks run to completion or failure
//! - `seqfetch_children_total` - child tasks synthesized by fan-out
//!
//! ## Gauges
//! - `seqfetch_queue_depth` - pending tasks
//!
//! ## Histograms
//! - `seqfetch_task_duration_seconds` - task execution time
#![cfg(feature = "metrics")]

use prometheus::{
    Counter, CounterVec, Gauge, HistogramVec, Opts, Registry, exponential_buckets,
};
use std::sync::LazyLock;

/// Global Prometheus registry for seqfetch metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Labels: `policy`.
pub static TASKS_ENQUEUED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "seqfetch_tasks_enqueued_total",
        "Total number of fetch tasks enqueued",
    );
    CounterVec::new(opts, &["policy"])
        .expect("seqfetch_tasks_enqueued_total metric creation failed")
});

/// Labels: `policy`, `status` (completed, failed).
pub static TASKS_FINISHED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "seqfetch_tasks_finished_total",
        "Total number of fetch tasks finished",
    );
    CounterVec::new(opts, &["policy", "status"])
        .expect("seqfetch_tasks_finished_total metric creation failed")
});

pub static CHILDREN_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    Counter::new(
        "seqfetch_children_total",
        "Total number of child fetch tasks synthesized",
    )
    .expect("seqfetch_children_total metric creation failed")
});

pub static QUEUE_DEPTH: LazyLock<Gauge> = LazyLock::new(|| {
    Gauge::new("seqfetch_queue_depth", "Current number of pending fetch tasks")
        .expect("seqfetch_queue_depth metric creation failed")
});

/// Labels: `status`.
pub static TASK_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let buckets = exponential_buckets(0.001, 2.0, 15).expect("bucket creation failed");
    let opts = prometheus::HistogramOpts::new(
        "seqfetch_task_duration_seconds",
        "Fetch task execution duration in seconds",
    )
    .buckets(buckets);
    HistogramVec::new(opts, &["status"])
        .expect("seqfetch_task_duration_seconds metric creation failed")
});

/// Register every collector with [`REGISTRY`]. Safe to call repeatedly.
pub fn init_metrics() -> anyhow::Result<()> {
    let registry = &*REGISTRY;

    for metric in [
        Box::new(TASKS_ENQUEUED_TOTAL.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(TASKS_FINISHED_TOTAL.clone()),
        Box::new(CHILDREN_TOTAL.clone()),
        Box::new(QUEUE_DEPTH.clone()),
        Box::new(TASK_DURATION_SECONDS.clone()),
    ] {
        if let Err(e) = registry.register(metric) {
            let msg = e.to_string();
            if !msg.contains("Duplicate metrics collector registration attempted") {
                return Err(e.into());
            }
        }
    }

    Ok(())
}

pub fn record_task_enqueued(policy: &str) {
    TASKS_ENQUEUED_TOTAL.with_label_values(&[policy]).inc();
}

pub fn record_task_finished(policy: &str, status: &str) {
    TASKS_FINISHED_TOTAL
        .with_label_values(&[policy, status])
        .inc();
}

pub fn record_children(count: usize) {
    CHILDREN_TOTAL.inc_by(count as f64);
}

pub fn set_queue_depth(depth: f64) {
    QUEUE_DEPTH.set(depth);
}

pub fn observe_task_duration(status: &str, duration_secs: f64) {
    TASK_DURATION_SECONDS
        .with_label_values(&[status])
        .observe(duration_secs);
}

/// Gather all registered metrics in Prometheus text format.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .map_err(Into::into)
}
