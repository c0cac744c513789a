//! Tracing and telemetry instrumentation for seqfetch.
//!
//! Span constructors and record helpers used by the scheduler and its
//! workers. Every helper logs through `tracing`; with the `metrics` feature
//! enabled it also updates the Prometheus collectors in [`crate::metrics`].

use std::future::Future;
use std::time::Instant;

use tracing::{Instrument, Span, info_span};

/// Span covering one fetch task on a worker.
#[must_use]
pub fn fetch_task_span(
    worker_id: impl AsRef<str>,
    seq_id: impl AsRef<str>,
    priority: u8,
) -> Span {
    info_span!(
        "seqfetch.task",
        worker_id = %worker_id.as_ref(),
        seq_id = %seq_id.as_ref(),
        priority = priority,
    )
}

/// Span covering an `add` call.
#[must_use]
pub fn enqueue_span(seq_id: impl AsRef<str>, policy: impl AsRef<str>, priority: u8) -> Span {
    info_span!(
        "seqfetch.enqueue",
        seq_id = %seq_id.as_ref(),
        policy = %policy.as_ref(),
        priority = priority,
    )
}

/// Span covering `clear` or `finish`.
#[must_use]
pub fn shutdown_span(mode: &'static str, workers: usize) -> Span {
    info_span!("seqfetch.shutdown", mode = mode, workers = workers)
}

/// Instrument a future with a fetch task span.
pub fn instrument_task<F>(
    worker_id: impl AsRef<str>,
    seq_id: impl AsRef<str>,
    priority: u8,
    future: F,
) -> impl Future<Output = F::Output>
where
    F: Future,
{
    future.instrument(fetch_task_span(worker_id, seq_id, priority))
}

pub fn record_task_enqueued(policy: impl AsRef<str>) {
    tracing::trace!(policy = %policy.as_ref(), "fetch task enqueued");

    #[cfg(feature = "metrics")]
    crate::metrics::record_task_enqueued(policy.as_ref());
}

/// Record a task outcome; `status` is `completed` or `failed`.
pub fn record_task_finished(policy: impl AsRef<str>, status: impl AsRef<str>) {
    tracing::trace!(
        policy = %policy.as_ref(),
        status = %status.as_ref(),
        "fetch task finished"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_task_finished(policy.as_ref(), status.as_ref());
}

pub fn record_children(count: usize) {
    #[cfg(feature = "metrics")]
    crate::metrics::record_children(count);

    #[cfg(not(feature = "metrics"))]
    let _ = count;
}

pub fn set_queue_depth(depth: usize) {
    tracing::trace!(depth = depth, "queue depth updated");

    #[cfg(feature = "metrics")]
    crate::metrics::set_queue_depth(depth as f64);
}

/// Start timing a task.
pub fn record_task_start(seq_id: impl AsRef<str>) -> TaskTimingHandle {
    TaskTimingHandle {
        seq_id: seq_id.as_ref().to_string(),
        start: Instant::now(),
    }
}

/// Finish timing a task and observe its duration.
pub fn record_task_end(handle: TaskTimingHandle, status: impl AsRef<str>) {
    let duration_secs = handle.start.elapsed().as_secs_f64();
    tracing::debug!(
        seq_id = %handle.seq_id,
        status = %status.as_ref(),
        duration_secs = duration_secs,
        "fetch task duration observed"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::observe_task_duration(status.as_ref(), duration_secs);
}

/// Opaque handle returned by [`record_task_start`].
#[derive(Debug)]
pub struct TaskTimingHandle {
    seq_id: String,
    start: Instant,
}

impl TaskTimingHandle {
    #[must_use]
    pub fn seq_id(&self) -> &str {
        &self.seq_id
    }

    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
