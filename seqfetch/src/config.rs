use serde::{Deserialize, Serialize};

use crate::task::FetchPriority;

/// Configuration for a [`FetchQueue`](crate::runtime::FetchQueue).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchQueueConfig {
    /// Number of workers in the pool.
    pub workers: usize,
    /// Maximum number of pending tasks before `add` applies backpressure.
    pub capacity: usize,
    /// Priority used by the `add` overloads that take none.
    pub default_priority: FetchPriority,
    /// Buffered events per subscriber on the event bus.
    pub event_capacity: usize,
    /// Drop resubmissions of an identifier already queued with the same
    /// policy.
    pub dedupe: bool,
    /// Prefix for worker ids in logs and events.
    pub worker_prefix: String,
}

impl Default for FetchQueueConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            capacity: 1024,
            default_priority: FetchPriority::DEFAULT,
            event_capacity: 256,
            dedupe: false,
            worker_prefix: "seqfetch".to_string(),
        }
    }
}

impl FetchQueueConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_default_priority(mut self, priority: FetchPriority) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }

    pub fn with_worker_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.worker_prefix = prefix.into();
        self
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            anyhow::bail!("fetch queue needs at least one worker");
        }
        if self.capacity == 0 {
            anyhow::bail!("fetch queue capacity must be positive");
        }
        if self.event_capacity == 0 {
            anyhow::bail!("event capacity must be positive");
        }
        Ok(())
    }
}
