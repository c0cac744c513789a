use std::fmt;
use std::sync::Arc;

use crate::config::FetchQueueConfig;
use crate::events::InProcEventBus;
use crate::store::SequenceDataStore;
use crate::task::FetchPriority;

use super::supervisor::FetchQueue;

/// Builder for a [`FetchQueue`] with explicit dependencies.
///
/// # Example
///
/// ```ignore
/// use seqfetch::*;
///
/// let queue = FetchQueueBuilder::new()
///     .with_workers(4)
///     .with_store(Arc::new(InMemoryDataStore::new()))
///     .build()?;
/// ```
pub struct FetchQueueBuilder {
    config: FetchQueueConfig,
    store: Option<Arc<dyn SequenceDataStore>>,
    events: Option<Arc<InProcEventBus>>,
}

impl fmt::Debug for FetchQueueBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchQueueBuilder")
            .field("config", &self.config)
            .field("store_set", &self.store.is_some())
            .field("events_set", &self.events.is_some())
            .finish()
    }
}

impl Default for FetchQueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchQueueBuilder {
    pub fn new() -> Self {
        Self {
            config: FetchQueueConfig::default(),
            store: None,
            events: None,
        }
    }

    pub fn with_config(mut self, config: FetchQueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn with_default_priority(mut self, priority: FetchPriority) -> Self {
        self.config.default_priority = priority;
        self
    }

    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.config.dedupe = dedupe;
        self
    }

    /// Set the data store the workers fetch from.
    pub fn with_store(mut self, store: Arc<dyn SequenceDataStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Publish onto a shared event bus instead of a private one.
    pub fn with_events(mut self, events: Arc<InProcEventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the queue and spawn its workers.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is missing, the configuration is
    /// invalid, or no tokio runtime is running.
    pub fn build(self) -> anyhow::Result<FetchQueue> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("store dependency missing"))?;
        let events = self
            .events
            .unwrap_or_else(|| Arc::new(InProcEventBus::new(self.config.event_capacity)));

        FetchQueue::with_events(self.config, store, events)
    }
}
