use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::policy::RetrievalPolicy;
use crate::task::{FetchPriority, SeqId};

/// Metadata envelope attached to every fetch event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventMeta {
    pub version: u16,
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    pub fn new() -> Self {
        Self {
            version: 1,
            event_id: Uuid::now_v7(),
            timestamp: Utc::now(),
        }
    }
}

impl Default for EventMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch lifecycle event with metadata and payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchEvent {
    pub meta: EventMeta,
    pub payload: FetchEventPayload,
}

impl FetchEvent {
    pub fn new(payload: FetchEventPayload) -> Self {
        Self {
            meta: EventMeta::new(),
            payload,
        }
    }
}

/// Why a submission was not queued.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum DropReason {
    ShuttingDown,
    Duplicate,
}

/// Event payload emitted for scheduler and task transitions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FetchEventPayload {
    /// A task entered the queue.
    Enqueued {
        seq_id: SeqId,
        policy: RetrievalPolicy,
        priority: FetchPriority,
    },
    /// A submission was discarded before reaching the queue.
    Dropped { seq_id: SeqId, reason: DropReason },
    /// A worker picked a task up.
    Started {
        seq_id: SeqId,
        priority: FetchPriority,
        worker_id: String,
    },
    /// A task finished; `children` tasks were synthesized.
    Completed {
        seq_id: SeqId,
        children: usize,
        worker_id: String,
    },
    /// The data store could not serve the task.
    Failed {
        seq_id: SeqId,
        error: String,
        worker_id: String,
    },
    /// Pending tasks were discarded by `clear`.
    Cleared { discarded: usize },
    /// A worker consumed the poison pill and left the pool.
    WorkerStopped { worker_id: String },
    /// Every worker has been joined.
    Terminated,
}

/// In-process event bus using a tokio broadcast channel.
///
/// Publishing never blocks; a subscriber that falls behind receives
/// `RecvError::Lagged` instead of slowing the workers down.
pub struct InProcEventBus {
    sender: broadcast::Sender<FetchEvent>,
    capacity: usize,
}

impl std::fmt::Debug for InProcEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcEventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl InProcEventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish to all subscribers. Dropped silently when nobody listens.
    pub fn publish(&self, payload: FetchEventPayload) {
        let _ = self.sender.send(FetchEvent::new(payload));
    }

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<FetchEvent> {
        self.sender.subscribe()
    }
}
