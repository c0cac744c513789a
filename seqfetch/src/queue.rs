use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::task::{FetchPriority, WorkItem};

struct QueueEntry {
    priority: FetchPriority,
    seq: u64,
    item: WorkItem,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    // max-heap: higher priority first, then lower sequence number (FIFO)
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<QueueEntry>,
    next_seq: u64,
}

impl QueueState {
    fn push(&mut self, item: WorkItem, priority: FetchPriority) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueueEntry {
            priority,
            seq,
            item,
        });
    }
}

/// Bounded queue of work items ordered by priority, FIFO among equals.
///
/// `enqueue` waits while the queue is at capacity and `dequeue` waits while
/// it is empty. All waiting is signal driven; nothing polls.
pub struct PriorityWorkQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    /// Signalled when an entry is pushed.
    ready: Notify,
    /// Signalled when an entry is removed.
    slot_freed: Notify,
    /// Signalled when the queue becomes empty.
    drained: Notify,
}

impl std::fmt::Debug for PriorityWorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityWorkQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl PriorityWorkQueue {
    /// Create a queue holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(QueueState::default()),
            ready: Notify::new(),
            slot_freed: Notify::new(),
            drained: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Push `item`, waiting for a free slot while the queue is full.
    pub async fn enqueue(&self, item: WorkItem, priority: FetchPriority) {
        loop {
            let freed = self.slot_freed.notified();
            tokio::pin!(freed);
            freed.as_mut().enable();
            {
                let mut state = self.state.lock();
                if state.heap.len() < self.capacity {
                    state.push(item, priority);
                    drop(state);
                    self.ready.notify_one();
                    return;
                }
            }
            freed.await;
        }
    }

    /// Push `item` without waiting, or hand it back if the queue is full.
    pub fn try_enqueue(
        &self,
        item: WorkItem,
        priority: FetchPriority,
    ) -> Result<(), WorkItem> {
        let mut state = self.state.lock();
        if state.heap.len() >= self.capacity {
            return Err(item);
        }
        state.push(item, priority);
        drop(state);
        self.ready.notify_one();
        Ok(())
    }

    /// Push `item` even when the queue is at capacity.
    ///
    /// Used for work generated by workers themselves: a worker blocked on a
    /// full queue could otherwise wait on every other blocked worker.
    pub fn push_unbounded(&self, item: WorkItem, priority: FetchPriority) {
        self.state.lock().push(item, priority);
        self.ready.notify_one();
    }

    /// Pop the highest-priority entry, waiting while the queue is empty.
    pub async fn dequeue(&self) -> WorkItem {
        loop {
            let ready = self.ready.notified();
            tokio::pin!(ready);
            ready.as_mut().enable();
            if let Some(item) = self.try_dequeue() {
                return item;
            }
            ready.await;
        }
    }

    /// Pop the highest-priority entry if one is present.
    pub fn try_dequeue(&self) -> Option<WorkItem> {
        let mut state = self.state.lock();
        let entry = state.heap.pop()?;
        let now_empty = state.heap.is_empty();
        let more_ready = !now_empty;
        drop(state);

        self.slot_freed.notify_one();
        if now_empty {
            self.drained.notify_waiters();
        }
        if more_ready {
            // pass the wakeup on in case several consumers raced for one signal
            self.ready.notify_one();
        }
        Some(entry.item)
    }

    /// Discard every pending entry without running it. Returns how many
    /// entries were removed.
    pub fn drain(&self) -> usize {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.heap.len();
            state.heap.clear();
            removed
        };
        self.slot_freed.notify_waiters();
        self.drained.notify_waiters();
        removed
    }

    /// Wait until the queue is empty.
    pub async fn wait_empty(&self) {
        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();
            if self.is_empty() {
                return;
            }
            drained.await;
        }
    }

    /// Count pending entries per priority.
    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock();
        let mut snapshot = QueueSnapshot::new(Utc::now(), self.capacity);
        for entry in state.heap.iter() {
            match entry.item {
                WorkItem::Fetch(_) => {
                    *snapshot.by_priority.entry(entry.priority.0).or_default() += 1;
                    snapshot.pending += 1;
                }
                WorkItem::PoisonPill => snapshot.poison_pills += 1,
            }
        }
        snapshot
    }
}

/// Snapshot of queue state at a point in time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Timestamp when the snapshot was taken.
    pub sampled_at: DateTime<Utc>,
    pub capacity: usize,
    /// Pending fetch tasks.
    pub pending: usize,
    pub poison_pills: usize,
    /// Pending fetch tasks keyed by priority.
    pub by_priority: BTreeMap<u8, usize>,
}

impl QueueSnapshot {
    pub fn new(sampled_at: DateTime<Utc>, capacity: usize) -> Self {
        Self {
            sampled_at,
            capacity,
            pending: 0,
            poison_pills: 0,
            by_priority: BTreeMap::new(),
        }
    }
}
