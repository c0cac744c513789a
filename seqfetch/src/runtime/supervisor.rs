use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

use anyhow::Context;
use tokio::sync::{Mutex, Notify, broadcast};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::FetchQueueConfig;
use crate::events::{DropReason, FetchEvent, FetchEventPayload, InProcEventBus};
use crate::policy::RetrievalPolicy;
use crate::queue::{PriorityWorkQueue, QueueSnapshot};
use crate::store::SequenceDataStore;
use crate::task::{FetchPriority, FetchTask, SeqId, SeqRange, WorkItem};
use crate::telemetry;

use super::worker::{LiveWorker, worker_loop};

/// Lifecycle of a [`FetchQueue`]. Transitions only move forward.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum FetchQueueState {
    Running = 0,
    ShuttingDown = 1,
    Terminated = 2,
}

impl FetchQueueState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::ShuttingDown,
            _ => Self::Terminated,
        }
    }
}

/// Token for signalling shutdown to everything sharing it.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    cancelled: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal cancellation. Returns true for the call that flipped the flag.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared between the [`FetchQueue`] handle and its workers.
pub(crate) struct Shared {
    pub(crate) config: FetchQueueConfig,
    pub(crate) queue: PriorityWorkQueue,
    pub(crate) store: Arc<dyn SequenceDataStore>,
    pub(crate) events: Arc<InProcEventBus>,
    shutdown: ShutdownToken,
    state: AtomicU8,
    live_workers: AtomicUsize,
    workers_gone: Notify,
    seen: Option<parking_lot::Mutex<HashSet<(SeqId, RetrievalPolicy)>>>,
}

impl Shared {
    fn state(&self) -> FetchQueueState {
        FetchQueueState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn begin_shutdown(&self) -> bool {
        let _ = self.state.compare_exchange(
            FetchQueueState::Running as u8,
            FetchQueueState::ShuttingDown as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.shutdown.cancel()
    }

    fn mark_terminated(&self) {
        self.state
            .store(FetchQueueState::Terminated as u8, Ordering::SeqCst);
    }

    /// Shutdown and dedupe gate shared by every submission path.
    fn admit(&self, task: &FetchTask) -> bool {
        if self.shutdown.is_cancelled() {
            tracing::trace!(seq_id = %task.id, "fetch queue shutting down; dropping task");
            self.events.publish(FetchEventPayload::Dropped {
                seq_id: task.id.clone(),
                reason: DropReason::ShuttingDown,
            });
            return false;
        }
        if let Some(seen) = &self.seen {
            if !seen.lock().insert((task.id.clone(), task.policy)) {
                tracing::trace!(seq_id = %task.id, policy = %task.policy, "duplicate fetch dropped");
                self.events.publish(FetchEventPayload::Dropped {
                    seq_id: task.id.clone(),
                    reason: DropReason::Duplicate,
                });
                return false;
            }
        }
        true
    }

    /// Published once the entry is in the queue.
    fn record_enqueued(&self, seq_id: SeqId, policy: RetrievalPolicy, priority: FetchPriority) {
        telemetry::record_task_enqueued(policy.to_string());
        telemetry::set_queue_depth(self.queue.len());
        self.events.publish(FetchEventPayload::Enqueued {
            seq_id,
            policy,
            priority,
        });
    }

    /// External submission: waits while the queue is full.
    async fn submit(&self, task: FetchTask) {
        if !self.admit(&task) {
            return;
        }
        let (id, policy, priority) = (task.id.clone(), task.policy, task.priority);
        self.queue.enqueue(WorkItem::Fetch(task), priority).await;
        self.record_enqueued(id, policy, priority);
    }

    /// Submission of work synthesized by a worker. Never waits.
    pub(crate) fn submit_child(&self, task: FetchTask) {
        if !self.admit(&task) {
            return;
        }
        let (id, policy, priority) = (task.id.clone(), task.policy, task.priority);
        self.queue.push_unbounded(WorkItem::Fetch(task), priority);
        self.record_enqueued(id, policy, priority);
    }

    pub(crate) fn worker_started(&self) {
        self.live_workers.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn worker_exited(&self) {
        if self.live_workers.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.workers_gone.notify_waiters();
        }
    }

    async fn all_workers_gone(&self) {
        loop {
            let gone = self.workers_gone.notified();
            tokio::pin!(gone);
            gone.as_mut().enable();
            if self.live_workers.load(Ordering::SeqCst) == 0 {
                return;
            }
            gone.await;
        }
    }
}

/// Prioritized prefetch scheduler: a bounded priority queue drained by a
/// fixed pool of workers that run [`FetchTask`]s against a
/// [`SequenceDataStore`].
///
/// Shutdown is one way. After [`clear`](Self::clear) or
/// [`finish`](Self::finish) begins, every `add` is silently dropped.
pub struct FetchQueue {
    shared: Arc<Shared>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl fmt::Debug for FetchQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchQueue")
            .field("config", &self.shared.config)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .field("worker_count", &self.worker_count)
            .field("live_workers", &self.live_workers())
            .finish()
    }
}

impl FetchQueue {
    /// Create a scheduler and spawn its workers on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid or when called outside a
    /// tokio runtime.
    pub fn new(
        config: FetchQueueConfig,
        store: Arc<dyn SequenceDataStore>,
    ) -> anyhow::Result<Self> {
        let events = Arc::new(InProcEventBus::new(config.event_capacity));
        Self::with_events(config, store, events)
    }

    /// Like [`new`](Self::new) but publishing onto an existing event bus.
    pub fn with_events(
        config: FetchQueueConfig,
        store: Arc<dyn SequenceDataStore>,
        events: Arc<InProcEventBus>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .context("fetch queue must be created inside a tokio runtime")?;

        let seen = config
            .dedupe
            .then(|| parking_lot::Mutex::new(HashSet::new()));
        let shared = Arc::new(Shared {
            queue: PriorityWorkQueue::new(config.capacity),
            store,
            events,
            shutdown: ShutdownToken::new(),
            state: AtomicU8::new(FetchQueueState::Running as u8),
            live_workers: AtomicUsize::new(0),
            workers_gone: Notify::new(),
            seen,
            config,
        });

        let worker_count = shared.config.workers;
        let mut handles = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let worker_id = format!("{}-w{}", shared.config.worker_prefix, i);
            let live = LiveWorker::enter(Arc::clone(&shared));
            handles.push(runtime.spawn(worker_loop(worker_id, live)));
        }

        tracing::info!(
            workers = worker_count,
            capacity = shared.config.capacity,
            "fetch queue started"
        );

        Ok(Self {
            shared,
            worker_handles: Mutex::new(handles),
            worker_count,
        })
    }

    pub fn config(&self) -> &FetchQueueConfig {
        &self.shared.config
    }

    pub fn store(&self) -> Arc<dyn SequenceDataStore> {
        Arc::clone(&self.shared.store)
    }

    pub fn events(&self) -> Arc<InProcEventBus> {
        Arc::clone(&self.shared.events)
    }

    /// Subscribe to task and lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<FetchEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> FetchQueueState {
        self.shared.state()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Size of the pool fixed at construction.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Workers whose loop is still running.
    pub fn live_workers(&self) -> usize {
        self.shared.live_workers.load(Ordering::SeqCst)
    }

    /// Number of queued entries not yet picked up by a worker.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn is_full(&self) -> bool {
        self.shared.queue.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.shared.queue.snapshot()
    }

    /// Queue `id` for the whole record at the default priority.
    pub async fn add(&self, id: impl Into<SeqId>, policy: RetrievalPolicy) {
        let priority = self.shared.config.default_priority;
        self.add_range(id, SeqRange::Whole, policy, priority).await;
    }

    /// Queue `id` for the whole record at `priority`.
    pub async fn add_with_priority(
        &self,
        id: impl Into<SeqId>,
        policy: RetrievalPolicy,
        priority: FetchPriority,
    ) {
        self.add_range(id, SeqRange::Whole, policy, priority).await;
    }

    /// Queue `id` restricted to `range` at `priority`.
    ///
    /// Waits while the queue is full. Silently ignored once shutdown has
    /// begun.
    pub async fn add_range(
        &self,
        id: impl Into<SeqId>,
        range: SeqRange,
        policy: RetrievalPolicy,
        priority: FetchPriority,
    ) {
        self.submit(FetchTask::new(id, range, policy, priority)).await;
    }

    /// Queue each identifier individually at the same priority.
    pub async fn add_many<I>(
        &self,
        ids: I,
        policy: RetrievalPolicy,
        priority: FetchPriority,
    ) where
        I: IntoIterator,
        I::Item: Into<SeqId>,
    {
        for id in ids {
            self.add_range(id, SeqRange::Whole, policy, priority).await;
        }
    }

    /// Queue a prepared task.
    pub async fn submit(&self, task: FetchTask) {
        let span = telemetry::enqueue_span(
            task.id.as_str(),
            task.policy.to_string(),
            task.priority.0,
        );
        self.shared.submit(task).instrument(span).await;
    }

    /// Abandon pending work, then [`finish`](Self::finish).
    pub async fn clear(&self) {
        self.shared.begin_shutdown();
        let mut discarded = 0;
        loop {
            discarded += self.shared.queue.drain();
            if self.shared.queue.is_empty() {
                break;
            }
        }
        tracing::info!(discarded, "fetch queue cleared");
        self.shared
            .events
            .publish(FetchEventPayload::Cleared { discarded });
        self.finish().await;
    }

    /// Stop accepting work, let the pool drain the queue, then terminate
    /// every worker.
    ///
    /// One poison pill goes in at the lowest priority; once the queue is
    /// empty (or no worker is left to empty it) every worker is aborted,
    /// including any still running a task, and joined. When this returns
    /// no worker is alive.
    pub async fn finish(&self) {
        let mut handles = self.worker_handles.lock().await;
        if self.state() == FetchQueueState::Terminated {
            return;
        }

        let span = telemetry::shutdown_span("finish", handles.len());
        async {
            if self.shared.begin_shutdown() {
                tracing::info!("initiating fetch queue shutdown");
            }

            self.shared
                .queue
                .push_unbounded(WorkItem::PoisonPill, FetchPriority::MIN);

            tokio::select! {
                _ = self.shared.queue.wait_empty() => {}
                _ = self.shared.all_workers_gone() => {
                    tracing::debug!(
                        abandoned = self.shared.queue.len(),
                        "no workers left to drain the queue"
                    );
                }
            }

            for handle in handles.iter() {
                handle.abort();
            }
            for handle in handles.drain(..) {
                match handle.await {
                    Ok(()) => {}
                    Err(err) if err.is_cancelled() => {}
                    Err(err) => tracing::warn!("worker task failed: {err:?}"),
                }
            }

            self.shared.queue.drain();
            self.shared.mark_terminated();
            self.shared.events.publish(FetchEventPayload::Terminated);
            tracing::info!("fetch queue shutdown complete");
        }
        .instrument(span)
        .await;
    }
}

impl Drop for FetchQueue {
    fn drop(&mut self) {
        if self.state() == FetchQueueState::Terminated {
            return;
        }
        self.shared.begin_shutdown();
        for handle in self.worker_handles.get_mut().drain(..) {
            handle.abort();
        }
        self.shared.mark_terminated();
        tracing::debug!("fetch queue dropped before finish; workers aborted");
    }
}
