//! Process-wide default fetch queue.
//!
//! Hosts that want one shared prefetcher call [`instance`]; the queue is
//! built on first use with [`FetchQueueConfig::default`] and the store
//! registered through [`set_default_store`], falling back to an empty
//! [`InMemoryDataStore`].

use std::sync::Arc;

use parking_lot::{RwLock, const_rwlock};

use crate::config::FetchQueueConfig;
use crate::memory::InMemoryDataStore;
use crate::runtime::{FetchQueue, FetchQueueState};
use crate::store::SequenceDataStore;

static INSTANCE: RwLock<Option<Arc<FetchQueue>>> = const_rwlock(None);
static DEFAULT_STORE: RwLock<Option<Arc<dyn SequenceDataStore>>> = const_rwlock(None);

/// Return the shared queue, creating it on first call.
///
/// Concurrent first calls observe the same queue. Workers are spawned on
/// the calling tokio runtime, so they die with it. A queue that is still
/// running but has no live worker left is treated as orphaned and replaced
/// on the next call.
///
/// # Errors
///
/// Fails when the queue has to be created outside a tokio runtime.
pub fn instance() -> anyhow::Result<Arc<FetchQueue>> {
    if let Some(queue) = INSTANCE.read().as_ref().filter(|queue| is_usable(queue)) {
        return Ok(Arc::clone(queue));
    }

    let mut slot = INSTANCE.write();
    if let Some(queue) = slot.as_ref().filter(|queue| is_usable(queue)) {
        return Ok(Arc::clone(queue));
    }
    if slot.take().is_some() {
        tracing::warn!("default fetch queue lost its workers; rebuilding");
    }

    let store: Arc<dyn SequenceDataStore> = match DEFAULT_STORE.read().clone() {
        Some(store) => store,
        None => Arc::new(InMemoryDataStore::new()),
    };
    let queue = Arc::new(FetchQueue::new(FetchQueueConfig::default(), store)?);
    *slot = Some(Arc::clone(&queue));
    tracing::info!("default fetch queue created");
    Ok(queue)
}

fn is_usable(queue: &FetchQueue) -> bool {
    queue.state() != FetchQueueState::Running || queue.live_workers() > 0
}

/// Store used the next time [`instance`] has to build the queue.
pub fn set_default_store(store: Arc<dyn SequenceDataStore>) {
    *DEFAULT_STORE.write() = Some(store);
}

/// Finish and forget the shared queue. The next [`instance`] call builds a
/// fresh one.
pub async fn reset_instance() {
    let queue = INSTANCE.write().take();
    if let Some(queue) = queue {
        queue.finish().await;
        tracing::info!("default fetch queue reset");
    }
}
