use async_trait::async_trait;
use parking_lot::Mutex;
use seqfetch::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// One call observed by [`RecordingDataStore`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StoreCall {
    ResolveHandle { id: SeqId },
    ResolveAllIds { id: SeqId },
    LoadWholeRecord { id: SeqId },
    Features {
        id: SeqId,
        range: SeqRange,
        kinds: Option<Vec<FeatureKind>>,
        depth: ResolveDepth,
        exclude_external: bool,
    },
    ReferenceMap { id: SeqId, start: Option<u64> },
}

impl StoreCall {
    pub fn seq_id(&self) -> &SeqId {
        match self {
            StoreCall::ResolveHandle { id }
            | StoreCall::ResolveAllIds { id }
            | StoreCall::LoadWholeRecord { id }
            | StoreCall::Features { id, .. }
            | StoreCall::ReferenceMap { id, .. } => id,
        }
    }
}

/// [`SequenceDataStore`] double that records every call before delegating
/// to an [`InMemoryDataStore`].
///
/// Calls can be slowed with [`with_delay`](Self::with_delay), held at
/// `resolve_handle` with [`hold`](Self::hold), and made to fail per id with
/// [`fail_on`](Self::fail_on).
#[derive(Clone)]
pub struct RecordingDataStore {
    inner: InMemoryDataStore,
    calls: Arc<Mutex<Vec<StoreCall>>>,
    failing: Arc<Mutex<HashSet<SeqId>>>,
    delay: Option<Duration>,
    gate: Arc<watch::Sender<bool>>,
}

impl RecordingDataStore {
    pub fn new(inner: InMemoryDataStore) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner,
            calls: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(Mutex::new(HashSet::new())),
            delay: None,
            gate: Arc::new(gate),
        }
    }

    /// Sleep for `delay` inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn inner(&self) -> &InMemoryDataStore {
        &self.inner
    }

    /// Make `resolve_handle` fail for `id`.
    pub fn fail_on(&self, id: impl Into<SeqId>) {
        self.failing.lock().insert(id.into());
    }

    /// Block every subsequent `resolve_handle` until [`release`](Self::release).
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn record(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    /// Calls made on behalf of `id`.
    pub fn calls_for(&self, id: &str) -> Vec<StoreCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.seq_id().as_str() == id)
            .cloned()
            .collect()
    }

    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&StoreCall) -> bool,
    {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    pub fn resolve_count(&self) -> usize {
        self.count(|call| matches!(call, StoreCall::ResolveHandle { .. }))
    }

    pub fn assert_resolve_count_eq(&self, expected: usize) {
        let actual = self.resolve_count();
        assert_eq!(
            actual, expected,
            "Expected {} resolves, got {}",
            expected, actual
        );
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn push(&self, call: StoreCall) {
        self.calls.lock().push(call);
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl SequenceDataStore for RecordingDataStore {
    async fn resolve_handle(&self, id: &SeqId) -> anyhow::Result<SeqHandle> {
        self.push(StoreCall::ResolveHandle { id: id.clone() });

        let mut gate = self.gate.subscribe();
        // sender lives in self, so the channel cannot close here
        let _ = gate.wait_for(|open| *open).await;
        self.pause().await;

        if self.failing.lock().contains(id) {
            anyhow::bail!("injected failure for {id}");
        }
        self.inner.resolve_handle(id).await
    }

    async fn resolve_all_ids(&self, handle: &SeqHandle) -> anyhow::Result<Vec<SeqId>> {
        self.push(StoreCall::ResolveAllIds {
            id: handle.id.clone(),
        });
        self.inner.resolve_all_ids(handle).await
    }

    async fn load_whole_record(&self, handle: &SeqHandle) -> anyhow::Result<()> {
        self.push(StoreCall::LoadWholeRecord {
            id: handle.id.clone(),
        });
        self.pause().await;
        self.inner.load_whole_record(handle).await
    }

    async fn features(
        &self,
        handle: &SeqHandle,
        range: SeqRange,
        selector: &FeatureSelector,
    ) -> anyhow::Result<Vec<Feature>> {
        self.push(StoreCall::Features {
            id: handle.id.clone(),
            range,
            kinds: selector.kinds.clone(),
            depth: selector.depth,
            exclude_external: selector.exclude_external,
        });
        self.inner.features(handle, range, selector).await
    }

    async fn reference_map(
        &self,
        handle: &SeqHandle,
        start: Option<u64>,
    ) -> anyhow::Result<Vec<MapSegment>> {
        self.push(StoreCall::ReferenceMap {
            id: handle.id.clone(),
            start,
        });
        self.inner.reference_map(handle, start).await
    }
}
