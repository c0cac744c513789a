use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::store::{Feature, FeatureSelector, MapSegment, SeqHandle, SequenceDataStore};
use crate::task::{SeqId, SeqRange};

/// A record held by [`InMemoryDataStore`].
#[derive(Clone, Debug)]
pub struct SeqRecord {
    id: SeqId,
    synonyms: Vec<SeqId>,
    pub length: u64,
    pub features: Vec<Feature>,
    /// Reference map, ordered by position.
    pub segments: Vec<MapSegment>,
}

impl SeqRecord {
    pub fn new(id: impl Into<SeqId>, length: u64) -> Self {
        Self {
            id: id.into(),
            synonyms: Vec::new(),
            length,
            features: Vec::new(),
            segments: Vec::new(),
        }
    }

    pub fn with_synonym(mut self, id: impl Into<SeqId>) -> Self {
        self.synonyms.push(id.into());
        self
    }

    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    pub fn with_segment(mut self, segment: MapSegment) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn canonical_id(&self) -> &SeqId {
        &self.id
    }

    /// Canonical identifier followed by any synonyms.
    pub fn ids(&self) -> impl Iterator<Item = &SeqId> {
        std::iter::once(&self.id).chain(self.synonyms.iter())
    }
}

#[derive(Debug, Default)]
struct StoreState {
    records: HashMap<SeqId, Arc<SeqRecord>>,
    /// Synonym -> canonical id.
    aliases: HashMap<SeqId, SeqId>,
    /// Canonical ids that have been resolved at least once.
    resolved: HashSet<SeqId>,
    /// Canonical ids that have been fully loaded.
    loaded: HashSet<SeqId>,
}

/// Thread-safe in-memory sequence data store.
///
/// Annotations are attached directly to their record, so every
/// [`ResolveDepth`](crate::store::ResolveDepth) yields the same features.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDataStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record, indexing all of its identifiers.
    pub fn insert(&self, record: SeqRecord) {
        let mut state = self.state.write();
        let canonical = record.canonical_id().clone();
        for id in record.ids() {
            state.aliases.insert(id.clone(), canonical.clone());
        }
        state.records.insert(canonical, Arc::new(record));
    }

    pub fn with_record(self, record: SeqRecord) -> Self {
        self.insert(record);
        self
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once `id` (or a synonym) has been resolved.
    pub fn is_resolved(&self, id: &SeqId) -> bool {
        let state = self.state.read();
        state
            .aliases
            .get(id)
            .is_some_and(|canonical| state.resolved.contains(canonical))
    }

    /// True once the whole record behind `id` has been loaded.
    pub fn is_loaded(&self, id: &SeqId) -> bool {
        let state = self.state.read();
        state
            .aliases
            .get(id)
            .is_some_and(|canonical| state.loaded.contains(canonical))
    }

    fn record(&self, handle: &SeqHandle) -> anyhow::Result<Arc<SeqRecord>> {
        let state = self.state.read();
        match state.records.get(&handle.id) {
            Some(record) => Ok(Arc::clone(record)),
            None => anyhow::bail!("sequence not found: {}", handle.id),
        }
    }
}

#[async_trait]
impl SequenceDataStore for InMemoryDataStore {
    async fn resolve_handle(&self, id: &SeqId) -> anyhow::Result<SeqHandle> {
        let mut state = self.state.write();
        let Some(canonical) = state.aliases.get(id).cloned() else {
            anyhow::bail!("sequence not found: {id}");
        };
        let length = state.records.get(&canonical).map(|record| record.length);
        state.resolved.insert(canonical.clone());

        let handle = SeqHandle::new(canonical);
        Ok(match length {
            Some(length) => handle.with_length(length),
            None => handle,
        })
    }

    async fn resolve_all_ids(
        &self,
        handle: &SeqHandle,
    ) -> anyhow::Result<Vec<SeqId>> {
        Ok(self.record(handle)?.ids().cloned().collect())
    }

    async fn load_whole_record(&self, handle: &SeqHandle) -> anyhow::Result<()> {
        self.record(handle)?;
        self.state.write().loaded.insert(handle.id.clone());
        Ok(())
    }

    async fn features(
        &self,
        handle: &SeqHandle,
        range: SeqRange,
        selector: &FeatureSelector,
    ) -> anyhow::Result<Vec<Feature>> {
        let record = self.record(handle)?;
        Ok(record
            .features
            .iter()
            .filter(|feature| range.overlaps(feature.from, feature.to))
            .filter(|feature| selector.admits(feature))
            .cloned()
            .collect())
    }

    async fn reference_map(
        &self,
        handle: &SeqHandle,
        start: Option<u64>,
    ) -> anyhow::Result<Vec<MapSegment>> {
        let record = self.record(handle)?;
        let start = start.unwrap_or(0);
        Ok(record
            .segments
            .iter()
            .filter(|segment| segment.end > start)
            .cloned()
            .collect())
    }
}
