use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::task::{SeqId, SeqRange};

/// Resolved reference to a record, obtained from an identifier.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SeqHandle {
    /// Canonical identifier of the record.
    pub id: SeqId,
    /// Record length, when the store knows it.
    pub length: Option<u64>,
}

impl SeqHandle {
    pub fn new(id: SeqId) -> Self {
        Self { id, length: None }
    }

    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum FeatureKind {
    Gene,
    Mrna,
    CodingRegion,
    Other,
}

impl FeatureKind {
    /// Kinds fetched by the core-features policy.
    pub const CORE: &'static [FeatureKind] =
        &[FeatureKind::Gene, FeatureKind::Mrna, FeatureKind::CodingRegion];
    /// Kinds that can carry a product identifier.
    pub const PRODUCT_BEARING: &'static [FeatureKind] =
        &[FeatureKind::Mrna, FeatureKind::CodingRegion];
}

/// How deep the store may resolve through references when iterating.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ResolveDepth {
    /// The store picks the depth at which annotations are found.
    Adaptive,
    /// Only annotations attached directly to the record.
    None,
}

/// Filter passed to [`SequenceDataStore::features`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FeatureSelector {
    /// Allowed kinds; `None` admits every kind.
    pub kinds: Option<Vec<FeatureKind>>,
    /// Skip annotations inherited from external sources.
    pub exclude_external: bool,
    pub depth: ResolveDepth,
}

impl FeatureSelector {
    pub fn all_kinds() -> Self {
        Self {
            kinds: None,
            exclude_external: true,
            depth: ResolveDepth::Adaptive,
        }
    }

    pub fn core_kinds() -> Self {
        Self {
            kinds: Some(FeatureKind::CORE.to_vec()),
            exclude_external: true,
            depth: ResolveDepth::Adaptive,
        }
    }

    /// mRNA and coding regions, no further resolution.
    pub fn products() -> Self {
        Self {
            kinds: Some(FeatureKind::PRODUCT_BEARING.to_vec()),
            exclude_external: true,
            depth: ResolveDepth::None,
        }
    }

    pub fn admits(&self, feature: &Feature) -> bool {
        if self.exclude_external && feature.external {
            return false;
        }
        match &self.kinds {
            Some(kinds) => kinds.contains(&feature.kind),
            None => true,
        }
    }
}

/// Annotation attached to a record over `[from, to)`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub kind: FeatureKind,
    pub from: u64,
    pub to: u64,
    /// Separate record derived from this feature, if any.
    pub product: Option<SeqId>,
    /// Inherited from an external annotation source.
    pub external: bool,
}

impl Feature {
    pub fn new(kind: FeatureKind, from: u64, to: u64) -> Self {
        Self {
            kind,
            from,
            to,
            product: None,
            external: false,
        }
    }

    pub fn with_product(mut self, product: impl Into<SeqId>) -> Self {
        self.product = Some(product.into());
        self
    }

    pub fn external(mut self) -> Self {
        self.external = true;
        self
    }
}

/// One entry of a record's reference map.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MapSegment {
    pub start: u64,
    /// One past the last position covered.
    pub end: u64,
    /// Component record this segment points at; `None` for literal data
    /// and gaps.
    pub reference: Option<SeqId>,
}

impl MapSegment {
    pub fn reference(start: u64, end: u64, id: impl Into<SeqId>) -> Self {
        Self {
            start,
            end,
            reference: Some(id.into()),
        }
    }

    pub fn literal(start: u64, end: u64) -> Self {
        Self {
            start,
            end,
            reference: None,
        }
    }
}

/// Read operations the scheduler performs against the sequence data store.
///
/// Implementations must tolerate concurrent calls from every worker. Results
/// are expected to be cached by the store; the scheduler discards them.
#[async_trait]
pub trait SequenceDataStore: Send + Sync {
    /// Resolve `id` to a handle, materializing the record.
    async fn resolve_handle(&self, id: &SeqId) -> anyhow::Result<SeqHandle>;

    /// Every identifier equivalent to the handle's record.
    async fn resolve_all_ids(
        &self,
        handle: &SeqHandle,
    ) -> anyhow::Result<Vec<SeqId>>;

    /// Force full materialization of the record.
    async fn load_whole_record(&self, handle: &SeqHandle) -> anyhow::Result<()>;

    /// Features of the record overlapping `range` that `selector` admits.
    async fn features(
        &self,
        handle: &SeqHandle,
        range: SeqRange,
        selector: &FeatureSelector,
    ) -> anyhow::Result<Vec<Feature>>;

    /// Direct (unresolved) reference map, ordered by position, starting at
    /// the segment covering `start` or at the beginning when `None`.
    async fn reference_map(
        &self,
        handle: &SeqHandle,
        start: Option<u64>,
    ) -> anyhow::Result<Vec<MapSegment>>;
}
