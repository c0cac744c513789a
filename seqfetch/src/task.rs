use std::fmt::{self, Display};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::policy::RetrievalPolicy;
use crate::store::{FeatureSelector, SequenceDataStore};

/// Opaque key naming one record in the sequence data store.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeqId(String);

impl SeqId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SeqId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SeqId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Sub-interval of a record's coordinate space, or the whole record.
///
/// Intervals are half-open: `from` is the first position covered and `to`
/// is one past the last.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SeqRange {
    #[default]
    Whole,
    Interval { from: u64, to: u64 },
}

impl SeqRange {
    /// Interval constructor; swapped bounds are normalized.
    pub fn interval(from: u64, to: u64) -> Self {
        if from <= to {
            Self::Interval { from, to }
        } else {
            Self::Interval { from: to, to: from }
        }
    }

    pub fn is_whole(&self) -> bool {
        matches!(self, Self::Whole)
    }

    /// Start offset, or `None` for the whole record.
    pub fn start(&self) -> Option<u64> {
        match self {
            Self::Whole => None,
            Self::Interval { from, .. } => Some(*from),
        }
    }

    /// End offset, or `None` for the whole record.
    pub fn end(&self) -> Option<u64> {
        match self {
            Self::Whole => None,
            Self::Interval { to, .. } => Some(*to),
        }
    }

    /// True when `[from, to)` overlaps this range.
    pub fn overlaps(&self, from: u64, to: u64) -> bool {
        match self {
            Self::Whole => true,
            Self::Interval { from: start, to: end } => from < *end && *start < to,
        }
    }
}

impl Display for SeqRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whole => f.write_str("whole"),
            Self::Interval { from, to } => write!(f, "{from}..{to}"),
        }
    }
}

/// Scheduling priority. Higher values drain first.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FetchPriority(pub u8);

impl FetchPriority {
    pub const MIN: Self = Self(0);
    pub const DEFAULT: Self = Self(128);
    pub const MAX: Self = Self(u8::MAX);

    /// Priority handed to work synthesized by a task at this priority.
    pub fn decay(self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl Default for FetchPriority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Display for FetchPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for FetchPriority {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

/// One unit of schedulable prefetch work.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FetchTask {
    pub id: SeqId,
    pub range: SeqRange,
    pub policy: RetrievalPolicy,
    pub priority: FetchPriority,
}

impl FetchTask {
    pub fn new(
        id: impl Into<SeqId>,
        range: SeqRange,
        policy: RetrievalPolicy,
        priority: FetchPriority,
    ) -> Self {
        Self {
            id: id.into(),
            range,
            policy,
            priority,
        }
    }

    /// Child work always fetches the whole record; the parent's range only
    /// selects which features and segments are visited.
    fn child(&self, id: SeqId, priority: FetchPriority) -> Self {
        Self {
            id,
            range: SeqRange::Whole,
            policy: self.policy,
            priority,
        }
    }

    /// Run the task against `store`, pushing synthesized child tasks onto
    /// `children`.
    ///
    /// On error the remaining steps are skipped; children found before the
    /// failing step stay in `children`.
    pub async fn run(
        &self,
        store: &dyn SequenceDataStore,
        children: &mut Vec<FetchTask>,
    ) -> anyhow::Result<()> {
        let handle = store
            .resolve_handle(&self.id)
            .await
            .with_context(|| format!("resolving {}", self.id))?;

        store
            .resolve_all_ids(&handle)
            .await
            .with_context(|| format!("resolving synonyms of {}", self.id))?;

        if self.policy.is_whole_record() {
            store
                .load_whole_record(&handle)
                .await
                .with_context(|| format!("loading record {}", self.id))?;
        } else if self.policy.contains(RetrievalPolicy::FEATURES) {
            store
                .features(&handle, self.range, &FeatureSelector::all_kinds())
                .await
                .with_context(|| format!("loading features of {}", self.id))?;
        } else if self.policy.contains(RetrievalPolicy::CORE_FEATURES) {
            store
                .features(&handle, self.range, &FeatureSelector::core_kinds())
                .await
                .with_context(|| format!("loading core features of {}", self.id))?;
        }

        let next = self.priority.decay();

        if self.policy.contains(RetrievalPolicy::PRODUCTS) {
            let features = store
                .features(&handle, self.range, &FeatureSelector::products())
                .await
                .with_context(|| format!("loading products of {}", self.id))?;
            children.extend(
                features
                    .into_iter()
                    .filter_map(|feature| feature.product)
                    .map(|product| self.child(product, next)),
            );
        }

        if self.policy.contains(RetrievalPolicy::RECURSIVE) {
            let segments = store
                .reference_map(&handle, self.range.start())
                .await
                .with_context(|| format!("walking reference map of {}", self.id))?;
            let limit = self.range.end();
            for segment in segments {
                // map is ordered by position
                if limit.is_some_and(|end| segment.end > end) {
                    break;
                }
                if let Some(reference) = segment.reference {
                    children.push(self.child(reference, next));
                }
            }
        }

        Ok(())
    }
}

/// Entry consumed by a worker.
#[derive(Clone, Debug)]
pub enum WorkItem {
    Fetch(FetchTask),
    /// Terminates the worker that dequeues it.
    PoisonPill,
}
