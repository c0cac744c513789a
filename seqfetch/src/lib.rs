//! Seqfetch - prioritized background prefetch for sequence data.
//!
//! Callers name a sequence and a [`RetrievalPolicy`]; a pool of workers
//! drains a bounded priority queue and warms the [`SequenceDataStore`] for
//! that sequence. Tasks whose policy asks for it fan out into child tasks
//! for protein products and for the components of assembled sequences,
//! one priority step lower than their parent.
//!
//! # Core Concepts
//!
//! - **Policy**: [`RetrievalPolicy`] is a bitmask saying what to fetch
//!   (whole record, features, core features) and whether to follow
//!   products and reference-map components.
//!
//! - **Task**: [`FetchTask`] is one unit of work. Running it issues the
//!   store calls the policy demands and yields the child tasks it found.
//!
//! - **Queue**: [`PriorityWorkQueue`] orders work by [`FetchPriority`],
//!   FIFO among equal priorities, with backpressure at capacity.
//!
//! - **Scheduler**: [`FetchQueue`] owns the queue and the worker pool and
//!   exposes `add`, `is_full`, `is_empty`, `clear` and `finish`. A
//!   process-wide default is available through [`instance`].
//!
//! - **Events**: every transition is published on an [`InProcEventBus`].
//!
//! # Feature Flags
//!
//! - `metrics` - Prometheus metrics support
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use seqfetch::*;
//!
//! let store = Arc::new(InMemoryDataStore::new());
//! let queue = FetchQueue::new(FetchQueueConfig::default(), store)?;
//! queue
//!     .add_with_priority(
//!         "NC_000001",
//!         RetrievalPolicy::FEATURES | RetrievalPolicy::RECURSIVE,
//!         FetchPriority(10),
//!     )
//!     .await;
//! queue.finish().await;
//! ```

/// Scheduler configuration.
pub mod config;

/// Fetch lifecycle events.
///
/// [`FetchEvent`] and [`FetchEventPayload`] describe task and scheduler
/// transitions; [`InProcEventBus`] broadcasts them in process.
pub mod events;

/// Process-wide default queue.
pub mod instance;

/// In-memory [`SequenceDataStore`] implementation.
pub mod memory;

#[cfg(feature = "metrics")]
/// Prometheus collectors for the scheduler.
pub mod metrics;

/// Retrieval policy bitmask.
pub mod policy;

/// Bounded priority queue with signal-driven waiting.
pub mod queue;

/// Scheduler runtime: the [`FetchQueue`], its builder and its workers.
pub mod runtime;

/// Data store abstraction the workers fetch through.
///
/// - [`SequenceDataStore`] - async trait implemented by storage backends
/// - [`SeqHandle`] - resolved record handle
/// - [`Feature`] and [`FeatureSelector`] - annotation queries
/// - [`MapSegment`] - one entry of a reference map
pub mod store;

/// Fetch tasks and their identifiers.
pub mod task;

/// Tracing spans and metric helpers.
pub mod telemetry;

pub use config::*;
pub use events::*;
pub use instance::{instance, reset_instance, set_default_store};
pub use memory::*;
pub use policy::*;
pub use queue::*;
pub use runtime::*;
pub use store::*;
pub use task::*;
