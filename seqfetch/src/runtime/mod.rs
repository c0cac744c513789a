/// Builder for constructing fetch queues.
pub mod builder;
/// Fetch queue lifecycle and the shared worker state.
pub mod supervisor;
/// Worker loop.
mod worker;

pub use builder::FetchQueueBuilder;
pub use supervisor::{FetchQueue, FetchQueueState, ShutdownToken};
