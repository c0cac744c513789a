//! Test doubles and fixtures for seqfetch.

pub mod fixtures;
pub mod store;

pub use fixtures::*;
pub use store::{RecordingDataStore, StoreCall};
