//! # Source Adapters
//!
//! Implementations of the [`SourceStore`](crate::store::SourceStore) interface.

pub mod http_source;
pub mod memory_source;

pub use http_source::{HttpSourceClient, HttpSourceOptions};
pub use memory_source::InMemorySource;
