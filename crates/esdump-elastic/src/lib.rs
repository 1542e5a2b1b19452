//! Elasticsearch transport for esdump.
//!
//! Implements [`esdump_core::SearchClient`] with sliced scroll searches
//! over the cluster's REST API.

pub mod client;
pub mod config;
pub mod http;
pub mod indices;
pub mod response;

pub use client::ElasticClient;
pub use config::{DEFAULT_URL, ElasticConfig};
pub use indices::{match_indices, resolve_indices};
