//! Huginn - query cache, invalidation rules and data gateway for a venue
//! back-office.
//!
//! The crate is layered:
//!
//! - [`gateway`] talks to the hosted backend (or an in-memory stand-in) through
//!   typed [`Repository`] handles, an [`Auth`] façade and file [`Storage`].
//! - [`query`] caches read results under hierarchical [`CacheKey`]s with
//!   freshness windows, request de-duplication, retry, invalidation and GC.
//! - [`rules`] says which cache entries each write patches, removes or stales.
//! - [`VenueClient`] wires the three together as named queries and mutations.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use huginn::{Gateway, MemoryBackend, QueryCache, VenueClient};
//! use huginn::types::{EventFilters, EventStatus, PageOptions};
//!
//! #[tokio::main]
//! async fn main() -> huginn::Result<()> {
//!     let cache = QueryCache::default();
//!     cache.init()?;
//!     let client = VenueClient::new(Gateway::memory(Arc::new(MemoryBackend::new())), cache);
//!
//!     let filters = EventFilters {
//!         status: Some(EventStatus::Active),
//!         ..Default::default()
//!     };
//!     let page = client.events_now(PageOptions::new(filters).limit(10)).await?;
//!     println!("{} of {} events", page.data.len(), page.count);
//!
//!     client.cache().dispose();
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod favorites;
pub mod gateway;
pub mod keys;
pub mod query;
pub mod rules;
pub mod telemetry;
pub mod types;
pub mod webhooks;

pub use client::VenueClient;
pub use config::{Config, Secrets};
pub use error::{HuginnError, Result};
pub use favorites::LocalFavorites;
pub use gateway::{Auth, AuthState, Gateway, GatewayBuilder, MemoryBackend, Repository, Storage};
pub use keys::{CacheKey, Entity, ParamValue, Params, Segment};
pub use query::{
    CacheEvent, MutationDescriptor, QueryCache, QueryConfig, QueryDescriptor, QueryObserver,
    QueryResult, QueryState, RetryPolicy,
};
pub use rules::{MutationEffects, Write};
pub use webhooks::{ArchiveReport, WebhookClient};

/// Crate version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
