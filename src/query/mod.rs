//! Query/mutation cache.
//!
//! - [`QueryCache`]: the store, with freshness, de-duplication, GC and
//!   prefix invalidation
//! - [`QueryDescriptor`] / [`QueryObserver`]: declare a query and watch it
//! - [`MutationDescriptor`]: a write plus the cache effects of its success
//! - [`RetryPolicy`]: backoff shared by queries and mutations
//! - [`CacheEvent`]: structured success/error notifications

mod cache;
mod config;
mod descriptor;
mod entry;
mod events;
mod mutation;
mod observer;
mod retry;

pub use cache::QueryCache;
pub use config::QueryConfig;
pub use descriptor::QueryDescriptor;
pub use entry::QueryState;
pub use events::CacheEvent;
pub use mutation::MutationDescriptor;
pub use observer::{QueryObserver, QueryResult};
pub use retry::RetryPolicy;

pub(crate) use descriptor::AnyValue;
