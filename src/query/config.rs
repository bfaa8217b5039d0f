//! Cache-wide defaults.

use std::time::Duration;

use super::retry::RetryPolicy;

/// Defaults applied to every query/mutation that does not override them.
///
/// ```rust
/// # use huginn::query::QueryConfig;
/// # use std::time::Duration;
/// let config = QueryConfig::new()
///     .stale_time(Duration::from_secs(30))
///     .gc_time(Duration::from_secs(300));
/// ```
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// How long fetched data counts as fresh. Default: 5 minutes.
    pub stale_time: Duration,
    /// How long an unobserved entry survives. Default: 10 minutes.
    pub gc_time: Duration,
    /// Period of the background sweep started by `init()`. Default: 60s.
    pub gc_interval: Duration,
    pub retry: RetryPolicy,
    pub mutation_retry: RetryPolicy,
    /// Capacity of the event broadcast channel. Default: 256.
    pub event_capacity: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(5 * 60),
            gc_time: Duration::from_secs(10 * 60),
            gc_interval: Duration::from_secs(60),
            retry: RetryPolicy::query(),
            mutation_retry: RetryPolicy::mutation(),
            event_capacity: 256,
        }
    }
}

impl QueryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stale_time(mut self, d: Duration) -> Self {
        self.stale_time = d;
        self
    }

    pub fn gc_time(mut self, d: Duration) -> Self {
        self.gc_time = d;
        self
    }

    pub fn gc_interval(mut self, d: Duration) -> Self {
        self.gc_interval = d;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn mutation_retry(mut self, policy: RetryPolicy) -> Self {
        self.mutation_retry = policy;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}
