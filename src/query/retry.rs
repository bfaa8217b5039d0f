//! Retry policy and the shared retry loop.
//!
//! [`RetryPolicy`] decides whether a failed fetch or mutation is attempted
//! again and how long to wait first. Delays grow exponentially from
//! `initial_delay` and are capped at `max_delay`:
//!
//! ```rust
//! # use huginn::query::RetryPolicy;
//! # use std::time::Duration;
//! let policy = RetryPolicy::query();
//! assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
//! assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
//! assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(30));
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::telemetry;
use crate::{HuginnError, Result};

type Classifier = Arc<dyn Fn(&HuginnError) -> bool + Send + Sync>;

/// Retry behaviour for one query or mutation.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first. 0 = no retry.
    pub max_retries: u32,
    /// Delay before the first retry. Default: 1s.
    pub initial_delay: Duration,
    /// Cap on the exponential delay. Default: 30s.
    pub max_delay: Duration,
    is_retryable: Classifier,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::query()
    }
}

impl RetryPolicy {
    /// Query default: 3 retries, 1s doubling up to 30s, terminal errors never retried.
    pub fn query() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            is_retryable: Arc::new(HuginnError::is_transient),
        }
    }

    /// Mutation default: a single retry.
    pub fn mutation() -> Self {
        Self::query().max_retries(1)
    }

    pub fn disabled() -> Self {
        Self::query().max_retries(0)
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Replace the retryable-error classifier.
    pub fn retry_if(mut self, f: impl Fn(&HuginnError) -> bool + Send + Sync + 'static) -> Self {
        self.is_retryable = Arc::new(f);
        self
    }

    pub fn is_retryable(&self, err: &HuginnError) -> bool {
        (self.is_retryable)(err)
    }

    /// Delay before retry number `attempt` (0-indexed):
    /// `initial_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

/// Run `f` until it succeeds, fails terminally, or retries run out.
pub(crate) async fn with_retry<F, Fut, T>(policy: &RetryPolicy, operation: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries && policy.is_retryable(&e) => {
                let delay = policy.delay_for_attempt(attempt);
                metrics::counter!(telemetry::RETRIES_TOTAL, "operation" => operation.to_owned())
                    .increment(1);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
