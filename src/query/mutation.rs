//! Mutations.
//!
//! A [`MutationDescriptor`] pairs a write with its cache side effects. On
//! success the `on_success` hook runs first (typically direct patches of
//! entries the response makes authoritative), then every key in
//! `invalidates` is invalidated.

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::debug;

use super::cache::QueryCache;
use super::events::CacheEvent;
use super::retry::{RetryPolicy, with_retry};
use crate::keys::CacheKey;
use crate::telemetry;
use crate::{HuginnError, Result};

type Mutator<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O>> + Send + Sync>;
type SuccessHook<I, O> = Arc<dyn Fn(&QueryCache, &O, &I) -> Result<()> + Send + Sync>;

pub struct MutationDescriptor<I, O> {
    name: String,
    mutate: Mutator<I, O>,
    invalidates: Vec<CacheKey>,
    on_success: Option<SuccessHook<I, O>>,
    retry: Option<RetryPolicy>,
}

impl<I, O> Clone for MutationDescriptor<I, O> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            mutate: Arc::clone(&self.mutate),
            invalidates: self.invalidates.clone(),
            on_success: self.on_success.clone(),
            retry: self.retry.clone(),
        }
    }
}

impl<I, O> MutationDescriptor<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    /// `name` labels metrics, logs and events.
    pub fn new<F, Fut>(name: impl Into<String>, mutate: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        Self {
            name: name.into(),
            mutate: Arc::new(move |input| mutate(input).boxed()),
            invalidates: Vec::new(),
            on_success: None,
            retry: None,
        }
    }

    /// Keys (and their descendants) to invalidate after success.
    pub fn invalidates(mut self, keys: impl IntoIterator<Item = CacheKey>) -> Self {
        self.invalidates.extend(keys);
        self
    }

    pub fn on_success(
        mut self,
        hook: impl Fn(&QueryCache, &O, &I) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_success = Some(Arc::new(hook));
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl QueryCache {
    /// Run a mutation and apply its cache side effects.
    pub async fn mutate<I, O>(&self, descriptor: &MutationDescriptor<I, O>, input: I) -> Result<O>
    where
        I: Clone + Send + Sync + 'static,
        O: Send + Sync + 'static,
    {
        if self.is_disposed() {
            return Err(HuginnError::Disposed);
        }
        let policy = descriptor
            .retry
            .clone()
            .unwrap_or_else(|| self.config().mutation_retry.clone());
        let name = descriptor.name.as_str();

        let result = with_retry(&policy, name, || (descriptor.mutate)(input.clone())).await;
        let result = match result {
            Ok(output) => self.settle(descriptor, &output, &input).map(|()| output),
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => {
                metrics::counter!(telemetry::MUTATIONS_TOTAL, "mutation" => name.to_owned(), "status" => "ok")
                    .increment(1);
                debug!(mutation = name, "mutation succeeded");
                self.emit(CacheEvent::MutationSuccess {
                    name: name.to_owned(),
                });
            }
            Err(e) => {
                metrics::counter!(telemetry::MUTATIONS_TOTAL, "mutation" => name.to_owned(), "status" => "error")
                    .increment(1);
                debug!(mutation = name, error = %e, "mutation failed");
                self.emit(CacheEvent::MutationError {
                    name: name.to_owned(),
                    error: Arc::new(e.clone()),
                });
            }
        }
        result
    }

    fn settle<I, O>(&self, descriptor: &MutationDescriptor<I, O>, output: &O, input: &I) -> Result<()> {
        if let Some(hook) = &descriptor.on_success {
            hook(self, output, input)?;
        }
        for key in &descriptor.invalidates {
            self.invalidate(key)?;
        }
        Ok(())
    }
}
