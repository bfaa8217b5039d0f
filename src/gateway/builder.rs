//! Builder for configuring gateway instances

use std::sync::Arc;
use std::time::Duration;

use super::{Gateway, MemoryBackend, RestBackend};
use crate::{HuginnError, Result};

enum Target {
    Rest { url: String, api_key: String },
    Memory(Arc<MemoryBackend>),
}

/// Builder for [`Gateway`].
#[derive(Default)]
pub struct GatewayBuilder {
    target: Option<Target>,
    timeout_secs: Option<u64>,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Talk to a hosted project over HTTP.
    pub fn rest(mut self, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.target = Some(Target::Rest {
            url: url.into(),
            api_key: api_key.into(),
        });
        self
    }

    /// Use an in-process backend.
    pub fn memory(mut self, backend: Arc<MemoryBackend>) -> Self {
        self.target = Some(Target::Memory(backend));
        self
    }

    /// Set the HTTP request timeout (seconds). Ignored for in-memory backends.
    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Build the gateway.
    pub fn build(self) -> Result<Gateway> {
        match self.target {
            Some(Target::Rest { url, api_key }) => {
                if url.trim().is_empty() {
                    return Err(HuginnError::Configuration("backend url is empty".into()));
                }
                let timeout = Duration::from_secs(self.timeout_secs.unwrap_or(30));
                let backend = Arc::new(RestBackend::with_timeout(url, api_key, timeout)?);
                Ok(Gateway::new(backend.clone(), backend.clone(), backend))
            }
            Some(Target::Memory(backend)) => {
                Ok(Gateway::new(backend.clone(), backend.clone(), backend))
            }
            None => Err(HuginnError::Configuration(
                "no backend configured; call .rest() or .memory()".into(),
            )),
        }
    }
}
