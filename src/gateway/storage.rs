//! File storage façade.

use std::sync::Arc;

use super::backend::StorageBackend;
use crate::{HuginnError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Overwrite an existing object at the same path.
    pub upsert: bool,
}

#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn StorageBackend>,
}

fn check_path(bucket: &str, path: &str) -> Result<()> {
    if bucket.trim().is_empty() {
        return Err(HuginnError::validation("bucket", "is required"));
    }
    if path.trim().trim_matches('/').is_empty() {
        return Err(HuginnError::validation("path", "is required"));
    }
    if path.split('/').any(|part| part == "..") {
        return Err(HuginnError::validation("path", "must not contain '..'"));
    }
    Ok(())
}

impl Storage {
    pub(crate) fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Upload an object and return its stored path.
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        options: UploadOptions,
    ) -> Result<String> {
        check_path(bucket, path)?;
        let path = path.trim_start_matches('/');
        self.backend
            .upload(bucket, path, bytes, content_type, options.upsert)
            .await
    }

    /// Upload, overwriting, and return the public URL of the object.
    pub async fn upload_public(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let stored = self
            .upload(bucket, path, bytes, content_type, UploadOptions { upsert: true })
            .await?;
        Ok(self.public_url(bucket, &stored))
    }

    pub async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()> {
        for path in paths {
            check_path(bucket, path)?;
        }
        self.backend.remove(bucket, paths).await
    }

    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        self.backend.public_url(bucket, path)
    }
}
