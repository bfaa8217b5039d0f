//! Backend seam traits.
//!
//! The gateway talks to the hosted database, auth and blob storage through
//! three capability traits rather than one client type:
//!
//! - [`Backend`]: table CRUD with filter/sort/paginate/count
//! - [`AuthBackend`]: sign up / sign in / sign out / current user
//! - [`StorageBackend`]: object upload, removal and public URLs
//!
//! [`RestBackend`](super::RestBackend) implements all three over HTTP;
//! [`MemoryBackend`](super::MemoryBackend) implements them in-process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;
use crate::keys::Entity;
use crate::types::{Filter, OrderDirection};

/// A row selection request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub filters: Vec<Filter>,
    pub order: Option<(String, OrderDirection)>,
    /// `(offset, limit)`
    pub range: Option<(u64, u64)>,
    /// Ask the backend for the exact number of matching rows.
    pub count: bool,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn order(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.order = Some((column.into(), direction));
        self
    }

    pub fn range(mut self, offset: u64, limit: u64) -> Self {
        self.range = Some((offset, limit));
        self
    }

    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }
}

/// Rows returned by [`Backend::select`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub rows: Vec<Value>,
    /// Total matching rows before the range was applied, when requested.
    pub count: Option<u64>,
}

/// Table CRUD.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend name for logging/debugging.
    fn name(&self) -> &str;

    async fn select(&self, table: Entity, query: &SelectQuery) -> Result<Selection>;

    /// Insert one row and return it as stored (with generated columns).
    async fn insert(&self, table: Entity, row: Value) -> Result<Value>;

    /// Patch every matching row, returning the updated rows.
    async fn update(&self, table: Entity, filters: &[Filter], patch: Value) -> Result<Vec<Value>>;

    /// Delete every matching row, returning how many were removed.
    async fn delete(&self, table: Entity, filters: &[Filter]) -> Result<u64>;

    /// Install (or clear) the signed-in user's access token.
    ///
    /// Default: no-op, for backends without per-user authorization.
    fn set_access_token(&self, _token: Option<String>) {}
}

/// An authenticated account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

/// Tokens issued on sign-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: AuthUser,
}

/// Result of a sign-up; `session` is `None` while email confirmation is pending.
#[derive(Debug, Clone, PartialEq)]
pub struct SignUp {
    pub user: AuthUser,
    pub session: Option<Session>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Account operations.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_up(&self, credentials: &Credentials, metadata: Value) -> Result<SignUp>;

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session>;

    async fn sign_out(&self, access_token: &str) -> Result<()>;

    async fn current_user(&self, access_token: &str) -> Result<AuthUser>;
}

/// Blob storage operations.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Upload an object; with `upsert == false` an existing object is an error.
    /// Returns the stored object path.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<String>;

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}
