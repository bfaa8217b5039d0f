//! Remote data gateway.
//!
//! A typed, uncached façade over the hosted backend: one [`Repository`] per
//! table, plus [`Auth`] and [`Storage`]. Caching happens one layer up, in
//! [`crate::query`].

mod auth;
mod backend;
mod builder;
mod memory;
mod repository;
mod rest;
mod storage;

use std::sync::Arc;

pub use auth::{Auth, AuthState};
pub use backend::{
    AuthBackend, AuthUser, Backend, Credentials, SelectQuery, Selection, Session, SignUp,
    StorageBackend,
};
pub use builder::GatewayBuilder;
pub use memory::MemoryBackend;
pub use repository::{Record, Repository};
pub use rest::RestBackend;
pub use storage::{Storage, UploadOptions};

use crate::Result;
use crate::types::{
    AboutPage, CoworkingService, Event, Favorite, Profile, Registration, RentSettings, Speaker,
};

/// Typed access to every table, auth and storage.
#[derive(Clone)]
pub struct Gateway {
    data: Arc<dyn Backend>,
    auth: Auth,
    storage: Storage,
}

impl Gateway {
    pub fn new(
        data: Arc<dyn Backend>,
        auth: Arc<dyn AuthBackend>,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            auth: Auth::new(auth, Arc::clone(&data)),
            storage: Storage::new(storage),
            data,
        }
    }

    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Gateway over a hosted project's REST API.
    pub fn rest(url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::builder().rest(url, api_key).build()
    }

    /// Gateway over an in-process backend.
    pub fn memory(backend: Arc<MemoryBackend>) -> Self {
        Self::new(backend.clone(), backend.clone(), backend)
    }

    pub fn backend_name(&self) -> &str {
        self.data.name()
    }

    fn repo<T: Record>(&self) -> Repository<T> {
        Repository::new(Arc::clone(&self.data))
    }

    pub fn events(&self) -> Repository<Event> {
        self.repo()
    }

    pub fn profiles(&self) -> Repository<Profile> {
        self.repo()
    }

    pub fn registrations(&self) -> Repository<Registration> {
        self.repo()
    }

    pub fn speakers(&self) -> Repository<Speaker> {
        self.repo()
    }

    pub fn coworking(&self) -> Repository<CoworkingService> {
        self.repo()
    }

    pub fn rent_settings(&self) -> Repository<RentSettings> {
        self.repo()
    }

    pub fn about(&self) -> Repository<AboutPage> {
        self.repo()
    }

    pub fn favorites(&self) -> Repository<Favorite> {
        self.repo()
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}
