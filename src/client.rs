//! Cached venue client.
//!
//! [`VenueClient`] ties the [`Gateway`], a [`QueryCache`] and the
//! [`rules`](crate::rules) table together. Every read exists in two forms:
//! `events(..)` registers a [`QueryObserver`], `events_now(..)` resolves once
//! through [`QueryCache::fetch_query`]. Every write runs as a mutation and
//! applies its [`Write`] effects on success.
//!
//! ```rust,no_run
//! # async fn demo() -> huginn::Result<()> {
//! use std::sync::Arc;
//! use huginn::{Gateway, MemoryBackend, QueryCache, VenueClient};
//! use huginn::types::PageOptions;
//!
//! let client = VenueClient::new(
//!     Gateway::memory(Arc::new(MemoryBackend::new())),
//!     QueryCache::default(),
//! );
//! let page = client.events_now(PageOptions::default()).await?;
//! println!("{} events", page.count);
//! # Ok(())
//! # }
//! ```

use std::future::Future;

use crate::gateway::Gateway;
use crate::keys::{self, CacheKey, Entity};
use crate::query::{MutationDescriptor, QueryCache, QueryDescriptor, QueryObserver};
use crate::rules::Write;
use crate::types::{
    AboutPage, AboutPageInput, CoworkingFilters, CoworkingService, CoworkingServiceInput, Event,
    EventFilters, EventInput, Favorite, Page, PageOptions, Profile, ProfileInput, Registration,
    RegistrationInput, RentSettings, RentSettingsInput, Speaker, SpeakerFilters, SpeakerInput,
};
use crate::webhooks::{ArchiveReport, WebhookClient};
use crate::{HuginnError, Result};

/// Gateway + cache + invalidation rules.
#[derive(Clone)]
pub struct VenueClient {
    gateway: Gateway,
    cache: QueryCache,
    webhooks: Option<WebhookClient>,
}

impl VenueClient {
    pub fn new(gateway: Gateway, cache: QueryCache) -> Self {
        Self {
            gateway,
            cache,
            webhooks: None,
        }
    }

    /// Enable `archive_events` and `save_event`.
    pub fn with_webhooks(mut self, webhooks: WebhookClient) -> Self {
        self.webhooks = Some(webhooks);
        self
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    fn webhooks(&self) -> Result<&WebhookClient> {
        self.webhooks
            .as_ref()
            .ok_or_else(|| HuginnError::Configuration("webhooks are not configured".into()))
    }

    /// Run `op` as a named mutation, applying `write`'s effects on success.
    async fn write<I, O, F, Fut, W>(&self, name: &str, input: I, op: F, write: W) -> Result<O>
    where
        I: Clone + Send + Sync + 'static,
        O: Send + Sync + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
        W: Fn(&O, &I) -> Write + Send + Sync + 'static,
    {
        let descriptor = MutationDescriptor::new(name, op)
            .on_success(move |cache, output, input| cache.apply_write(&write(output, input)));
        self.cache.mutate(&descriptor, input).await
    }

    // ========================================================================
    // Query descriptors
    // ========================================================================

    pub fn events_query(&self, options: PageOptions<EventFilters>) -> QueryDescriptor<Page<Event>> {
        let repo = self.gateway.events();
        let key = keys::list_with_params(Entity::Events, options.to_params());
        QueryDescriptor::new(key, move || {
            let (repo, options) = (repo.clone(), options.clone());
            async move { repo.get_all(&options).await }
        })
    }

    pub fn event_query(&self, id: &str) -> QueryDescriptor<Event> {
        let repo = self.gateway.events();
        let id = id.to_string();
        QueryDescriptor::new(keys::detail(Entity::Events, &id), move || {
            let (repo, id) = (repo.clone(), id.clone());
            async move { repo.get_by_id(&id).await }
        })
    }

    pub fn featured_events_query(&self) -> QueryDescriptor<Vec<Event>> {
        let repo = self.gateway.events();
        QueryDescriptor::new(keys::events::featured(), move || {
            let repo = repo.clone();
            async move { repo.featured().await }
        })
    }

    pub fn upcoming_events_query(&self, limit: u32) -> QueryDescriptor<Vec<Event>> {
        let repo = self.gateway.events();
        QueryDescriptor::new(keys::events::upcoming(limit), move || {
            let repo = repo.clone();
            async move { repo.upcoming(limit).await }
        })
    }

    pub fn search_events_query(&self, term: &str) -> QueryDescriptor<Vec<Event>> {
        let repo = self.gateway.events();
        let term = term.trim().to_string();
        let enabled = !term.is_empty();
        QueryDescriptor::new(keys::search(Entity::Events, &term), move || {
            let (repo, term) = (repo.clone(), term.clone());
            async move { repo.search(&term).await }
        })
        .enabled(enabled)
    }

    pub fn speakers_query(
        &self,
        options: PageOptions<SpeakerFilters>,
    ) -> QueryDescriptor<Page<Speaker>> {
        let repo = self.gateway.speakers();
        let key = keys::list_with_params(Entity::Speakers, options.to_params());
        QueryDescriptor::new(key, move || {
            let (repo, options) = (repo.clone(), options.clone());
            async move { repo.get_all(&options).await }
        })
    }

    pub fn speaker_query(&self, id: &str) -> QueryDescriptor<Speaker> {
        let repo = self.gateway.speakers();
        let id = id.to_string();
        QueryDescriptor::new(keys::detail(Entity::Speakers, &id), move || {
            let (repo, id) = (repo.clone(), id.clone());
            async move { repo.get_by_id(&id).await }
        })
    }

    pub fn coworking_services_query(
        &self,
        options: PageOptions<CoworkingFilters>,
    ) -> QueryDescriptor<Page<CoworkingService>> {
        let repo = self.gateway.coworking();
        let key = keys::list_with_params(Entity::CoworkingServices, options.to_params());
        QueryDescriptor::new(key, move || {
            let (repo, options) = (repo.clone(), options.clone());
            async move { repo.get_all(&options).await }
        })
    }

    pub fn rent_settings_query(&self) -> QueryDescriptor<RentSettings> {
        let repo = self.gateway.rent_settings();
        QueryDescriptor::new(keys::all(Entity::RentSettings), move || {
            let repo = repo.clone();
            async move { repo.get().await }
        })
    }

    pub fn about_page_query(&self) -> QueryDescriptor<AboutPage> {
        let repo = self.gateway.about();
        QueryDescriptor::new(keys::all(Entity::AboutPage), move || {
            let repo = repo.clone();
            async move { repo.get().await }
        })
    }

    pub fn event_registrations_query(&self, event_id: &str) -> QueryDescriptor<Vec<Registration>> {
        let repo = self.gateway.registrations();
        let event_id = event_id.to_string();
        QueryDescriptor::new(keys::registrations::event(&event_id), move || {
            let (repo, event_id) = (repo.clone(), event_id.clone());
            async move { repo.for_event(&event_id).await }
        })
    }

    pub fn user_registrations_query(&self, user_id: &str) -> QueryDescriptor<Vec<Registration>> {
        let repo = self.gateway.registrations();
        let user_id = user_id.to_string();
        QueryDescriptor::new(keys::users::registrations(&user_id), move || {
            let (repo, user_id) = (repo.clone(), user_id.clone());
            async move { repo.for_user(&user_id).await }
        })
    }

    pub fn user_favorites_query(&self, user_id: &str) -> QueryDescriptor<Vec<Favorite>> {
        let repo = self.gateway.favorites();
        let user_id = user_id.to_string();
        QueryDescriptor::new(keys::favorites::user(&user_id), move || {
            let (repo, user_id) = (repo.clone(), user_id.clone());
            async move { repo.for_user(&user_id).await }
        })
    }

    pub fn is_favorite_query(&self, user_id: &str, event_id: &str) -> QueryDescriptor<bool> {
        let repo = self.gateway.favorites();
        let (user_id, event_id) = (user_id.to_string(), event_id.to_string());
        QueryDescriptor::new(keys::favorites::check(&user_id, &event_id), move || {
            let (repo, user_id, event_id) = (repo.clone(), user_id.clone(), event_id.clone());
            async move { repo.is_favorite(&user_id, &event_id).await }
        })
    }

    pub fn profile_query(&self, id: &str) -> QueryDescriptor<Profile> {
        let repo = self.gateway.profiles();
        let id = id.to_string();
        QueryDescriptor::new(keys::detail(Entity::Profiles, &id), move || {
            let (repo, id) = (repo.clone(), id.clone());
            async move { repo.get_by_id(&id).await }
        })
    }

    // ========================================================================
    // Observed queries
    // ========================================================================

    pub fn events(&self, options: PageOptions<EventFilters>) -> Result<QueryObserver<Page<Event>>> {
        self.cache.subscribe(self.events_query(options))
    }

    pub fn event(&self, id: &str) -> Result<QueryObserver<Event>> {
        self.cache.subscribe(self.event_query(id))
    }

    pub fn featured_events(&self) -> Result<QueryObserver<Vec<Event>>> {
        self.cache.subscribe(self.featured_events_query())
    }

    pub fn upcoming_events(&self, limit: u32) -> Result<QueryObserver<Vec<Event>>> {
        self.cache.subscribe(self.upcoming_events_query(limit))
    }

    pub fn search_events(&self, term: &str) -> Result<QueryObserver<Vec<Event>>> {
        self.cache.subscribe(self.search_events_query(term))
    }

    pub fn speakers(
        &self,
        options: PageOptions<SpeakerFilters>,
    ) -> Result<QueryObserver<Page<Speaker>>> {
        self.cache.subscribe(self.speakers_query(options))
    }

    pub fn speaker(&self, id: &str) -> Result<QueryObserver<Speaker>> {
        self.cache.subscribe(self.speaker_query(id))
    }

    pub fn coworking_services(
        &self,
        options: PageOptions<CoworkingFilters>,
    ) -> Result<QueryObserver<Page<CoworkingService>>> {
        self.cache.subscribe(self.coworking_services_query(options))
    }

    pub fn rent_settings(&self) -> Result<QueryObserver<RentSettings>> {
        self.cache.subscribe(self.rent_settings_query())
    }

    pub fn about_page(&self) -> Result<QueryObserver<AboutPage>> {
        self.cache.subscribe(self.about_page_query())
    }

    pub fn event_registrations(&self, event_id: &str) -> Result<QueryObserver<Vec<Registration>>> {
        self.cache.subscribe(self.event_registrations_query(event_id))
    }

    pub fn user_registrations(&self, user_id: &str) -> Result<QueryObserver<Vec<Registration>>> {
        self.cache.subscribe(self.user_registrations_query(user_id))
    }

    pub fn user_favorites(&self, user_id: &str) -> Result<QueryObserver<Vec<Favorite>>> {
        self.cache.subscribe(self.user_favorites_query(user_id))
    }

    pub fn is_favorite(&self, user_id: &str, event_id: &str) -> Result<QueryObserver<bool>> {
        self.cache.subscribe(self.is_favorite_query(user_id, event_id))
    }

    pub fn profile(&self, id: &str) -> Result<QueryObserver<Profile>> {
        self.cache.subscribe(self.profile_query(id))
    }

    // ========================================================================
    // One-shot reads
    // ========================================================================

    pub async fn events_now(&self, options: PageOptions<EventFilters>) -> Result<Page<Event>> {
        self.cache.fetch_query(&self.events_query(options)).await
    }

    pub async fn event_now(&self, id: &str) -> Result<Event> {
        self.cache.fetch_query(&self.event_query(id)).await
    }

    pub async fn featured_events_now(&self) -> Result<Vec<Event>> {
        self.cache.fetch_query(&self.featured_events_query()).await
    }

    pub async fn upcoming_events_now(&self, limit: u32) -> Result<Vec<Event>> {
        self.cache.fetch_query(&self.upcoming_events_query(limit)).await
    }

    pub async fn speakers_now(&self, options: PageOptions<SpeakerFilters>) -> Result<Page<Speaker>> {
        self.cache.fetch_query(&self.speakers_query(options)).await
    }

    pub async fn speaker_now(&self, id: &str) -> Result<Speaker> {
        self.cache.fetch_query(&self.speaker_query(id)).await
    }

    pub async fn coworking_services_now(
        &self,
        options: PageOptions<CoworkingFilters>,
    ) -> Result<Page<CoworkingService>> {
        self.cache.fetch_query(&self.coworking_services_query(options)).await
    }

    pub async fn rent_settings_now(&self) -> Result<RentSettings> {
        self.cache.fetch_query(&self.rent_settings_query()).await
    }

    pub async fn about_page_now(&self) -> Result<AboutPage> {
        self.cache.fetch_query(&self.about_page_query()).await
    }

    pub async fn event_registrations_now(&self, event_id: &str) -> Result<Vec<Registration>> {
        self.cache
            .fetch_query(&self.event_registrations_query(event_id))
            .await
    }

    pub async fn user_registrations_now(&self, user_id: &str) -> Result<Vec<Registration>> {
        self.cache
            .fetch_query(&self.user_registrations_query(user_id))
            .await
    }

    pub async fn user_favorites_now(&self, user_id: &str) -> Result<Vec<Favorite>> {
        self.cache.fetch_query(&self.user_favorites_query(user_id)).await
    }

    pub async fn is_favorite_now(&self, user_id: &str, event_id: &str) -> Result<bool> {
        self.cache
            .fetch_query(&self.is_favorite_query(user_id, event_id))
            .await
    }

    pub async fn profile_now(&self, id: &str) -> Result<Profile> {
        self.cache.fetch_query(&self.profile_query(id)).await
    }

    /// Warm the detail entry for an event before it is shown.
    pub async fn prefetch_event(&self, id: &str) -> Result<()> {
        self.cache.prefetch(&self.event_query(id)).await
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub async fn create_event(&self, input: EventInput) -> Result<Event> {
        let repo = self.gateway.events();
        self.write(
            "create_event",
            input,
            move |input: EventInput| {
                let repo = repo.clone();
                async move { repo.create(&input).await }
            },
            |_, _| Write::EventCreated,
        )
        .await
    }

    pub async fn update_event(&self, id: &str, input: EventInput) -> Result<Event> {
        let repo = self.gateway.events();
        let id = id.to_string();
        self.write(
            "update_event",
            input,
            move |input: EventInput| {
                let (repo, id) = (repo.clone(), id.clone());
                async move { repo.update(&id, &input).await }
            },
            |event: &Event, _| Write::EventUpdated(event.clone()),
        )
        .await
    }

    pub async fn delete_event(&self, id: &str) -> Result<()> {
        let repo = self.gateway.events();
        self.write(
            "delete_event",
            id.to_string(),
            move |id: String| {
                let repo = repo.clone();
                async move { repo.delete(&id).await }
            },
            |_, id: &String| Write::EventDeleted { id: id.clone() },
        )
        .await
    }

    /// Flip a favorite; returns whether the event is now a favorite.
    pub async fn toggle_favorite(&self, user_id: &str, event_id: &str) -> Result<bool> {
        let repo = self.gateway.favorites();
        self.write(
            "toggle_favorite",
            (user_id.to_string(), event_id.to_string()),
            move |(user_id, event_id): (String, String)| {
                let repo = repo.clone();
                async move { repo.toggle(&user_id, &event_id).await }
            },
            |now_favorite: &bool, (user_id, event_id): &(String, String)| Write::FavoriteToggled {
                user_id: user_id.clone(),
                event_id: event_id.clone(),
                now_favorite: *now_favorite,
            },
        )
        .await
    }

    pub async fn register(&self, input: RegistrationInput) -> Result<Registration> {
        let repo = self.gateway.registrations();
        self.write(
            "register",
            input,
            move |input: RegistrationInput| {
                let repo = repo.clone();
                async move { repo.create(&input).await }
            },
            |_, input: &RegistrationInput| Write::RegistrationCreated {
                event_id: input.event_id.clone(),
                user_id: input.user_id.clone(),
            },
        )
        .await
    }

    pub async fn cancel_registration(&self, id: &str) -> Result<Registration> {
        let repo = self.gateway.registrations();
        self.write(
            "cancel_registration",
            id.to_string(),
            move |id: String| {
                let repo = repo.clone();
                async move { repo.cancel(&id).await }
            },
            |registration: &Registration, _| Write::RegistrationCancelled(registration.clone()),
        )
        .await
    }

    pub async fn update_profile(&self, id: &str, input: ProfileInput) -> Result<Profile> {
        let repo = self.gateway.profiles();
        let id = id.to_string();
        self.write(
            "update_profile",
            input,
            move |input: ProfileInput| {
                let (repo, id) = (repo.clone(), id.clone());
                async move { repo.update(&id, &input).await }
            },
            |profile: &Profile, _| Write::ProfileUpdated(profile.clone()),
        )
        .await
    }

    pub async fn create_speaker(&self, input: SpeakerInput) -> Result<Speaker> {
        let repo = self.gateway.speakers();
        self.write(
            "create_speaker",
            input,
            move |input: SpeakerInput| {
                let repo = repo.clone();
                async move { repo.create(&input).await }
            },
            |_, _| Write::SpeakerCreated,
        )
        .await
    }

    pub async fn update_speaker(&self, id: &str, input: SpeakerInput) -> Result<Speaker> {
        let repo = self.gateway.speakers();
        let id = id.to_string();
        self.write(
            "update_speaker",
            input,
            move |input: SpeakerInput| {
                let (repo, id) = (repo.clone(), id.clone());
                async move { repo.update(&id, &input).await }
            },
            |speaker: &Speaker, _| Write::SpeakerUpdated(speaker.clone()),
        )
        .await
    }

    pub async fn delete_speaker(&self, id: &str) -> Result<()> {
        let repo = self.gateway.speakers();
        self.write(
            "delete_speaker",
            id.to_string(),
            move |id: String| {
                let repo = repo.clone();
                async move { repo.delete(&id).await }
            },
            |_, id: &String| Write::SpeakerDeleted { id: id.clone() },
        )
        .await
    }

    pub async fn create_coworking_service(
        &self,
        input: CoworkingServiceInput,
    ) -> Result<CoworkingService> {
        let repo = self.gateway.coworking();
        self.write(
            "create_coworking_service",
            input,
            move |input: CoworkingServiceInput| {
                let repo = repo.clone();
                async move { repo.create(&input).await }
            },
            |_, _| Write::CoworkingCreated,
        )
        .await
    }

    pub async fn update_coworking_service(
        &self,
        id: &str,
        input: CoworkingServiceInput,
    ) -> Result<CoworkingService> {
        let repo = self.gateway.coworking();
        let id = id.to_string();
        self.write(
            "update_coworking_service",
            input,
            move |input: CoworkingServiceInput| {
                let (repo, id) = (repo.clone(), id.clone());
                async move { repo.update(&id, &input).await }
            },
            |service: &CoworkingService, _| Write::CoworkingUpdated(service.clone()),
        )
        .await
    }

    pub async fn delete_coworking_service(&self, id: &str) -> Result<()> {
        let repo = self.gateway.coworking();
        self.write(
            "delete_coworking_service",
            id.to_string(),
            move |id: String| {
                let repo = repo.clone();
                async move { repo.delete(&id).await }
            },
            |_, id: &String| Write::CoworkingDeleted { id: id.clone() },
        )
        .await
    }

    pub async fn update_rent_settings(&self, input: RentSettingsInput) -> Result<RentSettings> {
        let repo = self.gateway.rent_settings();
        self.write(
            "update_rent_settings",
            input,
            move |input: RentSettingsInput| {
                let repo = repo.clone();
                async move { repo.save(&input).await }
            },
            |settings: &RentSettings, _| Write::RentSettingsUpdated(settings.clone()),
        )
        .await
    }

    pub async fn update_about_page(&self, input: AboutPageInput) -> Result<AboutPage> {
        let repo = self.gateway.about();
        self.write(
            "update_about_page",
            input,
            move |input: AboutPageInput| {
                let repo = repo.clone();
                async move { repo.save(&input).await }
            },
            |page: &AboutPage, _| Write::AboutPageUpdated(page.clone()),
        )
        .await
    }

    /// Run the archival sweep and refresh every event view.
    pub async fn archive_events(&self) -> Result<ArchiveReport> {
        let webhooks = self.webhooks()?.clone();
        self.write(
            "archive_events",
            (),
            move |()| {
                let webhooks = webhooks.clone();
                async move { webhooks.archive_sweep().await }
            },
            |_, _| Write::EventsArchived,
        )
        .await
    }

    /// Save an event through the privileged webhook.
    pub async fn save_event(&self, input: EventInput, is_new: bool) -> Result<Event> {
        let webhooks = self.webhooks()?.clone();
        self.write(
            "save_event",
            input,
            move |input: EventInput| {
                let webhooks = webhooks.clone();
                async move { webhooks.save_event(&input, is_new).await }
            },
            move |event: &Event, _| {
                if is_new {
                    Write::EventCreated
                } else {
                    Write::EventUpdated(event.clone())
                }
            },
        )
        .await
    }

    /// Sign out and drop every cached entry, even if the backend call fails.
    pub async fn sign_out(&self) -> Result<()> {
        let result = self.gateway.auth().sign_out().await;
        self.cache.apply_write(&Write::SignedOut)?;
        result
    }
}

/// Key of the cached event list for `options`, for callers that patch or
/// read the cache directly.
pub fn events_key(options: &PageOptions<EventFilters>) -> CacheKey {
    keys::list_with_params(Entity::Events, options.to_params())
}
