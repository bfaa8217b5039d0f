//! Typed table repositories.
//!
//! [`Repository<T>`] turns a [`Record`] type into get-all / get-by-id /
//! create / update / delete calls against a [`Backend`]. Entity-specific
//! queries live in inherent `impl Repository<Event>` (etc.) blocks below.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::backend::{Backend, SelectQuery};
use crate::keys::Entity;
use crate::types::{
    AboutPage, AboutPageInput, CoworkingFilters, CoworkingService, CoworkingServiceInput, Event,
    EventFilters, EventInput, EventStatus, Favorite, FavoriteInput, Filter, FilterSet, NoFilters,
    OrderDirection, Page, PageOptions, Profile, ProfileInput, Registration, RegistrationFilters,
    RegistrationInput, RegistrationStatus, RentSettings, RentSettingsInput, Speaker,
    SpeakerFilters, SpeakerInput, validate_event_create, validate_event_update,
    validate_registration,
};
use crate::{HuginnError, Result};

/// A row type stored in one backend table.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const ENTITY: Entity;

    /// Create / partial-update payload.
    type Input: Serialize + Send + Sync;

    /// Filter union accepted by `get_all`.
    type Filters: FilterSet + Default;

    fn id(&self) -> &str;

    /// Order applied when the caller does not pick one.
    fn default_order() -> Option<(&'static str, OrderDirection)> {
        None
    }

    fn validate_create(_input: &Self::Input) -> Result<()> {
        Ok(())
    }

    fn validate_update(_input: &Self::Input) -> Result<()> {
        Ok(())
    }
}

impl Record for Event {
    const ENTITY: Entity = Entity::Events;
    type Input = EventInput;
    type Filters = EventFilters;

    fn id(&self) -> &str {
        &self.id
    }

    fn default_order() -> Option<(&'static str, OrderDirection)> {
        Some(("start_date", OrderDirection::Asc))
    }

    fn validate_create(input: &EventInput) -> Result<()> {
        validate_event_create(input, Utc::now())
    }

    fn validate_update(input: &EventInput) -> Result<()> {
        validate_event_update(input, Utc::now())
    }
}

impl Record for Profile {
    const ENTITY: Entity = Entity::Profiles;
    type Input = ProfileInput;
    type Filters = NoFilters;

    fn id(&self) -> &str {
        &self.id
    }

    fn default_order() -> Option<(&'static str, OrderDirection)> {
        Some(("created_at", OrderDirection::Desc))
    }
}

impl Record for Registration {
    const ENTITY: Entity = Entity::Registrations;
    type Input = RegistrationInput;
    type Filters = RegistrationFilters;

    fn id(&self) -> &str {
        &self.id
    }

    fn default_order() -> Option<(&'static str, OrderDirection)> {
        Some(("created_at", OrderDirection::Desc))
    }

    fn validate_create(input: &RegistrationInput) -> Result<()> {
        validate_registration(input)
    }
}

impl Record for Speaker {
    const ENTITY: Entity = Entity::Speakers;
    type Input = SpeakerInput;
    type Filters = SpeakerFilters;

    fn id(&self) -> &str {
        &self.id
    }

    fn default_order() -> Option<(&'static str, OrderDirection)> {
        Some(("name", OrderDirection::Asc))
    }

    fn validate_create(input: &SpeakerInput) -> Result<()> {
        match input.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Ok(()),
            _ => Err(HuginnError::validation("name", "is required")),
        }
    }
}

impl Record for CoworkingService {
    const ENTITY: Entity = Entity::CoworkingServices;
    type Input = CoworkingServiceInput;
    type Filters = CoworkingFilters;

    fn id(&self) -> &str {
        &self.id
    }

    fn default_order() -> Option<(&'static str, OrderDirection)> {
        Some(("sort_order", OrderDirection::Asc))
    }

    fn validate_create(input: &CoworkingServiceInput) -> Result<()> {
        match input.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => {}
            _ => return Err(HuginnError::validation("name", "is required")),
        }
        Self::validate_update(input)
    }

    fn validate_update(input: &CoworkingServiceInput) -> Result<()> {
        match input.price {
            Some(price) if price < 0.0 => {
                Err(HuginnError::validation("price", "must not be negative"))
            }
            _ => Ok(()),
        }
    }
}

impl Record for RentSettings {
    const ENTITY: Entity = Entity::RentSettings;
    type Input = RentSettingsInput;
    type Filters = NoFilters;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for AboutPage {
    const ENTITY: Entity = Entity::AboutPage;
    type Input = AboutPageInput;
    type Filters = NoFilters;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Favorite {
    const ENTITY: Entity = Entity::Favorites;
    type Input = FavoriteInput;
    type Filters = NoFilters;

    fn id(&self) -> &str {
        &self.id
    }

    fn default_order() -> Option<(&'static str, OrderDirection)> {
        Some(("created_at", OrderDirection::Desc))
    }
}

fn decode<T: DeserializeOwned>(row: Value) -> Result<T> {
    Ok(serde_json::from_value(row)?)
}

fn decode_all<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter().map(decode).collect()
}

/// CRUD access to the table behind `T`.
pub struct Repository<T> {
    backend: Arc<dyn Backend>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            _record: PhantomData,
        }
    }
}

impl<T: Record> Repository<T> {
    pub(crate) fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            _record: PhantomData,
        }
    }

    fn entity(&self) -> Entity {
        T::ENTITY
    }

    fn id_filter(id: &str) -> Vec<Filter> {
        vec![Filter::eq("id", id)]
    }

    fn ordered(query: SelectQuery, order_by: Option<&str>, direction: OrderDirection) -> SelectQuery {
        match (order_by, T::default_order()) {
            (Some(column), _) => query.order(column, direction),
            (None, Some((column, default_direction))) => query.order(column, default_direction),
            (None, None) => query,
        }
    }

    /// One page of rows with the exact total count.
    pub async fn get_all(&self, options: &PageOptions<T::Filters>) -> Result<Page<T>> {
        options.validate()?;
        let query = SelectQuery::new()
            .filters(options.filters.predicates())
            .range(options.offset(), u64::from(options.limit))
            .with_count();
        let query = Self::ordered(query, options.order_by.as_deref(), options.order_direction);

        let selection = self.backend.select(self.entity(), &query).await?;
        let returned = selection.rows.len() as u64;
        let data = decode_all(selection.rows)?;
        Ok(Page::new(
            data,
            selection.count.unwrap_or(options.offset() + returned),
            options.page,
            options.limit,
        ))
    }

    /// Every matching row, unpaginated.
    pub async fn list(&self, filters: &T::Filters) -> Result<Vec<T>> {
        let query = Self::ordered(
            SelectQuery::new().filters(filters.predicates()),
            None,
            OrderDirection::Asc,
        );
        let selection = self.backend.select(self.entity(), &query).await?;
        decode_all(selection.rows)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<T>> {
        let query = SelectQuery::new().filters(Self::id_filter(id)).range(0, 1);
        let selection = self.backend.select(self.entity(), &query).await?;
        selection.rows.into_iter().next().map(decode).transpose()
    }

    /// Fetch one row; a missing row is [`HuginnError::NotFound`].
    pub async fn get_by_id(&self, id: &str) -> Result<T> {
        match self.find_by_id(id).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) | Err(HuginnError::NotFound { .. }) => {
                Err(HuginnError::not_found(self.entity().resource(), id))
            }
            Err(e) => Err(e),
        }
    }

    /// Validate and insert.
    pub async fn create(&self, input: &T::Input) -> Result<T> {
        T::validate_create(input)?;
        let row = serde_json::to_value(input)?;
        let stored = self.backend.insert(self.entity(), row).await?;
        let record: T = decode(stored)?;
        debug!(entity = %self.entity(), id = record.id(), "created");
        Ok(record)
    }

    /// Validate and patch one row.
    pub async fn update(&self, id: &str, input: &T::Input) -> Result<T> {
        T::validate_update(input)?;
        let patch = serde_json::to_value(input)?;
        self.patch(id, patch).await
    }

    /// Patch one row with raw JSON, bypassing input validation.
    pub(crate) async fn patch(&self, id: &str, patch: Value) -> Result<T> {
        let rows = self
            .backend
            .update(self.entity(), &Self::id_filter(id), patch)
            .await?;
        match rows.into_iter().next() {
            Some(row) => decode(row),
            None => Err(HuginnError::not_found(self.entity().resource(), id)),
        }
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let removed = self
            .backend
            .delete(self.entity(), &Self::id_filter(id))
            .await?;
        if removed == 0 {
            return Err(HuginnError::not_found(self.entity().resource(), id));
        }
        debug!(entity = %self.entity(), id, "deleted");
        Ok(())
    }
}

// ============================================================================
// Events
// ============================================================================

impl Repository<Event> {
    /// Active events flagged as featured, soonest first.
    pub async fn featured(&self) -> Result<Vec<Event>> {
        self.list(&EventFilters {
            status: Some(EventStatus::Active),
            featured: Some(true),
            ..Default::default()
        })
        .await
    }

    /// The next `limit` active events that have not started yet.
    pub async fn upcoming(&self, limit: u32) -> Result<Vec<Event>> {
        let options = PageOptions::new(EventFilters {
            status: Some(EventStatus::Active),
            starts_after: Some(Utc::now()),
            ..Default::default()
        })
        .limit(limit.max(1));
        Ok(self.get_all(&options).await?.data)
    }

    /// Title search across all statuses.
    pub async fn search(&self, term: &str) -> Result<Vec<Event>> {
        self.list(&EventFilters {
            search: Some(term.to_string()),
            ..Default::default()
        })
        .await
    }
}

// ============================================================================
// Registrations
// ============================================================================

impl Repository<Registration> {
    pub async fn for_event(&self, event_id: &str) -> Result<Vec<Registration>> {
        self.list(&RegistrationFilters {
            event_id: Some(event_id.to_string()),
            ..Default::default()
        })
        .await
    }

    pub async fn for_user(&self, user_id: &str) -> Result<Vec<Registration>> {
        self.list(&RegistrationFilters {
            user_id: Some(user_id.to_string()),
            ..Default::default()
        })
        .await
    }

    /// Mark a registration cancelled.
    pub async fn cancel(&self, id: &str) -> Result<Registration> {
        self.patch(
            id,
            serde_json::json!({ "status": RegistrationStatus::Cancelled.as_str() }),
        )
        .await
    }
}

// ============================================================================
// Favorites
// ============================================================================

impl Repository<Favorite> {
    fn pair(user_id: &str, event_id: &str) -> Vec<Filter> {
        vec![
            Filter::eq("user_id", user_id),
            Filter::eq("event_id", event_id),
        ]
    }

    pub async fn for_user(&self, user_id: &str) -> Result<Vec<Favorite>> {
        let query = SelectQuery::new()
            .filter(Filter::eq("user_id", user_id))
            .order("created_at", OrderDirection::Desc);
        let selection = self.backend.select(Entity::Favorites, &query).await?;
        decode_all(selection.rows)
    }

    pub async fn is_favorite(&self, user_id: &str, event_id: &str) -> Result<bool> {
        let query = SelectQuery::new()
            .filters(Self::pair(user_id, event_id))
            .range(0, 1);
        let selection = self.backend.select(Entity::Favorites, &query).await?;
        Ok(!selection.rows.is_empty())
    }

    /// Flip the favorite flag and return the new value.
    pub async fn toggle(&self, user_id: &str, event_id: &str) -> Result<bool> {
        if self.is_favorite(user_id, event_id).await? {
            self.backend
                .delete(Entity::Favorites, &Self::pair(user_id, event_id))
                .await?;
            Ok(false)
        } else {
            let input = FavoriteInput {
                user_id: user_id.to_string(),
                event_id: event_id.to_string(),
            };
            self.backend
                .insert(Entity::Favorites, serde_json::to_value(&input)?)
                .await?;
            Ok(true)
        }
    }
}

// ============================================================================
// Singleton tables
// ============================================================================

async fn first_row<T: Record>(repo: &Repository<T>) -> Result<Option<T>> {
    let query = SelectQuery::new().range(0, 1);
    let selection = repo.backend.select(T::ENTITY, &query).await?;
    selection.rows.into_iter().next().map(decode).transpose()
}

async fn upsert_singleton<T: Record>(repo: &Repository<T>, input: &T::Input) -> Result<T> {
    T::validate_update(input)?;
    match first_row(repo).await? {
        Some(current) => repo.patch(current.id(), serde_json::to_value(input)?).await,
        None => {
            let stored = repo
                .backend
                .insert(T::ENTITY, serde_json::to_value(input)?)
                .await?;
            decode(stored)
        }
    }
}

impl Repository<RentSettings> {
    /// The single settings row.
    pub async fn get(&self) -> Result<RentSettings> {
        first_row(self)
            .await?
            .ok_or_else(|| HuginnError::not_found(Entity::RentSettings.resource(), "current"))
    }

    /// Update the settings row, creating it on first save.
    pub async fn save(&self, input: &RentSettingsInput) -> Result<RentSettings> {
        upsert_singleton(self, input).await
    }
}

impl Repository<AboutPage> {
    pub async fn get(&self) -> Result<AboutPage> {
        first_row(self)
            .await?
            .ok_or_else(|| HuginnError::not_found(Entity::AboutPage.resource(), "current"))
    }

    pub async fn save(&self, input: &AboutPageInput) -> Result<AboutPage> {
        upsert_singleton(self, input).await
    }
}
