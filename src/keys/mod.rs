//! Cache key registry.
//!
//! Deterministic construction of hierarchical [`CacheKey`]s. Every key starts
//! with an [`Entity`] segment, followed by the query kind and its parameters:
//!
//! ```text
//! [events]                                  all(Events)
//! [events, list]                            list(Events)
//! [events, list, {status=active}]           list_with_params(Events, ..)
//! [events, detail, e1]                      detail(Events, "e1")
//! [favorites, check, u1, ev1]               favorites::check("u1", "ev1")
//! ```
//!
//! Invalidation works by prefix, so the layout decides the blast radius of
//! every rule in [`rules`](crate::rules).

mod key;

pub use key::{CacheKey, ParamValue, Params, Segment};

use serde::{Deserialize, Serialize};

use crate::types::FilterSet;

/// Backend tables and cache namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Events,
    Profiles,
    Users,
    Registrations,
    Speakers,
    CoworkingServices,
    RentSettings,
    AboutPage,
    Favorites,
}

impl Entity {
    /// Table / namespace name as used by the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Events => "events",
            Entity::Profiles => "profiles",
            Entity::Users => "users",
            Entity::Registrations => "registrations",
            Entity::Speakers => "speakers",
            Entity::CoworkingServices => "coworking_services",
            Entity::RentSettings => "rent_settings",
            Entity::AboutPage => "about_page",
            Entity::Favorites => "favorites",
        }
    }

    /// Human-readable singular resource name for error messages.
    pub fn resource(&self) -> &'static str {
        match self {
            Entity::Events => "event",
            Entity::Profiles | Entity::Users => "profile",
            Entity::Registrations => "registration",
            Entity::Speakers => "speaker",
            Entity::CoworkingServices => "coworking service",
            Entity::RentSettings => "rent settings",
            Entity::AboutPage => "about page",
            Entity::Favorites => "favorite",
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const LIST: &str = "list";
const DETAIL: &str = "detail";

/// `[entity]`: ancestor of every key for the entity.
pub fn all(entity: Entity) -> CacheKey {
    CacheKey::root().with(entity.as_str())
}

/// `[entity, list]`: ancestor of every list variant.
pub fn list(entity: Entity) -> CacheKey {
    all(entity).with(LIST)
}

/// `[entity, list, params]` with normalized parameters.
pub fn list_with_params(entity: Entity, params: Params) -> CacheKey {
    list(entity).with(params)
}

/// List key for a typed filter union.
pub fn filtered<F: FilterSet>(entity: Entity, filters: &F) -> CacheKey {
    list_with_params(entity, filters.to_params())
}

/// Free-text search results; lives under `list` so list invalidation covers it.
pub fn search(entity: Entity, term: &str) -> CacheKey {
    list_with_params(entity, Params::new().set("search", Some(term.trim())))
}

/// `[entity, detail, id]`
pub fn detail(entity: Entity, id: &str) -> CacheKey {
    all(entity).with(DETAIL).with(id)
}

/// Event-specific list shapes.
pub mod events {
    use super::{CacheKey, Entity, list};

    pub fn featured() -> CacheKey {
        list(Entity::Events).with("featured")
    }

    pub fn upcoming(limit: u32) -> CacheKey {
        list(Entity::Events).with("upcoming").with(limit)
    }
}

/// Favorite lookups.
pub mod favorites {
    use super::{CacheKey, Entity, all};

    /// All favorites of one user.
    pub fn user(user_id: &str) -> CacheKey {
        all(Entity::Favorites).with("user").with(user_id)
    }

    /// Whether one user favorited one event.
    pub fn check(user_id: &str, event_id: &str) -> CacheKey {
        all(Entity::Favorites)
            .with("check")
            .with(user_id)
            .with(event_id)
    }
}

/// Registration lookups.
pub mod registrations {
    use super::{CacheKey, Entity, all};

    /// Registrations for one event.
    pub fn event(event_id: &str) -> CacheKey {
        all(Entity::Registrations).with("event").with(event_id)
    }
}

/// Per-user views.
pub mod users {
    use super::{CacheKey, Entity, all};

    /// Registrations made by one user.
    pub fn registrations(user_id: &str) -> CacheKey {
        all(Entity::Users).with("registrations").with(user_id)
    }
}
