//! Invalidation rules.
//!
//! Every write the client performs maps to a fixed [`MutationEffects`]:
//! entries to patch with the write's authoritative result, entries to remove,
//! and key prefixes to invalidate. Lists and other aggregate views are always
//! invalidated, since a single write cannot rebuild a filtered, paginated list.
//!
//! | Write | Patches | Removes | Invalidates |
//! |---|---|---|---|
//! | event created | | | `[events]` |
//! | event updated | event detail | | `[events, list]` |
//! | event deleted | | event detail | `[events, list]`, `[favorites]`, event registrations |
//! | events archived | | | `[events]` |
//! | favorite toggled | favorite check | | user favorites |
//! | registration created | | | event registrations, user registrations |
//! | registration cancelled | registration detail | | event registrations, user registrations |
//! | profile updated | profile detail | | `[profiles, list]` |
//! | speaker / coworking created | | | `[entity]` |
//! | speaker / coworking updated | detail | | `[entity, list]` |
//! | speaker / coworking deleted | | detail | `[entity, list]` |
//! | rent settings / about page updated | `[entity]` | | |
//! | signed out | | everything | |

use std::sync::Arc;

use tracing::debug;

use crate::Result;
use crate::keys::{self, CacheKey, Entity};
use crate::query::{AnyValue, QueryCache};
use crate::types::{AboutPage, CoworkingService, Event, Profile, Registration, RentSettings, Speaker};

/// A value to write directly into one cache entry.
#[derive(Clone)]
pub struct Patch {
    pub key: CacheKey,
    value: AnyValue,
}

impl std::fmt::Debug for Patch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Patch").field("key", &self.key).finish_non_exhaustive()
    }
}

impl Patch {
    pub fn new<T: Send + Sync + 'static>(key: CacheKey, value: T) -> Self {
        Self {
            key,
            value: Arc::new(value),
        }
    }

    /// The patched value, if it has type `T`.
    pub fn value<T: 'static>(&self) -> Option<&T> {
        (*self.value).downcast_ref::<T>()
    }
}

/// Cache side effects of one successful write.
#[derive(Debug, Clone, Default)]
pub struct MutationEffects {
    pub patches: Vec<Patch>,
    pub remove: Vec<CacheKey>,
    pub invalidate: Vec<CacheKey>,
}

impl MutationEffects {
    fn patch<T: Send + Sync + 'static>(mut self, key: CacheKey, value: T) -> Self {
        self.patches.push(Patch::new(key, value));
        self
    }

    fn remove(mut self, key: CacheKey) -> Self {
        self.remove.push(key);
        self
    }

    fn invalidate(mut self, key: CacheKey) -> Self {
        self.invalidate.push(key);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty() && self.remove.is_empty() && self.invalidate.is_empty()
    }
}

/// A successful write, carrying what its effects depend on.
#[derive(Debug, Clone)]
pub enum Write {
    EventCreated,
    EventUpdated(Event),
    EventDeleted { id: String },
    EventsArchived,
    FavoriteToggled { user_id: String, event_id: String, now_favorite: bool },
    RegistrationCreated { event_id: String, user_id: Option<String> },
    RegistrationCancelled(Registration),
    ProfileUpdated(Profile),
    SpeakerCreated,
    SpeakerUpdated(Speaker),
    SpeakerDeleted { id: String },
    CoworkingCreated,
    CoworkingUpdated(CoworkingService),
    CoworkingDeleted { id: String },
    RentSettingsUpdated(RentSettings),
    AboutPageUpdated(AboutPage),
    SignedOut,
}

fn registration_keys(event_id: &str, user_id: Option<&str>) -> MutationEffects {
    let effects = MutationEffects::default().invalidate(keys::registrations::event(event_id));
    match user_id {
        Some(user) => effects.invalidate(keys::users::registrations(user)),
        None => effects,
    }
}

/// The effects table.
pub fn effects(write: &Write) -> MutationEffects {
    let none = MutationEffects::default();
    match write {
        Write::EventCreated | Write::EventsArchived => none.invalidate(keys::all(Entity::Events)),
        Write::EventUpdated(event) => none
            .patch(keys::detail(Entity::Events, &event.id), event.clone())
            .invalidate(keys::list(Entity::Events)),
        Write::EventDeleted { id } => none
            .remove(keys::detail(Entity::Events, id))
            .invalidate(keys::list(Entity::Events))
            .invalidate(keys::all(Entity::Favorites))
            .invalidate(keys::registrations::event(id)),
        Write::FavoriteToggled {
            user_id,
            event_id,
            now_favorite,
        } => none
            .patch(keys::favorites::check(user_id, event_id), *now_favorite)
            .invalidate(keys::favorites::user(user_id)),
        Write::RegistrationCreated { event_id, user_id } => {
            registration_keys(event_id, user_id.as_deref())
        }
        Write::RegistrationCancelled(registration) => {
            let effects = registration_keys(&registration.event_id, registration.user_id.as_deref());
            effects.patch(
                keys::detail(Entity::Registrations, &registration.id),
                registration.clone(),
            )
        }
        Write::ProfileUpdated(profile) => none
            .patch(keys::detail(Entity::Profiles, &profile.id), profile.clone())
            .invalidate(keys::list(Entity::Profiles)),
        Write::SpeakerCreated => none.invalidate(keys::all(Entity::Speakers)),
        Write::SpeakerUpdated(speaker) => none
            .patch(keys::detail(Entity::Speakers, &speaker.id), speaker.clone())
            .invalidate(keys::list(Entity::Speakers)),
        Write::SpeakerDeleted { id } => none
            .remove(keys::detail(Entity::Speakers, id))
            .invalidate(keys::list(Entity::Speakers)),
        Write::CoworkingCreated => none.invalidate(keys::all(Entity::CoworkingServices)),
        Write::CoworkingUpdated(service) => none
            .patch(
                keys::detail(Entity::CoworkingServices, &service.id),
                service.clone(),
            )
            .invalidate(keys::list(Entity::CoworkingServices)),
        Write::CoworkingDeleted { id } => none
            .remove(keys::detail(Entity::CoworkingServices, id))
            .invalidate(keys::list(Entity::CoworkingServices)),
        Write::RentSettingsUpdated(settings) => {
            none.patch(keys::all(Entity::RentSettings), settings.clone())
        }
        Write::AboutPageUpdated(page) => none.patch(keys::all(Entity::AboutPage), page.clone()),
        Write::SignedOut => none.remove(CacheKey::root()),
    }
}

impl QueryCache {
    /// Apply patches, then removals, then invalidations.
    pub fn apply_effects(&self, effects: &MutationEffects) -> Result<()> {
        for patch in &effects.patches {
            self.set_query_data_any(&patch.key, Arc::clone(&patch.value))?;
        }
        for key in &effects.remove {
            self.remove_queries(key)?;
        }
        for key in &effects.invalidate {
            self.invalidate(key)?;
        }
        debug!(
            patched = effects.patches.len(),
            removed = effects.remove.len(),
            invalidated = effects.invalidate.len(),
            "applied mutation effects"
        );
        Ok(())
    }

    /// Apply the effects of `write`.
    pub fn apply_write(&self, write: &Write) -> Result<()> {
        self.apply_effects(&effects(write))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn favorite_toggle_patches_check_and_invalidates_user() {
        let fx = effects(&Write::FavoriteToggled {
            user_id: "u1".into(),
            event_id: "ev1".into(),
            now_favorite: true,
        });
        assert_eq!(fx.patches.len(), 1);
        assert_eq!(fx.patches[0].key, keys::favorites::check("u1", "ev1"));
        assert_eq!(fx.patches[0].value::<bool>(), Some(&true));
        assert_eq!(fx.invalidate, vec![keys::favorites::user("u1")]);
        assert!(fx.remove.is_empty());
    }

    #[test]
    fn registration_created_with_and_without_user() {
        let fx = effects(&Write::RegistrationCreated {
            event_id: "e1".into(),
            user_id: Some("u1".into()),
        });
        assert_eq!(
            fx.invalidate,
            vec![
                keys::registrations::event("e1"),
                keys::users::registrations("u1"),
            ]
        );

        let anonymous = effects(&Write::RegistrationCreated {
            event_id: "e1".into(),
            user_id: None,
        });
        assert_eq!(anonymous.invalidate, vec![keys::registrations::event("e1")]);
    }

    #[test]
    fn event_delete_removes_detail_and_invalidates_lists() {
        let fx = effects(&Write::EventDeleted { id: "e1".into() });
        assert_eq!(fx.remove, vec![keys::detail(Entity::Events, "e1")]);
        assert!(fx.invalidate.contains(&keys::list(Entity::Events)));
        assert!(fx.invalidate.contains(&keys::registrations::event("e1")));
        assert!(fx.patches.is_empty());
    }

    #[test]
    fn create_invalidates_whole_entity() {
        let fx = effects(&Write::EventCreated);
        assert_eq!(fx.invalidate, vec![keys::all(Entity::Events)]);
        let fx = effects(&Write::SpeakerCreated);
        assert_eq!(fx.invalidate, vec![keys::all(Entity::Speakers)]);
    }

    #[test]
    fn sign_out_removes_everything() {
        let fx = effects(&Write::SignedOut);
        assert_eq!(fx.remove, vec![CacheKey::root()]);
    }

    #[test]
    fn update_never_invalidates_its_own_detail() {
        // Invalidating [events] would re-fetch the detail that was just patched.
        let event: Event = serde_json::from_value(serde_json::json!({
            "id": "e1",
            "title": "Patched",
            "start_date": "2030-01-01T00:00:00Z",
        }))
        .unwrap();
        let fx = effects(&Write::EventUpdated(event));
        let detail = keys::detail(Entity::Events, "e1");
        assert!(fx.invalidate.iter().all(|prefix| !detail.starts_with(prefix)));
    }
}
