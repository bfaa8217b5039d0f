//! Public record, payload and filter types.

mod coworking;
mod event;
mod favorite;
mod filter;
mod pagination;
mod profile;
mod registration;
mod speaker;
mod validation;
mod venue;

pub use coworking::{CoworkingService, CoworkingServiceInput};
pub use event::{Event, EventInput, EventStatus, PaymentType};
pub use favorite::{Favorite, FavoriteInput};
pub use filter::{
    CoworkingFilters, EventFilters, Filter, FilterOp, FilterSet, NoFilters, RegistrationFilters,
    SpeakerFilters,
};
pub use pagination::{OrderDirection, Page, PageOptions};
pub use profile::{Profile, ProfileInput, Role};
pub use registration::{Registration, RegistrationInput, RegistrationStatus};
pub use speaker::{Speaker, SpeakerInput};
pub use validation::{
    validate_event_create, validate_event_update, validate_registration,
};
pub use venue::{AboutPage, AboutPageInput, RentSettings, RentSettingsInput};
