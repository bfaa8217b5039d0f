//! Client-side payload validation.
//!
//! Runs before any network call; failures are field-level
//! [`HuginnError::Validation`] errors and are never retried.

use chrono::{DateTime, Utc};

use super::event::EventInput;
use super::registration::RegistrationInput;
use crate::{HuginnError, Result};

fn require_text(field: &str, value: &Option<String>) -> Result<()> {
    match value.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Ok(()),
        _ => Err(HuginnError::validation(field, "is required")),
    }
}

fn reject_blank(field: &str, value: &Option<String>) -> Result<()> {
    match value.as_deref().map(str::trim) {
        Some("") => Err(HuginnError::validation(field, "must not be blank")),
        _ => Ok(()),
    }
}

fn check_common(input: &EventInput, now: DateTime<Utc>) -> Result<()> {
    if let Some(start) = input.start_date {
        if start < now {
            return Err(HuginnError::validation(
                "start_date",
                "must not be in the past",
            ));
        }
        if let Some(end) = input.end_date {
            if end < start {
                return Err(HuginnError::validation(
                    "end_date",
                    "must not be before the start date",
                ));
            }
        }
    }
    if let Some(price) = input.price {
        if price < 0.0 || price.is_nan() {
            return Err(HuginnError::validation("price", "must not be negative"));
        }
    }
    if let Some(max) = input.max_participants {
        if max < 1 {
            return Err(HuginnError::validation(
                "max_participants",
                "must be at least 1",
            ));
        }
    }
    Ok(())
}

/// Validate a new event: title, description and start date are required.
pub fn validate_event_create(input: &EventInput, now: DateTime<Utc>) -> Result<()> {
    require_text("title", &input.title)?;
    require_text("description", &input.description)?;
    if input.start_date.is_none() {
        return Err(HuginnError::validation("start_date", "is required"));
    }
    check_common(input, now)
}

/// Validate a partial event update: only the fields present are checked.
pub fn validate_event_update(input: &EventInput, now: DateTime<Utc>) -> Result<()> {
    reject_blank("title", &input.title)?;
    reject_blank("description", &input.description)?;
    check_common(input, now)
}

pub fn validate_registration(input: &RegistrationInput) -> Result<()> {
    if input.event_id.trim().is_empty() {
        return Err(HuginnError::validation("event_id", "is required"));
    }
    if input.full_name.trim().is_empty() {
        return Err(HuginnError::validation("full_name", "is required"));
    }
    let email = input.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(HuginnError::validation("email", "must be a valid address"));
    }
    match input.adult_tickets.checked_add(input.child_tickets) {
        Some(0) => return Err(HuginnError::validation("tickets", "at least one ticket")),
        None => return Err(HuginnError::validation("tickets", "too many tickets")),
        Some(_) => {}
    }
    if input.total_amount < 0.0 {
        return Err(HuginnError::validation(
            "total_amount",
            "must not be negative",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn field_of(err: HuginnError) -> String {
        match err {
            HuginnError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_event_passes() {
        let now = Utc::now();
        let input = EventInput::new("Meetup", "Talks and pizza")
            .start_date(now + Duration::days(3))
            .price(0.0)
            .max_participants(40);
        assert!(validate_event_create(&input, now).is_ok());
    }

    #[test]
    fn missing_title_is_rejected() {
        let now = Utc::now();
        let input = EventInput {
            description: Some("desc".into()),
            start_date: Some(now + Duration::days(1)),
            ..Default::default()
        };
        assert_eq!(field_of(validate_event_create(&input, now).unwrap_err()), "title");
    }

    #[test]
    fn past_start_is_rejected() {
        let now = Utc::now();
        let input = EventInput::new("Late", "desc").start_date(now - Duration::minutes(1));
        assert_eq!(
            field_of(validate_event_create(&input, now).unwrap_err()),
            "start_date"
        );
    }

    #[test]
    fn negative_price_and_zero_capacity_are_rejected() {
        let now = Utc::now();
        let base = EventInput::new("x", "y").start_date(now + Duration::days(1));

        let priced = base.clone().price(-5.0);
        assert_eq!(field_of(validate_event_create(&priced, now).unwrap_err()), "price");

        let empty = base.max_participants(0);
        assert_eq!(
            field_of(validate_event_create(&empty, now).unwrap_err()),
            "max_participants"
        );
    }

    #[test]
    fn partial_update_only_checks_present_fields() {
        let now = Utc::now();
        let input = EventInput {
            location: Some("Hall B".into()),
            ..Default::default()
        };
        assert!(validate_event_update(&input, now).is_ok());

        let blank = EventInput {
            title: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(field_of(validate_event_update(&blank, now).unwrap_err()), "title");
    }

    #[test]
    fn registration_needs_contact_and_tickets() {
        let mut input = RegistrationInput {
            event_id: "e1".into(),
            full_name: "Ada".into(),
            email: "ada@example.com".into(),
            adult_tickets: 1,
            ..Default::default()
        };
        assert!(validate_registration(&input).is_ok());

        input.adult_tickets = 0;
        assert_eq!(field_of(validate_registration(&input).unwrap_err()), "tickets");

        input.adult_tickets = 1;
        input.email = "nope".into();
        assert_eq!(field_of(validate_registration(&input).unwrap_err()), "email");
    }

    #[test]
    fn overflowing_ticket_count_is_a_validation_error() {
        let input = RegistrationInput {
            event_id: "e1".into(),
            full_name: "Ada".into(),
            email: "ada@example.com".into(),
            adult_tickets: u32::MAX,
            child_tickets: 1,
            ..Default::default()
        };
        assert_eq!(field_of(validate_registration(&input).unwrap_err()), "tickets");
    }
}
