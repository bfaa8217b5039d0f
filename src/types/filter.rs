//! Backend predicates and per-entity filter unions.
//!
//! A [`FilterSet`] produces two views of the same filter: the predicates sent
//! to the backend and the normalized [`Params`] used in cache keys. Both views
//! drop absent values, so the cache never keys on a filter the backend ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::event::EventStatus;
use super::registration::RegistrationStatus;
use crate::keys::Params;

/// Comparison operator for a backend predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Case-insensitive pattern match; `%` is the wildcard.
    Ilike,
    /// `IS NULL` when the value is `true`, `IS NOT NULL` when `false`.
    Is,
    In,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Ilike => "ilike",
            FilterOp::Is => "is",
            FilterOp::In => "in",
        }
    }
}

/// One column predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Eq, value)
    }

    pub fn neq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Neq, value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Gte, value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Lte, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Lt, value)
    }

    /// Substring match, case-insensitive.
    pub fn contains(column: impl Into<String>, needle: &str) -> Self {
        Self::new(column, FilterOp::Ilike, format!("%{needle}%"))
    }

    pub fn is_null(column: impl Into<String>, null: bool) -> Self {
        Self::new(column, FilterOp::Is, null)
    }

    pub fn in_list(column: impl Into<String>, values: Vec<String>) -> Self {
        Self::new(column, FilterOp::In, values)
    }
}

/// A typed filter union for one entity.
pub trait FilterSet: Clone + Send + Sync + 'static {
    /// Backend predicates, absent values skipped.
    fn predicates(&self) -> Vec<Filter>;

    /// Normalized cache-key parameters, absent values skipped.
    fn to_params(&self) -> Params;
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Entities queried without filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoFilters;

impl FilterSet for NoFilters {
    fn predicates(&self) -> Vec<Filter> {
        Vec::new()
    }

    fn to_params(&self) -> Params {
        Params::new()
    }
}

/// Event list filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilters {
    pub status: Option<EventStatus>,
    pub event_type: Option<String>,
    pub search: Option<String>,
    pub featured: Option<bool>,
    /// Events starting at or after this instant.
    pub starts_after: Option<DateTime<Utc>>,
    /// Events starting at or before this instant.
    pub starts_before: Option<DateTime<Utc>>,
}

impl FilterSet for EventFilters {
    fn predicates(&self) -> Vec<Filter> {
        let mut out = Vec::new();
        if let Some(status) = self.status {
            out.push(Filter::eq("status", status.as_str()));
        }
        if let Some(kind) = non_blank(&self.event_type) {
            out.push(Filter::eq("event_type", kind));
        }
        if let Some(term) = non_blank(&self.search) {
            out.push(Filter::contains("title", term));
        }
        if let Some(featured) = self.featured {
            out.push(Filter::eq("is_featured", featured));
        }
        if let Some(after) = self.starts_after {
            out.push(Filter::gte("start_date", after.to_rfc3339()));
        }
        if let Some(before) = self.starts_before {
            out.push(Filter::lte("start_date", before.to_rfc3339()));
        }
        out
    }

    fn to_params(&self) -> Params {
        Params::new()
            .set("status", self.status.map(|s| s.as_str()))
            .set("event_type", non_blank(&self.event_type))
            .set("search", non_blank(&self.search))
            .set("featured", self.featured)
            .set("starts_after", self.starts_after.map(|d| d.to_rfc3339()))
            .set("starts_before", self.starts_before.map(|d| d.to_rfc3339()))
    }
}

/// Registration list filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationFilters {
    pub event_id: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<RegistrationStatus>,
}

impl FilterSet for RegistrationFilters {
    fn predicates(&self) -> Vec<Filter> {
        let mut out = Vec::new();
        if let Some(event) = non_blank(&self.event_id) {
            out.push(Filter::eq("event_id", event));
        }
        if let Some(user) = non_blank(&self.user_id) {
            out.push(Filter::eq("user_id", user));
        }
        if let Some(status) = self.status {
            out.push(Filter::eq("status", status.as_str()));
        }
        out
    }

    fn to_params(&self) -> Params {
        Params::new()
            .set("event_id", non_blank(&self.event_id))
            .set("user_id", non_blank(&self.user_id))
            .set("status", self.status.map(|s| s.as_str()))
    }
}

/// Speaker list filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeakerFilters {
    pub active: Option<bool>,
    pub search: Option<String>,
}

impl FilterSet for SpeakerFilters {
    fn predicates(&self) -> Vec<Filter> {
        let mut out = Vec::new();
        if let Some(active) = self.active {
            out.push(Filter::eq("active", active));
        }
        if let Some(term) = non_blank(&self.search) {
            out.push(Filter::contains("name", term));
        }
        out
    }

    fn to_params(&self) -> Params {
        Params::new()
            .set("active", self.active)
            .set("search", non_blank(&self.search))
    }
}

/// Coworking service list filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoworkingFilters {
    pub active: Option<bool>,
    pub price_unit: Option<String>,
}

impl FilterSet for CoworkingFilters {
    fn predicates(&self) -> Vec<Filter> {
        let mut out = Vec::new();
        if let Some(active) = self.active {
            out.push(Filter::eq("active", active));
        }
        if let Some(unit) = non_blank(&self.price_unit) {
            out.push(Filter::eq("price_unit", unit));
        }
        out
    }

    fn to_params(&self) -> Params {
        Params::new()
            .set("active", self.active)
            .set("price_unit", non_blank(&self.price_unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_values_produce_no_predicates() {
        let filters = EventFilters {
            status: None,
            event_type: Some("  ".into()),
            search: Some(String::new()),
            ..Default::default()
        };
        assert!(filters.predicates().is_empty());
        assert!(filters.to_params().is_empty());
    }

    #[test]
    fn predicates_and_params_agree() {
        let filters = EventFilters {
            status: Some(EventStatus::Active),
            search: Some("rust".into()),
            ..Default::default()
        };
        let predicates = filters.predicates();
        assert_eq!(predicates.len(), 2);
        assert_eq!(predicates[0], Filter::eq("status", "active"));
        assert_eq!(predicates[1].op, FilterOp::Ilike);
        assert_eq!(predicates[1].value, Value::from("%rust%"));
        assert_eq!(filters.to_params().len(), 2);
    }

    #[test]
    fn registration_filters() {
        let filters = RegistrationFilters {
            event_id: Some("e1".into()),
            user_id: None,
            status: Some(RegistrationStatus::Confirmed),
        };
        assert_eq!(filters.predicates().len(), 2);
        assert!(filters.to_params().get("user_id").is_none());
    }
}
