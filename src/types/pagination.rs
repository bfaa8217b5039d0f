//! Pagination contract for list queries.

use serde::{Deserialize, Serialize};

use super::filter::{FilterSet, NoFilters};
use crate::keys::Params;
use crate::{HuginnError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "asc",
            OrderDirection::Desc => "desc",
        }
    }
}

/// Options for `get_all`: 1-based page, page size, ordering and filters.
///
/// ```rust
/// # use huginn::types::{PageOptions, EventFilters, OrderDirection};
/// let opts = PageOptions::new(EventFilters::default())
///     .page(2)
///     .limit(20)
///     .order_by("start_date", OrderDirection::Desc);
/// assert_eq!(opts.offset(), 20);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PageOptions<F = NoFilters> {
    pub page: u32,
    pub limit: u32,
    pub order_by: Option<String>,
    pub order_direction: OrderDirection,
    pub filters: F,
}

impl<F: Default> Default for PageOptions<F> {
    fn default() -> Self {
        Self::new(F::default())
    }
}

impl<F> PageOptions<F> {
    /// Defaults: page 1, 10 rows, backend order.
    pub fn new(filters: F) -> Self {
        Self {
            page: 1,
            limit: 10,
            order_by: None,
            order_direction: OrderDirection::default(),
            filters,
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by = Some(column.into());
        self.order_direction = direction;
        self
    }

    /// Zero-based row offset of the first row on this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page == 0 {
            return Err(HuginnError::validation("page", "pages start at 1"));
        }
        if self.limit == 0 {
            return Err(HuginnError::validation("limit", "must be at least 1"));
        }
        Ok(())
    }
}

impl<F: FilterSet> PageOptions<F> {
    /// Cache-key parameters: filters plus paging and ordering.
    pub fn to_params(&self) -> Params {
        let mut params = self.filters.to_params();
        params.insert("page", Some(self.page));
        params.insert("limit", Some(self.limit));
        if let Some(column) = &self.order_by {
            params.insert("order_by", Some(column.as_str()));
            params.insert("order", Some(self.order_direction.as_str()));
        }
        params
    }
}

/// One page of rows plus the total count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub count: u64,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Assemble a page; `has_more = count > page * limit`.
    pub fn new(data: Vec<T>, count: u64, page: u32, limit: u32) -> Self {
        let seen = u64::from(page) * u64::from(limit);
        Self {
            data,
            count,
            has_more: count > seen,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            count: self.count,
            has_more: self.has_more,
        }
    }
}
