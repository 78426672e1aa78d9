//! Common functionality for paging list responses.

use serde::{Deserialize, Serialize};

/// The page size used when the client does not specify one.
const DEFAULT_PER_PAGE: i64 = 15;

/// The largest page size a client may request.
const MAX_PER_PAGE: i64 = 100;

/// Pagination query parameters as sent by the client.
///
/// Out-of-range values are clamped rather than rejected: page numbers below
/// one become one, and page sizes are clamped into `1..=100`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    /// The 1-based page number to fetch.
    pub page: Option<i64>,
    /// The number of items per page.
    pub per_page: Option<i64>,
}

impl PageQuery {
    /// The clamped 1-based page number.
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    /// The clamped page size.
    pub fn per_page(&self) -> i64 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    /// The number of rows to skip to reach the requested page.
    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.per_page()
    }
}

/// The pagination envelope returned alongside paged data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// The number of rows that matched the query across all pages.
    pub total_count: i64,
    /// The 1-based page number of the returned data.
    pub current_page: i64,
    /// The page size used for the returned data.
    pub per_page: i64,
    /// The total number of pages, `ceil(total_count / per_page)`.
    pub total_pages: i64,
}

impl Pagination {
    /// Build the pagination envelope for a query that matched `total_count` rows.
    pub fn new(total_count: i64, query: &PageQuery) -> Self {
        let per_page = query.per_page();

        Self {
            total_count,
            current_page: query.page(),
            per_page,
            total_pages: (total_count + per_page - 1) / per_page,
        }
    }
}
