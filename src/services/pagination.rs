use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Page metadata returned alongside every list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total_items: u64,
    /// Never below 1, even for an empty result
    pub total_pages: u64,
    pub current_page: u64,
    pub items_per_page: u64,
}

impl Pagination {
    pub fn new(total_items: u64, request: PageRequest) -> Self {
        Self {
            total_items,
            total_pages: total_items.div_ceil(request.limit).max(1),
            current_page: request.page,
            items_per_page: request.limit,
        }
    }
}

/// A normalized 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    /// Missing or zero values fall back to page 1 and `default_limit`; the limit is
    /// clamped to `max_limit`. The page is capped so its row offset fits in an `i64`.
    pub fn normalize(
        page: Option<u64>,
        limit: Option<u64>,
        default_limit: u64,
        max_limit: u64,
    ) -> Self {
        let max_limit = max_limit.max(1);
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(default_limit)
            .clamp(1, max_limit);
        let page = page
            .filter(|p| *p > 0)
            .unwrap_or(1)
            .min(i64::MAX as u64 / limit);
        Self { page, limit }
    }

    /// Zero-based page index as used by SeaORM paginators
    pub fn index(&self) -> u64 {
        self.page - 1
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_items: u64, request: PageRequest) -> Self {
        Self {
            items,
            pagination: Pagination::new(total_items, request),
        }
    }
}
