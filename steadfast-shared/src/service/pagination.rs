/// Paging options and the pagination summary returned by list operations
///
/// Defaults and bounds are applied uniformly: `page` defaults to 1 and never
/// goes below it, `limit` defaults to 10 and is clamped into
/// `[1, MAX_PAGE_SIZE]`.

use serde::{Deserialize, Serialize};

/// Default page number
pub const DEFAULT_PAGE: i64 = 1;

/// Default page size
pub const DEFAULT_LIMIT: i64 = 10;

/// Largest page size a caller can request
pub const MAX_PAGE_SIZE: i64 = 100;

/// Row cap used by exports
pub const EXPORT_LIMIT: i64 = 10_000;

/// Common list options shared by every resource
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListOptions {
    /// 1-based page number
    pub page: Option<i64>,

    /// Page size
    pub limit: Option<i64>,

    /// Case-insensitive substring search over the resource's text fields
    pub search: Option<String>,
}

impl ListOptions {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            page,
            limit,
            search: None,
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Effective page (>= 1)
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(DEFAULT_PAGE).max(1)
    }

    /// Effective limit, clamped into `[1, MAX_PAGE_SIZE]`
    pub fn limit(&self) -> i64 {
        clamp_limit(self.limit)
    }

    /// Row offset for the effective page and limit
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }

    /// Trimmed search term, if any
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Applies the default and bounds used for every caller-supplied limit
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_PAGE_SIZE)
}

/// Pagination summary attached to list responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Total rows matching the filter
    pub total: i64,

    /// Current page
    pub page: i64,

    /// Page size
    pub limit: i64,

    /// `ceil(total / limit)`
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(total: i64, page: i64, limit: i64) -> Self {
        let limit = limit.max(1);
        let total = total.max(0);

        Self {
            total,
            page,
            limit,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

/// A page of records plus its pagination summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ListOptions::default();
        assert_eq!(options.page(), 1);
        assert_eq!(options.limit(), 10);
        assert_eq!(options.offset(), 0);
        assert_eq!(options.search_term(), None);
    }

    #[test]
    fn test_page_below_one_is_clamped() {
        for page in [0, -1, -500] {
            let options = ListOptions::new(Some(page), None);
            assert_eq!(options.page(), 1);
            assert_eq!(options.offset(), 0);
        }
    }

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(ListOptions::new(None, Some(0)).limit(), 1);
        assert_eq!(ListOptions::new(None, Some(-7)).limit(), 1);
        assert_eq!(ListOptions::new(None, Some(1000)).limit(), MAX_PAGE_SIZE);
        assert_eq!(ListOptions::new(None, Some(25)).limit(), 25);
    }

    #[test]
    fn test_offset() {
        let options = ListOptions::new(Some(3), Some(20));
        assert_eq!(options.offset(), 40);
    }

    #[test]
    fn test_blank_search_is_ignored() {
        let options = ListOptions::default().with_search("   ");
        assert_eq!(options.search_term(), None);

        let options = ListOptions::default().with_search("  walk ");
        assert_eq!(options.search_term(), Some("walk"));
    }

    #[test]
    fn test_total_pages_is_ceiling() {
        for (total, limit) in [(0, 10), (1, 10), (10, 10), (11, 10), (99, 7), (100, 100), (101, 100)] {
            let p = Pagination::new(total, 1, limit);
            let expected = (total as f64 / limit as f64).ceil() as i64;
            assert_eq!(p.total_pages, expected, "total={} limit={}", total, limit);
        }
    }
}
