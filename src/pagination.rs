//! Pagination cursor and the fresh-load / load-more decision.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A requested page of a collection. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u32,
    /// Requested number of items per page.
    pub page_size: u32,
}

impl PageRequest {
    /// Build a page request.
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    /// First page of `page_size` items.
    pub fn first(page_size: u32) -> Self {
        Self::new(1, page_size)
    }

    /// Page 1 replaces the collection; any later page appends to it.
    pub fn is_fresh(&self) -> bool {
        self.page <= 1
    }

    /// Reject page 0, a zero page size, or a page size above `max_page_size`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidPage`] when out of bounds.
    pub fn validate(&self, max_page_size: u32) -> Result<(), ValidationError> {
        if self.page == 0 || self.page_size == 0 || self.page_size > max_page_size {
            return Err(ValidationError::InvalidPage {
                page: self.page,
                page_size: self.page_size,
            });
        }
        Ok(())
    }
}

/// Pagination metadata as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    /// Page the server actually returned.
    pub page: u32,
    /// Total number of pages under the current filter.
    #[serde(default)]
    pub total_pages: u32,
    /// Explicit "more pages exist" flag.
    #[serde(default)]
    pub has_next_page: bool,
    /// Explicit "earlier pages exist" flag.
    #[serde(default)]
    pub has_prev_page: bool,
    /// Total number of items under the current filter.
    #[serde(default)]
    pub total: u64,
}

/// Where the current pagination numbers came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSource {
    /// Nothing loaded yet.
    #[default]
    Unloaded,
    /// Copied from server metadata.
    Server,
    /// The server omitted metadata; the page is treated as the last one.
    Estimated,
}

/// Pagination cursor for one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    /// Last page applied (0 before the first load).
    pub page: u32,
    /// Page size of the last applied load.
    pub page_size: u32,
    /// Total pages as known locally.
    pub total_pages: u32,
    /// Total item count as known locally.
    pub total: u64,
    /// Explicit server flag from the last load.
    pub server_has_next: bool,
    /// Whether earlier pages exist.
    pub has_prev_page: bool,
    /// Provenance of the numbers above.
    pub source: PageSource,
}

impl Pagination {
    /// Advance the cursor after a page was applied.
    ///
    /// With server metadata the numbers are copied verbatim. Without it, the
    /// page just received is taken to be the last one:
    /// `total_pages = max(page, ceil(cumulative / page_size))`.
    pub fn advance(request: PageRequest, returned: usize, meta: Option<PageMeta>) -> Self {
        match meta {
            Some(meta) => Self {
                page: request.page,
                page_size: request.page_size,
                total_pages: meta.total_pages,
                total: meta.total,
                server_has_next: meta.has_next_page,
                has_prev_page: meta.has_prev_page || request.page > 1,
                source: PageSource::Server,
            },
            None => {
                let size = u64::from(request.page_size.max(1));
                let cumulative = u64::from(request.page - 1) * size + returned as u64;
                let estimated = u32::try_from(cumulative.div_ceil(size)).unwrap_or(u32::MAX);
                Self {
                    page: request.page,
                    page_size: request.page_size,
                    total_pages: estimated.max(request.page),
                    total: cumulative,
                    server_has_next: false,
                    has_prev_page: request.page > 1,
                    source: PageSource::Estimated,
                }
            }
        }
    }

    /// True while `page < total_pages` or the server said more exist.
    pub fn has_next_page(&self) -> bool {
        self.page < self.total_pages || self.server_has_next
    }

    /// The page a "load more" would request.
    pub fn next_page(&self) -> u32 {
        self.page + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(page: u32, total_pages: u32, has_next_page: bool) -> PageMeta {
        PageMeta {
            page,
            total_pages,
            has_next_page,
            has_prev_page: page > 1,
            total: u64::from(total_pages) * 10,
        }
    }

    #[test]
    fn unloaded_has_no_next_page() {
        let p = Pagination::default();
        assert!(!p.has_next_page());
        assert_eq!(p.next_page(), 1);
    }

    #[test]
    fn server_metadata_drives_has_next() {
        let p = Pagination::advance(PageRequest::new(1, 10), 10, Some(meta(1, 3, true)));
        assert!(p.has_next_page());
        assert_eq!(p.source, PageSource::Server);

        let p = Pagination::advance(PageRequest::new(3, 10), 4, Some(meta(3, 3, false)));
        assert!(!p.has_next_page());
    }

    #[test]
    fn explicit_flag_wins_when_total_pages_lags() {
        let p = Pagination::advance(PageRequest::new(2, 10), 10, Some(meta(2, 2, true)));
        assert!(p.has_next_page());
    }

    #[test]
    fn missing_metadata_means_last_page() {
        let p = Pagination::advance(PageRequest::new(1, 10), 10, None);
        assert_eq!(p.total_pages, 1);
        assert_eq!(p.total, 10);
        assert!(!p.has_next_page());
        assert_eq!(p.source, PageSource::Estimated);
    }

    #[test]
    fn missing_metadata_on_later_page_never_undercounts_current() {
        let p = Pagination::advance(PageRequest::new(3, 10), 0, None);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.total, 20);
        assert!(!p.has_next_page());
    }

    #[test]
    fn page_request_validation() {
        assert!(PageRequest::new(1, 20).validate(100).is_ok());
        assert!(PageRequest::new(0, 20).validate(100).is_err());
        assert!(PageRequest::new(1, 0).validate(100).is_err());
        assert!(PageRequest::new(1, 101).validate(100).is_err());
    }

    #[test]
    fn page_meta_decodes_camel_case() {
        let json = serde_json::json!({
            "page": 2, "totalPages": 5, "hasNextPage": true, "hasPrevPage": true, "total": 48
        });
        let meta: PageMeta = serde_json::from_value(json).expect("decode");
        assert_eq!(meta.total_pages, 5);
        assert!(meta.has_next_page);
    }
}
