//! Page envelope for list responses.

use serde::{Deserialize, Serialize};

use super::OffsetPagination;

/// One page of results: `{items, total, page, limit, totalPages}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    /// Wrap `items`, echoing the requested page even when it lies past the end.
    pub fn new(items: Vec<T>, total: u64, pagination: &OffsetPagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            limit: pagination.limit,
            total_pages: pagination.total_pages(total),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_serializes_camel_case() {
        let page = Page::new(vec![1, 2], 12, &OffsetPagination::new(2, 10));
        assert_eq!(
            serde_json::to_value(&page).unwrap(),
            json!({ "items": [1, 2], "total": 12, "page": 2, "limit": 10, "totalPages": 2 })
        );
    }

    #[test]
    fn test_page_past_the_end() {
        let page: Page<u8> = Page::new(Vec::new(), 5, &OffsetPagination::new(9, 10));
        assert!(page.is_empty());
        assert_eq!(page.page, 9);
        assert_eq!(page.total_pages, 1);
    }
}
