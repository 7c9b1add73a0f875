//! Offset-based pagination for page-number navigation.
//!
//! This module provides:
//! - Page/limit parameter handling with clamping
//! - SQL OFFSET/LIMIT values
//! - In-memory slicing for non-SQL stores

use serde::{Deserialize, Serialize};

use super::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PAGE_NUMBER};

// ═══════════════════════════════════════════════════════════════════════════════
// Offset Pagination
// ═══════════════════════════════════════════════════════════════════════════════

/// Offset-based pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetPagination {
    /// Current page number (1-indexed).
    pub page: u64,
    /// Number of items per page.
    pub limit: u64,
}

impl OffsetPagination {
    /// Create a pagination capped at [`MAX_PAGE_SIZE`].
    pub fn new(page: u64, limit: u64) -> Self {
        Self::with_max(page, limit, MAX_PAGE_SIZE)
    }

    /// Create a pagination with a caller-supplied page-size cap.
    ///
    /// Pages below 1 are clamped to 1; the limit is clamped to `1..=max_limit`.
    pub fn with_max(page: u64, limit: u64, max_limit: u64) -> Self {
        Self {
            page: page.max(MIN_PAGE_NUMBER),
            limit: limit.clamp(1, max_limit.max(1)),
        }
    }

    /// Get the SQL OFFSET value.
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// Apply pagination to a slice of items.
    pub fn paginate_slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let start = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        if start >= items.len() {
            return Vec::new();
        }
        let end = start.saturating_add(self.limit as usize).min(items.len());
        items[start..end].to_vec()
    }

    /// Total page count for `total` items: `ceil(total / limit)`.
    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }
}

impl Default for OffsetPagination {
    fn default() -> Self {
        Self {
            page: MIN_PAGE_NUMBER,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Offset Pagination Builder
// ═══════════════════════════════════════════════════════════════════════════════

/// Builder for pagination from optional request parameters.
#[derive(Debug, Clone, Default)]
pub struct OffsetPaginationBuilder {
    page: Option<u64>,
    limit: Option<u64>,
    default_limit: Option<u64>,
    max_limit: Option<u64>,
}

impl OffsetPaginationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: Option<u64>) -> Self {
        self.page = page;
        self
    }

    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn default_limit(mut self, default_limit: u64) -> Self {
        self.default_limit = Some(default_limit);
        self
    }

    pub fn max_limit(mut self, max_limit: u64) -> Self {
        self.max_limit = Some(max_limit);
        self
    }

    pub fn build(self) -> OffsetPagination {
        let default_limit = self.default_limit.unwrap_or(DEFAULT_PAGE_SIZE);
        OffsetPagination::with_max(
            self.page.unwrap_or(MIN_PAGE_NUMBER),
            self.limit.unwrap_or(default_limit),
            self.max_limit.unwrap_or(MAX_PAGE_SIZE),
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
