//! Pagination utilities.
//!
//! This module provides:
//! - 1-indexed offset pagination with a configurable page-size cap
//! - The page envelope returned by list endpoints
//!
//! # Usage
//!
//! ```rust,ignore
//! use taskgate_core::pagination::{OffsetPagination, Page};
//!
//! let pagination = OffsetPagination::new(2, 10);
//! let page = Page::new(items, total, &pagination);
//! assert_eq!(page.total_pages, total.div_ceil(10));
//! ```

mod offset;
mod page;

pub use offset::{OffsetPagination, OffsetPaginationBuilder};
pub use page::Page;

/// Default page size if not specified.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Maximum allowed page size.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Minimum page number (1-indexed).
pub const MIN_PAGE_NUMBER: u64 = 1;
