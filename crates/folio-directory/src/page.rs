//! Pagination of directory listings.

use serde::{Deserialize, Serialize};

/// Pagination request for directory listings.
///
/// Directories are listed with stable offset-based pages: the engine
/// requests `offset 0`, `offset page_size`, ... until a page comes
/// back shorter than `page_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Number of results to skip.
    #[serde(default)]
    pub offset: u32,

    /// Maximum number of results to return.
    pub page_size: u32,
}

impl PageRequest {
    /// Create a request for the first page with the given page size.
    pub fn new(page_size: u32) -> Self {
        Self {
            offset: 0,
            page_size,
        }
    }

    /// Set the offset.
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// The request for the page after this one.
    pub fn next(&self) -> Self {
        Self {
            offset: self.offset + self.page_size,
            page_size: self.page_size,
        }
    }

    /// Whether a page with `returned` entries is the final one.
    pub fn is_last(&self, returned: usize) -> bool {
        returned < self.page_size as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_progression() {
        let first = PageRequest::new(50);
        assert_eq!(first.offset, 0);

        let second = first.next();
        assert_eq!(second.offset, 50);
        assert_eq!(second.page_size, 50);
        assert_eq!(second.next().offset, 100);
    }

    #[test]
    fn test_last_page_detection() {
        let page = PageRequest::new(50);
        assert!(page.is_last(0));
        assert!(page.is_last(49));
        assert!(!page.is_last(50));
    }

    #[test]
    fn test_default_page_size() {
        assert_eq!(PageRequest::default().page_size, 100);
    }
}
