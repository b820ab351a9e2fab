//! Page/limit query parameters and the `{data, pagination}` list envelope.

use serde::{Deserialize, Serialize};

const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageParams {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 { 1 }
fn default_limit() -> u32 { 10 }

impl Default for PageParams {
    fn default() -> Self { Self { page: default_page(), limit: default_limit() } }
}

impl PageParams {
    pub fn new(page: u32, limit: u32) -> Self { Self { page, limit } }

    pub fn page(&self) -> u32 { self.page.max(1) }
    pub fn page_size(&self) -> u32 { self.limit.clamp(1, MAX_PAGE_SIZE) }
    pub fn offset(&self) -> u64 { u64::from(self.page() - 1) * u64::from(self.page_size()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(total: u64, params: PageParams) -> Self {
        let page_size = params.page_size();
        Self {
            page: params.page(),
            page_size,
            total,
            total_pages: total.div_ceil(u64::from(page_size)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, params: PageParams) -> Self {
        Self { data, pagination: Pagination::new(total, params) }
    }

    /// Slices an already-filtered, already-ordered collection.
    pub fn from_vec(all: Vec<T>, params: PageParams) -> Self {
        let total = all.len() as u64;
        let data = all
            .into_iter()
            .skip(params.offset() as usize)
            .take(params.page_size() as usize)
            .collect();
        Self::new(data, total, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_and_clamping() {
        assert_eq!(PageParams::new(0, 10).offset(), 0);
        assert_eq!(PageParams::new(3, 10).offset(), 20);
        assert_eq!(PageParams::new(1, 500).page_size(), 100);
        assert_eq!(PageParams::new(1, 0).page_size(), 1);
    }

    #[test]
    fn test_total_pages_rounds_up() {
        let p = Pagination::new(21, PageParams::new(1, 10));
        assert_eq!(p.total_pages, 3);
        assert_eq!(Pagination::new(0, PageParams::default()).total_pages, 0);
    }

    #[test]
    fn test_page_from_vec() {
        let page = Page::from_vec((1..=25).collect::<Vec<_>>(), PageParams::new(3, 10));
        assert_eq!(page.data, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.pagination.total, 25);
    }
}
