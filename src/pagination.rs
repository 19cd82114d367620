// Page/per_page handling for list endpoints

use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 15;
pub const MAX_PER_PAGE: u32 = 100;

/// Requested page; out-of-range values are clamped rather than rejected.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        PageRequest { page: Some(page), per_page: Some(per_page) }
    }

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
    }

    pub fn limit(&self) -> i64 {
        self.per_page() as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page() as i64 - 1) * self.per_page() as i64
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PageMeta {
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub last_page: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: i64) -> Self {
        let per_page = request.per_page();
        let last_page = ((total.max(0) as u64 + per_page as u64 - 1) / per_page as u64).max(1) as u32;
        Paginated {
            items,
            meta: PageMeta {
                page: request.page(),
                per_page,
                total,
                last_page,
            },
        }
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_clamping() {
        let req = PageRequest::default();
        assert_eq!(req.page(), 1);
        assert_eq!(req.per_page(), DEFAULT_PER_PAGE);
        assert_eq!(req.offset(), 0);

        let req = PageRequest::new(0, 1000);
        assert_eq!(req.page(), 1);
        assert_eq!(req.per_page(), MAX_PER_PAGE);

        let req = PageRequest::new(3, 10);
        assert_eq!(req.offset(), 20);
    }

    #[test]
    fn test_last_page() {
        let page: Paginated<u8> = Paginated::new(vec![], PageRequest::new(1, 15), 31);
        assert_eq!(page.meta.last_page, 3);

        let empty: Paginated<u8> = Paginated::new(vec![], PageRequest::default(), 0);
        assert_eq!(empty.meta.last_page, 1);
    }
}
