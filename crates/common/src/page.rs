use serde::{Deserialize, Serialize};

/// Offset pagination shared by every listing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub skip: u32,
    pub limit: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 100;
    pub const MAX_LIMIT: u32 = 1000;

    /// Builds a page, clamping `limit` into `1..=MAX_LIMIT`.
    pub fn new(skip: u32, limit: u32) -> Self {
        Self {
            skip,
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn skip(&self) -> usize {
        self.skip as usize
    }

    pub fn limit(&self) -> usize {
        self.limit as usize
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(Page::new(0, 0).limit, 1);
        assert_eq!(Page::new(0, 5000).limit, Page::MAX_LIMIT);
        assert_eq!(Page::new(3, 20), Page { skip: 3, limit: 20 });
    }

    #[test]
    fn default_page() {
        let page = Page::default();
        assert_eq!(page.skip(), 0);
        assert_eq!(page.limit(), 100);
    }
}
