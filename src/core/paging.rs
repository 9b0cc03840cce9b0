/// Resolved page window for the market listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub current: u32,
    pub total_pages: u32,
    pub per_page: u32,
}

impl Page {
    /// Resolve a raw `page` parameter against the number of markets
    ///
    /// Missing, unparsable or zero pages become 1. Pages past the end are
    /// clamped to the last page when there is at least one.
    pub fn resolve(requested: Option<&str>, total_items: u64, per_page: u32) -> Self {
        let per_page = per_page.max(1);
        let total_pages = total_items.div_ceil(u64::from(per_page));
        let total_pages = u32::try_from(total_pages).unwrap_or(u32::MAX);

        let mut current = requested
            .and_then(|p| p.trim().parse::<u32>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1);

        if total_pages > 0 && current > total_pages {
            current = total_pages;
        }

        Self {
            current,
            total_pages,
            per_page,
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.current - 1) * u64::from(self.per_page)
    }
}
