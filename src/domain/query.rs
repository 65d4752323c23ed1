//! Read-side filters over a user's chains.

use crate::domain::{ChainStatus, Symbol};
use serde::{Deserialize, Serialize};

/// Filter applied when serving chains; also the cache key's variable part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainFilter {
    pub lookback_days: u32,
    pub symbol: Option<String>,
    pub status: Option<ChainStatus>,
    pub min_orders: usize,
}

impl ChainFilter {
    pub fn new(lookback_days: u32, min_orders: usize) -> Self {
        Self {
            lookback_days,
            symbol: None,
            status: None,
            min_orders: min_orders.max(1),
        }
    }

    pub fn with_symbol(mut self, symbol: Option<String>) -> Self {
        self.symbol = symbol
            .map(|s| Symbol::new(&s).as_str().to_string())
            .filter(|s| !s.is_empty());
        self
    }

    pub fn with_status(mut self, status: Option<ChainStatus>) -> Self {
        self.status = status;
        self
    }

    /// Whether every chain this filter selects is contained in a set detected
    /// with `lookback_days` and `min_orders`. Symbol and status only narrow.
    pub fn is_covered_by(&self, lookback_days: u32, min_orders: usize) -> bool {
        self.lookback_days <= lookback_days && self.min_orders >= min_orders
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub has_more: bool,
}

pub const MAX_PAGE_SIZE: usize = 500;

impl<T: Clone> Page<T> {
    /// Slice `all` into a 1-based page; out-of-range pages are empty.
    pub fn paginate(all: &[T], page: usize, page_size: usize) -> Self {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let start = (page - 1).saturating_mul(page_size).min(all.len());
        let end = start.saturating_add(page_size).min(all.len());

        Page {
            items: all[start..end].to_vec(),
            page,
            page_size,
            total: all.len(),
            has_more: end < all.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate() {
        let all: Vec<u32> = (1..=7).collect();
        let p1 = Page::paginate(&all, 1, 3);
        assert_eq!(p1.items, vec![1, 2, 3]);
        assert!(p1.has_more);
        assert_eq!(p1.total, 7);

        let p3 = Page::paginate(&all, 3, 3);
        assert_eq!(p3.items, vec![7]);
        assert!(!p3.has_more);

        let p9 = Page::paginate(&all, 9, 3);
        assert!(p9.items.is_empty());
        assert!(!p9.has_more);
    }

    #[test]
    fn test_paginate_clamps_inputs() {
        let all: Vec<u32> = (1..=3).collect();
        let p = Page::paginate(&all, 0, 0);
        assert_eq!(p.page, 1);
        assert_eq!(p.page_size, 1);
        assert_eq!(p.items, vec![1]);
    }

    #[test]
    fn test_filter_coverage() {
        let narrower = ChainFilter::new(30, 3).with_status(Some(ChainStatus::Active));
        assert!(narrower.is_covered_by(365, 2));
        assert!(ChainFilter::new(365, 2).is_covered_by(365, 2));
        assert!(!ChainFilter::new(730, 2).is_covered_by(365, 2));
        assert!(!ChainFilter::new(365, 1).is_covered_by(365, 2));
    }

    #[test]
    fn test_filter_normalizes_symbol() {
        let f = ChainFilter::new(30, 0).with_symbol(Some(" spy ".to_string()));
        assert_eq!(f.symbol.as_deref(), Some("SPY"));
        assert_eq!(f.min_orders, 1);
        let f = ChainFilter::new(30, 2).with_symbol(Some("".to_string()));
        assert!(f.symbol.is_none());
    }
}
