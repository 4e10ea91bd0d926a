//! Ledger history query types (reporting surface).
//!
//! Read-only, shop-scoped and paginated by default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_inventory::{LedgerEntry, MovementKind, OriginRef};
use stockledger_products::{BatchId, ProductId};

use crate::config::MAX_PAGE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    /// `default_limit` applies when no limit is given; any limit is capped.
    pub fn new(limit: Option<u32>, offset: Option<u32>, default_limit: u32) -> Self {
        Self {
            limit: limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE),
            offset: offset.unwrap_or(0),
        }
    }
}

/// Filter criteria for ledger queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerFilter {
    pub product_id: Option<ProductId>,
    pub batch_id: Option<BatchId>,
    pub kind: Option<MovementKind>,
    pub origin: Option<OriginRef>,
    pub occurred_after: Option<DateTime<Utc>>,
    pub occurred_before: Option<DateTime<Utc>>,
}

impl LedgerFilter {
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.product_id.is_none_or(|p| entry.product_id == p)
            && self.batch_id.is_none_or(|b| entry.batch_id == Some(b))
            && self.kind.is_none_or(|k| entry.kind == k)
            && self.origin.is_none_or(|o| entry.origin == Some(o))
            && self.occurred_after.is_none_or(|t| entry.occurred_at >= t)
            && self.occurred_before.is_none_or(|t| entry.occurred_at <= t)
    }
}

/// One page of ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPage {
    pub entries: Vec<LedgerEntry>,
    /// Number of entries matching the filter across all pages.
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl LedgerPage {
    pub fn from_matches(matches: Vec<LedgerEntry>, pagination: Pagination) -> Self {
        let total = matches.len() as u64;
        let entries: Vec<_> = matches
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();
        let has_more = (pagination.offset as u64) + (entries.len() as u64) < total;
        Self {
            entries,
            total,
            pagination,
            has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_caps_limit() {
        let p = Pagination::new(Some(10_000), None, 50);
        assert_eq!(p.limit, MAX_PAGE_SIZE);
        assert_eq!(Pagination::new(None, Some(3), 20), Pagination { limit: 20, offset: 3 });
    }

    #[test]
    fn page_reports_more() {
        let page = LedgerPage::from_matches(Vec::new(), Pagination::default());
        assert!(!page.has_more);
        assert_eq!(page.total, 0);
    }
}
