//! Stock units: the granularity at which balances are kept.
//!
//! A product-level product has a single unit; an expiry-tracked product has one
//! unit per linked batch. Untracked products have no unit at all.

use serde::{Deserialize, Serialize};

use stockledger_core::{AggregateId, DomainError, DomainResult, ShopId};

use crate::batch::{Batch, BatchId};
use crate::product::{Product, ProductId, Tracking};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockUnit {
    pub shop_id: ShopId,
    pub product_id: ProductId,
    pub batch_id: Option<BatchId>,
}

impl StockUnit {
    pub fn product(shop_id: ShopId, product_id: ProductId) -> Self {
        Self {
            shop_id,
            product_id,
            batch_id: None,
        }
    }

    pub fn batch(shop_id: ShopId, product_id: ProductId, batch_id: BatchId) -> Self {
        Self {
            shop_id,
            product_id,
            batch_id: Some(batch_id),
        }
    }

    /// Stream the unit's ledger entries are sequenced on.
    pub fn stream_id(&self) -> AggregateId {
        match self.batch_id {
            Some(batch_id) => batch_id.0,
            None => self.product_id.0,
        }
    }

    pub fn is_batch_level(&self) -> bool {
        self.batch_id.is_some()
    }
}

impl core::fmt::Display for StockUnit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.batch_id {
            Some(batch_id) => write!(f, "product {} batch {}", self.product_id, batch_id),
            None => write!(f, "product {}", self.product_id),
        }
    }
}

/// Materialized balance of a unit with the number of entries that produced it.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitBalance {
    pub quantity: i64,
    pub version: u64,
}

impl UnitBalance {
    pub fn apply(self, delta: i64) -> Self {
        Self {
            quantity: self.quantity + delta,
            version: self.version + 1,
        }
    }
}

/// Decide which unit (if any) a movement against `product` (and optional
/// `batch`) addresses.
///
/// `Ok(None)` means the product is untracked and no entry should be posted.
pub fn resolve_unit(product: &Product, batch: Option<&Batch>) -> DomainResult<Option<StockUnit>> {
    if !product.is_active() {
        return Err(DomainError::not_found(format!(
            "product {} is inactive",
            product.id_typed()
        )));
    }

    match (product.tracking(), batch) {
        (Tracking::Untracked, _) => Ok(None),
        (Tracking::ProductLevel, None) => Ok(Some(product.unit())),
        (Tracking::ProductLevel, Some(batch)) => Err(DomainError::validation(format!(
            "product {} does not track expiry; batch {} cannot be used",
            product.name(),
            batch.batch_number()
        ))),
        (Tracking::BatchLevel, None) => Err(DomainError::validation(format!(
            "product {} tracks expiry; a batch is required",
            product.name()
        ))),
        (Tracking::BatchLevel, Some(batch)) => {
            if !batch.is_active() {
                return Err(DomainError::not_found(format!(
                    "batch {} is inactive",
                    batch.batch_number()
                )));
            }
            if batch.shop_id() != product.shop_id() || !batch.belongs_to(product.id_typed()) {
                return Err(DomainError::validation(format!(
                    "batch {} does not belong to product {}",
                    batch.batch_number(),
                    product.name()
                )));
            }
            Ok(Some(StockUnit::batch(
                product.shop_id(),
                product.id_typed(),
                batch.id_typed(),
            )))
        }
    }
}

/// Human-readable label for a unit, used in stock shortfall errors.
pub fn describe_unit(product: &Product, batch: Option<&Batch>) -> String {
    match batch {
        Some(batch) => format!("{} (batch {})", product.name(), batch.batch_number()),
        None => product.name().to_string(),
    }
}
