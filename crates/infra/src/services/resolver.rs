//! Stock-keeping unit resolution and balance reads.
//!
//! Reads go to the materialized cache on products and batches; the ledger is
//! only replayed by the maintenance operations in `ledger.rs`.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockledger_core::ShopId;
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_products::{
    Batch, BatchId, Product, ProductId, StockUnit, Tracking, UnitBalance, describe_unit, resolve_unit,
    total_on_hand,
};

use super::InventoryEngine;
use crate::error::{EngineError, EngineResult};

/// A unit at or below its alert threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockUnit {
    pub unit: StockUnit,
    pub label: String,
    pub quantity: i64,
    pub stock_alert_threshold: i64,
}

impl<B> InventoryEngine<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn product(&self, shop_id: ShopId, product_id: ProductId) -> EngineResult<Product> {
        self.store
            .product(shop_id, product_id)?
            .ok_or_else(|| EngineError::not_found(format!("product {product_id} in shop {shop_id}")))
    }

    pub fn batch(&self, shop_id: ShopId, batch_id: BatchId) -> EngineResult<Batch> {
        self.store
            .batch(shop_id, batch_id)?
            .ok_or_else(|| EngineError::not_found(format!("batch {batch_id} in shop {shop_id}")))
    }

    /// Load the product and optional batch a movement refers to.
    pub(crate) fn load_refs(
        &self,
        shop_id: ShopId,
        product_id: ProductId,
        batch_id: Option<BatchId>,
    ) -> EngineResult<(Product, Option<Batch>)> {
        let product = self.product(shop_id, product_id)?;
        let batch = batch_id.map(|id| self.batch(shop_id, id)).transpose()?;
        Ok((product, batch))
    }

    /// Resolve the unit a movement addresses, failing for untracked products.
    pub(crate) fn tracked_unit(&self, product: &Product, batch: Option<&Batch>) -> EngineResult<StockUnit> {
        resolve_unit(product, batch)?.ok_or_else(|| {
            EngineError::validation(format!("product {} does not track inventory", product.name()))
        })
    }

    /// Materialized balance (quantity and ledger version) of a unit.
    pub fn unit_balance(&self, unit: StockUnit) -> EngineResult<UnitBalance> {
        Ok(self.store.balance(unit)?)
    }

    /// Current on-hand quantity of a unit.
    pub fn current_balance(&self, unit: StockUnit) -> EngineResult<i64> {
        Ok(self.unit_balance(unit)?.quantity)
    }

    /// Whether the unit's materialized quantity is at or below its alert threshold.
    pub fn is_below_alert(&self, unit: StockUnit) -> EngineResult<bool> {
        match unit.batch_id {
            None => {
                let product = self.product(unit.shop_id, unit.product_id)?;
                self.tracked_unit_check(&product, None, unit)?;
                Ok(product.is_below_alert())
            }
            Some(batch_id) => {
                let product = self.product(unit.shop_id, unit.product_id)?;
                let batch = self.batch(unit.shop_id, batch_id)?;
                self.tracked_unit_check(&product, Some(&batch), unit)?;
                Ok(batch.is_below_alert())
            }
        }
    }

    fn tracked_unit_check(&self, product: &Product, batch: Option<&Batch>, unit: StockUnit) -> EngineResult<()> {
        if product.tracking() == Tracking::Untracked {
            return Err(EngineError::validation(format!(
                "product {} does not track inventory",
                product.name()
            )));
        }
        match batch {
            Some(batch) if !batch.belongs_to(unit.product_id) => Err(EngineError::validation(format!(
                "batch {} does not belong to product {}",
                batch.batch_number(),
                product.name()
            ))),
            None if product.tracking() == Tracking::BatchLevel => Err(EngineError::validation(format!(
                "product {} tracks expiry; a batch is required",
                product.name()
            ))),
            _ => Ok(()),
        }
    }

    /// Total on hand for a product: its own quantity, or the sum of its active
    /// linked batches when it tracks expiry.
    pub fn product_total(&self, shop_id: ShopId, product_id: ProductId) -> EngineResult<i64> {
        let product = self.product(shop_id, product_id)?;
        match product.tracking() {
            Tracking::Untracked => Err(EngineError::validation(format!(
                "product {} does not track inventory",
                product.name()
            ))),
            Tracking::ProductLevel => Ok(product.quantity()),
            Tracking::BatchLevel => {
                let batches = self.store.batches(shop_id)?;
                Ok(total_on_hand(&batches, &product))
            }
        }
    }

    /// Every active unit of the shop at or below its alert threshold.
    pub fn low_stock(&self, shop_id: ShopId) -> EngineResult<Vec<LowStockUnit>> {
        let products = self.store.products(shop_id)?;
        let batches = self.store.batches(shop_id)?;

        let mut low = Vec::new();
        for product in products.iter().filter(|p| p.is_active()) {
            match product.tracking() {
                Tracking::Untracked => {}
                Tracking::ProductLevel => {
                    if product.is_below_alert() {
                        low.push(LowStockUnit {
                            unit: product.unit(),
                            label: describe_unit(product, None),
                            quantity: product.quantity(),
                            stock_alert_threshold: product.stock_alert_threshold(),
                        });
                    }
                }
                Tracking::BatchLevel => {
                    for batch in batches
                        .iter()
                        .filter(|b| b.is_active() && b.belongs_to(product.id_typed()) && b.is_below_alert())
                    {
                        low.push(LowStockUnit {
                            unit: StockUnit::batch(shop_id, product.id_typed(), batch.id_typed()),
                            label: describe_unit(product, Some(batch)),
                            quantity: batch.quantity(),
                            stock_alert_threshold: batch.stock_alert_threshold(),
                        });
                    }
                }
            }
        }
        low.sort_by_key(|u| (u.quantity, u.unit));
        Ok(low)
    }
}
