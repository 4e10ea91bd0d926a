//! Batch registry operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, instrument};

use stockledger_core::{AggregateId, ShopId, UserId};
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_inventory::{BatchCreated, BatchesLinked, InventoryEvent};
use stockledger_products::{Batch, BatchId, CreateBatch, Product, ProductId, fifo_candidates};

use super::InventoryEngine;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBatch {
    pub batch_number: String,
    pub expiry_date: DateTime<Utc>,
    pub stock_alert_threshold: i64,
    /// Product to link the batch to on creation.
    #[serde(default)]
    pub product_id: Option<ProductId>,
}

impl<B> InventoryEngine<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Create a batch, optionally linked to a product in the same step.
    ///
    /// Fails with `Conflict` when an active batch of the shop already carries
    /// the batch number, and with `Validation` for a non-future expiry or a
    /// non-positive alert threshold.
    #[instrument(skip(self, request), fields(batch_number = %request.batch_number), err)]
    pub fn create_batch(&self, shop_id: ShopId, request: NewBatch, actor: Option<UserId>) -> EngineResult<Batch> {
        let batch = Batch::create(CreateBatch {
            shop_id,
            batch_id: BatchId::new(AggregateId::new()),
            batch_number: request.batch_number,
            expiry_date: request.expiry_date,
            stock_alert_threshold: request.stock_alert_threshold,
            actor,
            occurred_at: Utc::now(),
        })?;

        if let Some(product_id) = request.product_id {
            // Surface a clean NotFound before the store's critical section.
            self.product(shop_id, product_id)?;
        }

        let batch = self.store.insert_batch(batch, request.product_id, actor)?;
        info!(batch_id = %batch.id_typed(), product_id = ?batch.product_id(), "batch created");

        let event = InventoryEvent::BatchCreated(BatchCreated {
            shop_id,
            batch_id: batch.id_typed(),
            batch_number: batch.batch_number().to_string(),
            expiry_date: batch.expiry_date(),
            product_id: batch.product_id(),
            occurred_at: batch.created_at(),
        });
        self.publish_inventory(shop_id, batch.id_typed().0, 0, &event);
        Ok(batch)
    }

    /// Link batches to a product, all-or-nothing.
    #[instrument(skip(self, product_id, batch_ids), fields(product_id = %product_id, count = batch_ids.len()), err)]
    pub fn link_batches(
        &self,
        shop_id: ShopId,
        product_id: ProductId,
        batch_ids: &[BatchId],
        actor: Option<UserId>,
    ) -> EngineResult<Product> {
        if batch_ids.is_empty() {
            return Err(EngineError::validation("no batches to link"));
        }
        let at = Utc::now();
        let product = self.store.link_batches(shop_id, product_id, batch_ids, actor, at)?;
        info!("batches linked");

        let event = InventoryEvent::BatchesLinked(BatchesLinked {
            shop_id,
            product_id,
            batch_ids: batch_ids.to_vec(),
            occurred_at: at,
        });
        self.publish_inventory(shop_id, product_id.0, 0, &event);
        Ok(product)
    }

    /// Deactivate a batch, freeing its batch number and dropping it from FIFO.
    #[instrument(skip(self), err)]
    pub fn deactivate_batch(&self, shop_id: ShopId, batch_id: BatchId) -> EngineResult<Batch> {
        let batch = self.store.deactivate_batch(shop_id, batch_id, Utc::now())?;
        info!("batch deactivated");
        Ok(batch)
    }

    pub fn batches(&self, shop_id: ShopId) -> EngineResult<Vec<Batch>> {
        Ok(self.store.batches(shop_id)?)
    }

    /// Active, non-expired batches of the product, soonest expiry first.
    pub fn fifo_candidates(&self, shop_id: ShopId, product_id: ProductId, as_of: DateTime<Utc>) -> EngineResult<Vec<Batch>> {
        let product = self.product(shop_id, product_id)?;
        let batches = self.store.batches(shop_id)?;
        Ok(fifo_candidates(&batches, &product, as_of).into_iter().cloned().collect())
    }
}
