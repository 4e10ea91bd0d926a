//! Product administration.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, instrument};

use stockledger_core::{AggregateId, DomainError, ShopId, UserId};
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_inventory::{InventoryEvent, ProductDeactivated};
use stockledger_products::{CreateProduct, Product, ProductId, UpdateProductDetails};

use super::InventoryEngine;
use crate::error::EngineResult;

/// Fields an operator supplies for a new product. Quantity always starts at 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub cost_price: u64,
    #[serde(default)]
    pub selling_price: u64,
    pub tracks_inventory: bool,
    #[serde(default)]
    pub tracks_expiry: bool,
    #[serde(default)]
    pub stock_alert_threshold: i64,
}

impl<B> InventoryEngine<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    #[instrument(skip(self, request), fields(name = %request.name), err)]
    pub fn create_product(&self, shop_id: ShopId, request: NewProduct, actor: Option<UserId>) -> EngineResult<Product> {
        let product = Product::create(CreateProduct {
            shop_id,
            product_id: ProductId::new(AggregateId::new()),
            name: request.name,
            barcode: request.barcode,
            cost_price: request.cost_price,
            selling_price: request.selling_price,
            tracks_inventory: request.tracks_inventory,
            tracks_expiry: request.tracks_expiry,
            stock_alert_threshold: request.stock_alert_threshold,
            actor,
            occurred_at: Utc::now(),
        })?;
        self.store.insert_product(product.clone())?;
        info!(product_id = %product.id_typed(), "product created");
        Ok(product)
    }

    /// Change descriptive fields. Quantities are untouched.
    #[instrument(skip(self, update), err)]
    pub fn update_product(
        &self,
        shop_id: ShopId,
        product_id: ProductId,
        update: UpdateProductDetails,
        actor: Option<UserId>,
    ) -> EngineResult<Product> {
        let at = Utc::now();
        let mut edit = |product: &mut Product| product.update_details(update.clone(), actor, at);
        Ok(self.store.modify_product(shop_id, product_id, &mut edit)?)
    }

    /// Deactivate the product and release every batch linked to it, atomically.
    ///
    /// Deactivating an inactive product returns it unchanged.
    #[instrument(skip(self), err)]
    pub fn deactivate_product(&self, shop_id: ShopId, product_id: ProductId, actor: Option<UserId>) -> EngineResult<Product> {
        let current = self.product(shop_id, product_id)?;
        if !current.is_active() {
            return Ok(current);
        }

        let at = Utc::now();
        let (product, released) = self.store.deactivate_product(shop_id, product_id, actor, at)?;
        info!(released = released.len(), "product deactivated");

        let event = InventoryEvent::ProductDeactivated(ProductDeactivated {
            shop_id,
            product_id,
            released_batch_ids: released,
            actor,
            occurred_at: at,
        });
        self.publish_inventory(shop_id, product_id.0, 0, &event);
        Ok(product)
    }

    /// Reactivate a product. Batch links severed on deactivation stay severed.
    #[instrument(skip(self), err)]
    pub fn reactivate_product(&self, shop_id: ShopId, product_id: ProductId, actor: Option<UserId>) -> EngineResult<Product> {
        let at = Utc::now();
        let mut edit = |product: &mut Product| -> Result<(), DomainError> {
            product.reactivate(actor, at);
            Ok(())
        };
        Ok(self.store.modify_product(shop_id, product_id, &mut edit)?)
    }

    pub fn products(&self, shop_id: ShopId) -> EngineResult<Vec<Product>> {
        Ok(self.store.products(shop_id)?)
    }
}
