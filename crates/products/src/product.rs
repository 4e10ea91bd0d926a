use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{AggregateId, DomainError, DomainResult, Entity, ShopId, UserId};

use crate::batch::BatchId;
use crate::snapshot::ProductSnapshot;
use crate::unit::{StockUnit, UnitBalance};

/// Product identifier (shop-scoped via the `shop_id` field on the record).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Inactive,
}

/// Granularity at which a product's stock is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tracking {
    /// No ledger entries are ever posted for the product.
    Untracked,
    /// One balance on the product itself.
    ProductLevel,
    /// One balance per (product, batch) pair.
    BatchLevel,
}

/// Entity: Product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    shop_id: ShopId,
    name: String,
    barcode: Option<String>,
    /// Prices in smallest currency unit (e.g. cents).
    cost_price: u64,
    selling_price: u64,
    tracks_inventory: bool,
    tracks_expiry: bool,
    quantity: i64,
    ledger_version: u64,
    stock_alert_threshold: i64,
    status: ProductStatus,
    batch_ids: Vec<BatchId>,
    created_by: Option<UserId>,
    updated_by: Option<UserId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub shop_id: ShopId,
    pub product_id: ProductId,
    pub name: String,
    pub barcode: Option<String>,
    pub cost_price: u64,
    pub selling_price: u64,
    pub tracks_inventory: bool,
    pub tracks_expiry: bool,
    pub stock_alert_threshold: i64,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProductDetails (descriptive fields only; `None` keeps the current value).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProductDetails {
    pub name: Option<String>,
    pub barcode: Option<String>,
    pub cost_price: Option<u64>,
    pub selling_price: Option<u64>,
    pub stock_alert_threshold: Option<i64>,
}

impl Product {
    pub fn create(cmd: CreateProduct) -> DomainResult<Self> {
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        if cmd.tracks_expiry && !cmd.tracks_inventory {
            return Err(DomainError::validation(
                "a product that tracks expiry must also track inventory",
            ));
        }
        if cmd.stock_alert_threshold < 0 {
            return Err(DomainError::validation("stock alert threshold cannot be negative"));
        }

        Ok(Self {
            id: cmd.product_id,
            shop_id: cmd.shop_id,
            name: name.to_string(),
            barcode: normalize_barcode(cmd.barcode),
            cost_price: cmd.cost_price,
            selling_price: cmd.selling_price,
            tracks_inventory: cmd.tracks_inventory,
            tracks_expiry: cmd.tracks_expiry,
            quantity: 0,
            ledger_version: 0,
            stock_alert_threshold: cmd.stock_alert_threshold,
            status: ProductStatus::Active,
            batch_ids: Vec::new(),
            created_by: cmd.actor,
            updated_by: cmd.actor,
            created_at: cmd.occurred_at,
            updated_at: cmd.occurred_at,
        })
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn shop_id(&self) -> ShopId {
        self.shop_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn barcode(&self) -> Option<&str> {
        self.barcode.as_deref()
    }

    pub fn cost_price(&self) -> u64 {
        self.cost_price
    }

    pub fn selling_price(&self) -> u64 {
        self.selling_price
    }

    pub fn tracks_inventory(&self) -> bool {
        self.tracks_inventory
    }

    pub fn tracks_expiry(&self) -> bool {
        self.tracks_expiry
    }

    /// Materialized product-level balance (meaningful only for [`Tracking::ProductLevel`]).
    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    /// Number of ledger entries addressed to the product-level unit.
    pub fn ledger_version(&self) -> u64 {
        self.ledger_version
    }

    pub fn stock_alert_threshold(&self) -> i64 {
        self.stock_alert_threshold
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }

    pub fn batch_ids(&self) -> &[BatchId] {
        &self.batch_ids
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn updated_by(&self) -> Option<UserId> {
        self.updated_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn tracking(&self) -> Tracking {
        if self.tracks_expiry {
            Tracking::BatchLevel
        } else if self.tracks_inventory {
            Tracking::ProductLevel
        } else {
            Tracking::Untracked
        }
    }

    /// The product-level stock unit.
    pub fn unit(&self) -> StockUnit {
        StockUnit::product(self.shop_id, self.id)
    }

    pub fn balance(&self) -> UnitBalance {
        UnitBalance {
            quantity: self.quantity,
            version: self.ledger_version,
        }
    }

    pub fn is_below_alert(&self) -> bool {
        self.quantity <= self.stock_alert_threshold
    }

    pub fn snapshot(&self) -> ProductSnapshot {
        ProductSnapshot {
            product_id: self.id,
            name: self.name.clone(),
            barcode: self.barcode.clone(),
            cost_price: self.cost_price,
            selling_price: self.selling_price,
            tracks_inventory: self.tracks_inventory,
            tracks_expiry: self.tracks_expiry,
            stock_alert_threshold: self.stock_alert_threshold,
            quantity: self.quantity,
        }
    }

    pub fn update_details(
        &mut self,
        update: UpdateProductDetails,
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(DomainError::validation("product name cannot be empty"));
            }
        }
        if let Some(threshold) = update.stock_alert_threshold {
            if threshold < 0 {
                return Err(DomainError::validation("stock alert threshold cannot be negative"));
            }
        }

        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if update.barcode.is_some() {
            self.barcode = normalize_barcode(update.barcode);
        }
        if let Some(price) = update.cost_price {
            self.cost_price = price;
        }
        if let Some(price) = update.selling_price {
            self.selling_price = price;
        }
        if let Some(threshold) = update.stock_alert_threshold {
            self.stock_alert_threshold = threshold;
        }
        self.touch(actor, at);
        Ok(())
    }

    /// Append batch links (duplicates are ignored, order is preserved).
    pub fn link_batches(
        &mut self,
        batch_ids: &[BatchId],
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !self.is_active() {
            return Err(DomainError::not_found(format!("product {} is inactive", self.id)));
        }
        if !self.tracks_expiry {
            return Err(DomainError::validation(format!(
                "product {} does not track expiry and cannot hold batches",
                self.id
            )));
        }
        for id in batch_ids {
            if !self.batch_ids.contains(id) {
                self.batch_ids.push(*id);
            }
        }
        self.touch(actor, at);
        Ok(())
    }

    pub fn unlink_batch(&mut self, batch_id: BatchId) {
        self.batch_ids.retain(|id| *id != batch_id);
    }

    /// Transition to inactive and sever every batch link.
    ///
    /// Returns the batches that were linked so the caller can clear their back
    /// references in the same unit of work. Deactivating an inactive product is
    /// a no-op returning nothing.
    pub fn deactivate(&mut self, actor: Option<UserId>, at: DateTime<Utc>) -> Vec<BatchId> {
        if !self.is_active() {
            return Vec::new();
        }
        self.status = ProductStatus::Inactive;
        self.touch(actor, at);
        std::mem::take(&mut self.batch_ids)
    }

    /// Reactivation does not restore the links severed on deactivation.
    pub fn reactivate(&mut self, actor: Option<UserId>, at: DateTime<Utc>) {
        if self.is_active() {
            return;
        }
        self.status = ProductStatus::Active;
        self.touch(actor, at);
    }

    /// Write the product-level balance produced by a committed ledger entry.
    pub fn materialize(&mut self, balance: UnitBalance, actor: Option<UserId>, at: DateTime<Utc>) {
        self.quantity = balance.quantity;
        self.ledger_version = balance.version;
        self.touch(actor, at);
    }

    fn touch(&mut self, actor: Option<UserId>, at: DateTime<Utc>) {
        if actor.is_some() {
            self.updated_by = actor;
        }
        self.updated_at = at;
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn normalize_barcode(barcode: Option<String>) -> Option<String> {
    barcode
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
}
