use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{AggregateId, DomainError, DomainResult, Entity, ShopId, UserId};

use crate::product::ProductId;
use crate::snapshot::BatchSnapshot;
use crate::unit::{StockUnit, UnitBalance};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub AggregateId);

impl BatchId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BatchId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Active,
    Inactive,
}

/// Entity: Batch.
///
/// A lot of stock sharing one expiry date. Carries its own balance and ledger
/// version; the owning product keeps the reverse link in `batch_ids`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    id: BatchId,
    shop_id: ShopId,
    batch_number: String,
    expiry_date: DateTime<Utc>,
    quantity: i64,
    ledger_version: u64,
    stock_alert_threshold: i64,
    status: BatchStatus,
    product_id: Option<ProductId>,
    created_by: Option<UserId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBatch {
    pub shop_id: ShopId,
    pub batch_id: BatchId,
    pub batch_number: String,
    pub expiry_date: DateTime<Utc>,
    pub stock_alert_threshold: i64,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

impl Batch {
    /// Build a new, unlinked batch with zero stock.
    ///
    /// Uniqueness of `batch_number` among active batches of the shop is a
    /// store-level constraint and is not checked here.
    pub fn create(cmd: CreateBatch) -> DomainResult<Self> {
        let batch_number = cmd.batch_number.trim();
        if batch_number.is_empty() {
            return Err(DomainError::validation("batch number cannot be empty"));
        }
        if cmd.expiry_date <= cmd.occurred_at {
            return Err(DomainError::validation(format!(
                "batch {batch_number} expiry date must be in the future"
            )));
        }
        if cmd.stock_alert_threshold <= 0 {
            return Err(DomainError::validation(
                "batch stock alert threshold must be positive",
            ));
        }

        Ok(Self {
            id: cmd.batch_id,
            shop_id: cmd.shop_id,
            batch_number: batch_number.to_string(),
            expiry_date: cmd.expiry_date,
            quantity: 0,
            ledger_version: 0,
            stock_alert_threshold: cmd.stock_alert_threshold,
            status: BatchStatus::Active,
            product_id: None,
            created_by: cmd.actor,
            created_at: cmd.occurred_at,
            updated_at: cmd.occurred_at,
        })
    }

    pub fn id_typed(&self) -> BatchId {
        self.id
    }

    pub fn shop_id(&self) -> ShopId {
        self.shop_id
    }

    pub fn batch_number(&self) -> &str {
        &self.batch_number
    }

    pub fn expiry_date(&self) -> DateTime<Utc> {
        self.expiry_date
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn ledger_version(&self) -> u64 {
        self.ledger_version
    }

    pub fn stock_alert_threshold(&self) -> i64 {
        self.stock_alert_threshold
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == BatchStatus::Active
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Expired once `as_of` reaches the expiry instant.
    pub fn is_expired(&self, as_of: DateTime<Utc>) -> bool {
        self.expiry_date <= as_of
    }

    pub fn is_below_alert(&self) -> bool {
        self.quantity <= self.stock_alert_threshold
    }

    pub fn belongs_to(&self, product_id: ProductId) -> bool {
        self.product_id == Some(product_id)
    }

    /// The stock unit for this batch under its linked product, if any.
    pub fn unit(&self) -> Option<StockUnit> {
        self.product_id
            .map(|product_id| StockUnit::batch(self.shop_id, product_id, self.id))
    }

    pub fn balance(&self) -> UnitBalance {
        UnitBalance {
            quantity: self.quantity,
            version: self.ledger_version,
        }
    }

    pub fn snapshot(&self) -> BatchSnapshot {
        BatchSnapshot {
            batch_id: self.id,
            batch_number: self.batch_number.clone(),
            expiry_date: self.expiry_date,
            stock_alert_threshold: self.stock_alert_threshold,
            quantity: self.quantity,
        }
    }

    /// Link to a product. A batch belongs to at most one product, so linking
    /// to a different one moves it.
    ///
    /// Returns the product the batch was moved away from, so the caller can
    /// drop that product's reference in the same unit of work.
    pub fn link_to(&mut self, product_id: ProductId, at: DateTime<Utc>) -> DomainResult<Option<ProductId>> {
        if !self.is_active() {
            return Err(DomainError::not_found(format!("batch {} is inactive", self.id)));
        }
        if self.product_id == Some(product_id) {
            return Ok(None);
        }
        self.updated_at = at;
        Ok(self.product_id.replace(product_id))
    }

    pub fn clear_product(&mut self, at: DateTime<Utc>) {
        if self.product_id.take().is_some() {
            self.updated_at = at;
        }
    }

    /// Returns the product the batch was linked to, so the caller can drop the reverse link.
    pub fn deactivate(&mut self, at: DateTime<Utc>) -> Option<ProductId> {
        if !self.is_active() {
            return None;
        }
        self.status = BatchStatus::Inactive;
        self.updated_at = at;
        self.product_id.take()
    }

    pub fn materialize(&mut self, balance: UnitBalance, at: DateTime<Utc>) {
        self.quantity = balance.quantity;
        self.ledger_version = balance.version;
        self.updated_at = at;
    }
}

impl Entity for Batch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cmd(expires_in_days: i64) -> CreateBatch {
        let now = Utc::now();
        CreateBatch {
            shop_id: ShopId::new(),
            batch_id: BatchId::new(AggregateId::new()),
            batch_number: "LOT-001".to_string(),
            expiry_date: now + Duration::days(expires_in_days),
            stock_alert_threshold: 3,
            actor: None,
            occurred_at: now,
        }
    }

    #[test]
    fn create_requires_future_expiry() {
        assert!(Batch::create(cmd(30)).is_ok());
        assert!(matches!(Batch::create(cmd(0)), Err(DomainError::Validation(_))));
        assert!(matches!(Batch::create(cmd(-1)), Err(DomainError::Validation(_))));
    }

    #[test]
    fn create_requires_positive_threshold() {
        let mut c = cmd(10);
        c.stock_alert_threshold = 0;
        assert!(matches!(Batch::create(c), Err(DomainError::Validation(_))));
    }

    #[test]
    fn expiry_boundary_counts_as_expired() {
        let batch = Batch::create(cmd(1)).unwrap();
        assert!(!batch.is_expired(batch.expiry_date() - Duration::seconds(1)));
        assert!(batch.is_expired(batch.expiry_date()));
    }

    #[test]
    fn link_to_second_product_moves_the_batch() {
        let mut batch = Batch::create(cmd(10)).unwrap();
        let p1 = ProductId::new(AggregateId::new());
        let p2 = ProductId::new(AggregateId::new());
        assert_eq!(batch.link_to(p1, Utc::now()).unwrap(), None);
        assert_eq!(batch.link_to(p1, Utc::now()).unwrap(), None);
        assert_eq!(batch.link_to(p2, Utc::now()).unwrap(), Some(p1));
        assert!(!batch.belongs_to(p1));
        assert_eq!(batch.unit().map(|u| u.product_id), Some(p2));
    }

    #[test]
    fn inactive_batch_cannot_be_linked() {
        let mut batch = Batch::create(cmd(10)).unwrap();
        batch.deactivate(Utc::now());
        let p1 = ProductId::new(AggregateId::new());
        assert!(matches!(batch.link_to(p1, Utc::now()), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn deactivate_releases_product_link() {
        let mut batch = Batch::create(cmd(10)).unwrap();
        let p1 = ProductId::new(AggregateId::new());
        batch.link_to(p1, Utc::now()).unwrap();
        assert_eq!(batch.deactivate(Utc::now()), Some(p1));
        assert!(batch.product_id().is_none());
        assert_eq!(batch.deactivate(Utc::now()), None);
    }
}
