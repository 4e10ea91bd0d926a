use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{ShopId, UserId};
use stockledger_events::Event;
use stockledger_products::{BatchId, ProductId};

use crate::ledger::{LedgerEntry, LedgerEntryId};
use crate::movement::{MovementKind, OriginRef};

/// Event: EntryRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecorded {
    pub shop_id: ShopId,
    pub entry_id: LedgerEntryId,
    pub product_id: ProductId,
    pub batch_id: Option<BatchId>,
    pub kind: MovementKind,
    pub quantity: i64,
    pub resulting_balance: i64,
    pub sequence: u64,
    /// Alert threshold of the unit at commit time.
    pub stock_alert_threshold: i64,
    pub origin: Option<OriginRef>,
    pub occurred_at: DateTime<Utc>,
}

impl EntryRecorded {
    pub fn from_entry(entry: &LedgerEntry, stock_alert_threshold: i64) -> Self {
        Self {
            shop_id: entry.shop_id,
            entry_id: entry.id,
            product_id: entry.product_id,
            batch_id: entry.batch_id,
            kind: entry.kind,
            quantity: entry.quantity,
            resulting_balance: entry.resulting_balance,
            sequence: entry.sequence,
            stock_alert_threshold,
            origin: entry.origin,
            occurred_at: entry.occurred_at,
        }
    }

    pub fn is_below_alert(&self) -> bool {
        self.resulting_balance <= self.stock_alert_threshold
    }
}

/// Event: BatchCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCreated {
    pub shop_id: ShopId,
    pub batch_id: BatchId,
    pub batch_number: String,
    pub expiry_date: DateTime<Utc>,
    pub product_id: Option<ProductId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchesLinked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchesLinked {
    pub shop_id: ShopId,
    pub product_id: ProductId,
    pub batch_ids: Vec<BatchId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeactivated {
    pub shop_id: ShopId,
    pub product_id: ProductId,
    /// Batches whose product reference was cleared in the same commit.
    pub released_batch_ids: Vec<BatchId>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    EntryRecorded(EntryRecorded),
    BatchCreated(BatchCreated),
    BatchesLinked(BatchesLinked),
    ProductDeactivated(ProductDeactivated),
}

impl InventoryEvent {
    pub fn shop_id(&self) -> ShopId {
        match self {
            InventoryEvent::EntryRecorded(e) => e.shop_id,
            InventoryEvent::BatchCreated(e) => e.shop_id,
            InventoryEvent::BatchesLinked(e) => e.shop_id,
            InventoryEvent::ProductDeactivated(e) => e.shop_id,
        }
    }
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::EntryRecorded(_) => "inventory.entry.recorded",
            InventoryEvent::BatchCreated(_) => "inventory.batch.created",
            InventoryEvent::BatchesLinked(_) => "inventory.batch.linked",
            InventoryEvent::ProductDeactivated(_) => "inventory.product.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::EntryRecorded(e) => e.occurred_at,
            InventoryEvent::BatchCreated(e) => e.occurred_at,
            InventoryEvent::BatchesLinked(e) => e.occurred_at,
            InventoryEvent::ProductDeactivated(e) => e.occurred_at,
        }
    }
}
