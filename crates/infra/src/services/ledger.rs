//! Ledger entry store operations: raw movements, adjustments, history and
//! maintenance.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, instrument, warn};

use stockledger_core::{ShopId, UserId};
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_inventory::{LedgerEntry, LedgerPosting, MovementKind, OriginRef, Reconciliation};
use stockledger_products::{BatchId, ProductId, StockUnit};

use super::InventoryEngine;
use crate::error::{EngineError, EngineResult};
use crate::store::{LedgerFilter, LedgerPage, Pagination, WriteBatch};

/// A movement posted as-is against a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub product_id: ProductId,
    pub batch_id: Option<BatchId>,
    pub kind: MovementKind,
    pub quantity: i64,
    pub reason: Option<String>,
    pub origin: Option<OriginRef>,
}

/// A compensating correction with its mandatory reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub product_id: ProductId,
    pub batch_id: Option<BatchId>,
    pub quantity: i64,
    pub reason: String,
}

impl<B> InventoryEngine<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Append one entry and move the unit's materialized balance with it.
    ///
    /// The resulting balance is not checked for sign; workflows that consume
    /// stock pre-validate availability before posting.
    #[instrument(skip(self, movement), fields(kind = %movement.kind, quantity = movement.quantity), err)]
    pub fn record(&self, shop_id: ShopId, movement: RecordMovement, actor: Option<UserId>) -> EngineResult<LedgerEntry> {
        let (product, batch) = self.load_refs(shop_id, movement.product_id, movement.batch_id)?;
        let unit = self.tracked_unit(&product, batch.as_ref())?;

        let mut posting = LedgerPosting::new(unit, movement.kind, movement.quantity, actor, Utc::now());
        if let Some(reason) = movement.reason {
            posting = posting.with_reason(reason);
        }
        if let Some(origin) = movement.origin {
            posting = posting.with_origin(origin);
        }
        posting.validate()?;

        self.post_single(posting)
    }

    /// Post an `adjustment` entry. A blank reason is rejected.
    #[instrument(skip(self, adjustment), fields(quantity = adjustment.quantity), err)]
    pub fn adjust(&self, shop_id: ShopId, adjustment: Adjustment, actor: Option<UserId>) -> EngineResult<LedgerEntry> {
        self.record(
            shop_id,
            RecordMovement {
                product_id: adjustment.product_id,
                batch_id: adjustment.batch_id,
                kind: MovementKind::Adjustment,
                quantity: adjustment.quantity,
                reason: Some(adjustment.reason),
                origin: None,
            },
            actor,
        )
    }

    fn post_single(&self, posting: LedgerPosting) -> EngineResult<LedgerEntry> {
        let receipt = self.store.commit(WriteBatch::postings(vec![posting]))?;
        self.publish_receipt(&receipt);

        let recorded = receipt
            .entries
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Store("commit returned no entry".to_string()))?;
        let entry = recorded.entry;
        info!(
            unit = %entry.unit(),
            kind = %entry.kind,
            quantity = entry.quantity,
            resulting_balance = entry.resulting_balance,
            "ledger entry recorded"
        );
        Ok(entry)
    }

    /// Paginated ledger history of a shop, oldest first.
    pub fn history(
        &self,
        shop_id: ShopId,
        filter: &LedgerFilter,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> EngineResult<LedgerPage> {
        let pagination = Pagination::new(limit, offset, self.config.default_page_size);
        Ok(self.store.query_entries(shop_id, filter, pagination)?)
    }

    /// Every entry of one unit, in sequence order.
    pub fn unit_history(&self, unit: StockUnit) -> EngineResult<Vec<LedgerEntry>> {
        Ok(self.store.unit_entries(unit)?)
    }

    /// Compare the unit's materialized balance with a replay of its ledger.
    pub fn reconcile(&self, unit: StockUnit) -> EngineResult<Reconciliation> {
        let materialized = self.store.balance(unit)?;
        let entries = self.store.unit_entries(unit)?;
        let reconciliation = Reconciliation::new(unit, materialized, &entries);
        if !reconciliation.is_consistent() {
            warn!(unit = %unit, drift = reconciliation.drift(), "materialized balance drifted from ledger");
        }
        Ok(reconciliation)
    }

    /// Rewrite the unit's materialized balance from its ledger.
    #[instrument(skip(self, unit), fields(unit = %unit), err)]
    pub fn rematerialize(&self, unit: StockUnit) -> EngineResult<Reconciliation> {
        let reconciliation = self.store.rematerialize(unit)?;
        if reconciliation.is_consistent() {
            info!("materialized balance already consistent");
        } else {
            warn!(drift = reconciliation.drift(), "materialized balance rewritten from ledger");
        }
        Ok(reconciliation)
    }
}
