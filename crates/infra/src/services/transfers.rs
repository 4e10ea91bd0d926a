//! Cross-shop transfer workflow.
//!
//! The destination unit is matched by barcode (and batch number for
//! expiry-tracked stock). Both legs commit in one write batch, so a single
//! transfer never leaves a half-moved quantity behind. A bulk call runs its
//! tuples independently and reports each one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use stockledger_core::UserId;
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_inventory::{LedgerEntry, TransferRequest, transfer_postings};
use stockledger_products::{Batch, Product, StockUnit, Tracking, describe_unit, resolve_unit};

use super::InventoryEngine;
use crate::error::{EngineError, EngineResult};
use crate::store::WriteBatch;

/// Why one tuple of a bulk transfer was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFailure {
    pub error: String,
    pub message: String,
}

impl From<&EngineError> for TransferFailure {
    fn from(err: &EngineError) -> Self {
        Self {
            error: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferResult {
    Transferred { entries: Vec<LedgerEntry> },
    Failed(TransferFailure),
}

/// Result of one tuple, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub index: usize,
    pub request: TransferRequest,
    pub result: TransferResult,
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.result, TransferResult::Transferred { .. })
    }
}

impl<B> InventoryEngine<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Move `quantity` of a product (or one of its batches) to the matching
    /// unit of another shop. Returns the `[transfer-out, transfer-in]` pair.
    #[instrument(
        skip(self, request),
        fields(from_shop = %request.from_shop, to_shop = %request.to_shop, quantity = request.quantity),
        err
    )]
    pub fn transfer(&self, request: &TransferRequest, actor: Option<UserId>) -> EngineResult<[LedgerEntry; 2]> {
        request.validate()?;
        let at = Utc::now();
        let transfer_id = Uuid::now_v7();
        self.with_retries("transfer", || self.try_transfer(request, transfer_id, actor, at))
    }

    fn try_transfer(
        &self,
        request: &TransferRequest,
        transfer_id: Uuid,
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> EngineResult<[LedgerEntry; 2]> {
        let (product, batch) = self.load_refs(request.from_shop, request.product_id, request.batch_id)?;
        let source = self.tracked_unit(&product, batch.as_ref())?;
        let source_balance = self.store.balance(source)?;
        if source_balance.quantity < request.quantity {
            return Err(EngineError::InsufficientStock {
                unit: describe_unit(&product, batch.as_ref()),
                requested: request.quantity,
                available: source_balance.quantity,
            });
        }

        let destination = self.destination_unit(request, &product, batch.as_ref())?;
        let destination_balance = self.store.balance(destination)?;

        let postings = transfer_postings(
            transfer_id,
            request.quantity,
            (source, source_balance),
            (destination, destination_balance),
            actor,
            at,
        )?;
        let receipt = self.store.commit(WriteBatch::postings(postings.to_vec()))?;
        self.publish_receipt(&receipt);

        let mut entries = receipt.entries.into_iter().map(|r| r.entry);
        match (entries.next(), entries.next()) {
            (Some(out), Some(into)) => {
                info!(
                    transfer_id = %transfer_id,
                    source_balance = out.resulting_balance,
                    destination_balance = into.resulting_balance,
                    "transfer committed"
                );
                Ok([out, into])
            }
            _ => Err(EngineError::Store(format!("transfer {transfer_id} did not record both legs"))),
        }
    }

    /// Find the unit in the destination shop matching the source product's
    /// barcode and, for batch stock, the source batch's number.
    fn destination_unit(&self, request: &TransferRequest, product: &Product, batch: Option<&Batch>) -> EngineResult<StockUnit> {
        let barcode = product.barcode().ok_or_else(|| {
            EngineError::not_found(format!(
                "product {} has no barcode to match in shop {}",
                product.name(),
                request.to_shop
            ))
        })?;
        let target = self
            .store
            .find_product_by_barcode(request.to_shop, barcode)?
            .ok_or_else(|| EngineError::not_found(format!("no product with barcode {barcode} in shop {}", request.to_shop)))?;

        let no_match = || {
            EngineError::not_found(format!(
                "no matching unit for {} in shop {}",
                describe_unit(product, batch),
                request.to_shop
            ))
        };

        let target_batch = match batch {
            None => None,
            Some(source_batch) => {
                let found = self
                    .store
                    .find_active_batch_by_number(request.to_shop, source_batch.batch_number())?
                    .filter(|b| b.belongs_to(target.id_typed()))
                    .ok_or_else(no_match)?;
                Some(found)
            }
        };

        match (target.tracking(), &target_batch) {
            (Tracking::ProductLevel, None) | (Tracking::BatchLevel, Some(_)) => {
                resolve_unit(&target, target_batch.as_ref())?.ok_or_else(no_match)
            }
            _ => Err(no_match()),
        }
    }

    /// Apply each tuple on its own. A failed tuple does not undo the others.
    #[instrument(skip(self, requests), fields(count = requests.len()))]
    pub fn transfer_bulk(&self, requests: Vec<TransferRequest>, actor: Option<UserId>) -> Vec<TransferOutcome> {
        let mut outcomes = Vec::with_capacity(requests.len());
        for (index, request) in requests.into_iter().enumerate() {
            let result = match self.transfer(&request, actor) {
                Ok(entries) => TransferResult::Transferred {
                    entries: entries.to_vec(),
                },
                Err(err) => {
                    warn!(
                        index,
                        from_shop = %request.from_shop,
                        to_shop = %request.to_shop,
                        product_id = %request.product_id,
                        error = %err,
                        "transfer tuple failed"
                    );
                    TransferResult::Failed(TransferFailure::from(&err))
                }
            };
            outcomes.push(TransferOutcome { index, request, result });
        }

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        if failed > 0 {
            warn!(failed, total = outcomes.len(), "bulk transfer partially applied");
        } else {
            info!(total = outcomes.len(), "bulk transfer applied");
        }
        outcomes
    }
}
