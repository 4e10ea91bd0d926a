//! Receipt workflow: purchases recorded through expense intake.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, instrument, warn};

use stockledger_core::{Aggregate, AggregateId, AggregateRoot, ExpectedVersion, ShopId, UserId};
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_inventory::LedgerEntry;
use stockledger_products::{BatchId, ProductId, Tracking, resolve_unit};
use stockledger_purchasing::{
    Expense, ExpenseCommand, ExpenseEvent, ExpenseId, ExpenseKind, ExpenseLine, ExpenseLineInput, LineRevision,
    RecordExpense, ReviseExpense,
};

use super::InventoryEngine;
use crate::error::{EngineError, EngineResult};
use crate::store::{DocumentAppend, DocumentKind, UncommittedEvent, WriteBatch};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseLineRequest {
    #[serde(default)]
    pub product_id: Option<ProductId>,
    #[serde(default)]
    pub batch_id: Option<BatchId>,
    #[serde(default)]
    pub description: String,
    pub quantity: i64,
    #[serde(default)]
    pub unit_cost: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordExpenseRequest {
    #[serde(default)]
    pub expense_id: Option<ExpenseId>,
    pub kind: ExpenseKind,
    /// When false the expense is a purely financial record.
    #[serde(default = "default_update_stock")]
    pub update_stock: bool,
    pub lines: Vec<ExpenseLineRequest>,
}

fn default_update_stock() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseExpenseRequest {
    pub kind: ExpenseKind,
    pub lines: Vec<LineRevision>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseOutcome {
    pub expense_id: ExpenseId,
    pub shop_id: ShopId,
    pub kind: ExpenseKind,
    pub update_stock: bool,
    pub version: u64,
    pub total_cost: u64,
    pub lines: Vec<ExpenseLine>,
    pub entries: Vec<LedgerEntry>,
}

impl ExpenseOutcome {
    fn new(shop_id: ShopId, expense: &Expense, entries: Vec<LedgerEntry>) -> Self {
        Self {
            expense_id: expense.id_typed(),
            shop_id,
            kind: expense.kind(),
            update_stock: expense.update_stock(),
            version: expense.version(),
            total_cost: expense.total_cost(),
            lines: expense.lines().to_vec(),
            entries,
        }
    }
}

impl<B> InventoryEngine<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Record an expense, posting one `purchase` entry per line that resolves
    /// to a unit when stock updates are enabled.
    #[instrument(skip(self, request), fields(kind = ?request.kind, lines = request.lines.len()), err)]
    pub fn record_expense(
        &self,
        shop_id: ShopId,
        request: RecordExpenseRequest,
        actor: Option<UserId>,
    ) -> EngineResult<ExpenseOutcome> {
        let expense_id = request.expense_id.unwrap_or_else(|| ExpenseId::new(AggregateId::new()));
        let at = Utc::now();
        self.with_retries("record_expense", || self.try_record_expense(shop_id, expense_id, &request, actor, at))
    }

    fn try_record_expense(
        &self,
        shop_id: ShopId,
        expense_id: ExpenseId,
        request: &RecordExpenseRequest,
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> EngineResult<ExpenseOutcome> {
        let mut expense = Expense::empty(expense_id);
        let version = self.rehydrate(shop_id, DocumentKind::Expense, expense_id.0, &mut expense)?;

        let mut inputs = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            inputs.push(self.resolve_expense_line(shop_id, request.kind, request.update_stock, line)?);
        }

        let events = expense.handle(&ExpenseCommand::RecordExpense(RecordExpense {
            shop_id,
            expense_id,
            kind: request.kind,
            update_stock: request.update_stock,
            lines: inputs,
            actor,
            occurred_at: at,
        }))?;

        let entries = self.commit_expense(shop_id, &mut expense, version, events)?;
        info!(expense_id = %expense_id, entries = entries.len(), "expense recorded");
        Ok(ExpenseOutcome::new(shop_id, &expense, entries))
    }

    /// Snapshot a line's catalog references and pick the unit it receives into.
    fn resolve_expense_line(
        &self,
        shop_id: ShopId,
        kind: ExpenseKind,
        update_stock: bool,
        line: &ExpenseLineRequest,
    ) -> EngineResult<ExpenseLineInput> {
        let mut input = ExpenseLineInput {
            product_id: line.product_id,
            batch_id: line.batch_id,
            description: line.description.clone(),
            quantity: line.quantity,
            unit_cost: line.unit_cost,
            product_snapshot: None,
            batch_snapshot: None,
            unit: None,
        };
        let Some(product_id) = line.product_id else {
            return Ok(input);
        };
        if kind == ExpenseKind::NonInventory {
            // The aggregate rejects the product reference.
            return Ok(input);
        }

        let (product, batch) = self.load_refs(shop_id, product_id, line.batch_id)?;
        if let Some(batch) = &batch {
            if !batch.belongs_to(product_id) {
                return Err(EngineError::validation(format!(
                    "batch {} does not belong to product {}",
                    batch.batch_number(),
                    product.name()
                )));
            }
        }

        input.product_snapshot = Some(product.snapshot());
        input.batch_snapshot = batch.as_ref().map(|b| b.snapshot());
        if input.description.trim().is_empty() {
            input.description = product.name().to_string();
        }

        if update_stock {
            input.unit = match (product.tracking(), &batch) {
                (Tracking::BatchLevel, None) => {
                    if !product.is_active() {
                        return Err(EngineError::not_found(format!("product {product_id} is inactive")));
                    }
                    warn!(product_id = %product_id, "expiry-tracked purchase without a batch; no stock posted");
                    None
                }
                _ => resolve_unit(&product, batch.as_ref())?,
            };
        } else if !product.is_active() {
            return Err(EngineError::not_found(format!("product {product_id} is inactive")));
        }
        Ok(input)
    }

    /// Correct descriptions or costs on a recorded expense.
    ///
    /// Kind, line count, products and quantities are frozen; a revision never
    /// posts ledger entries.
    #[instrument(skip(self, expense_id, request), fields(expense_id = %expense_id), err)]
    pub fn revise_expense(
        &self,
        shop_id: ShopId,
        expense_id: ExpenseId,
        request: ReviseExpenseRequest,
        actor: Option<UserId>,
    ) -> EngineResult<ExpenseOutcome> {
        let at = Utc::now();
        self.with_retries("revise_expense", || {
            let mut expense = Expense::empty(expense_id);
            let version = self.rehydrate(shop_id, DocumentKind::Expense, expense_id.0, &mut expense)?;
            if !expense.is_recorded() {
                return Err(EngineError::not_found(format!("expense {expense_id} in shop {shop_id}")));
            }

            let events = expense.handle(&ExpenseCommand::ReviseExpense(ReviseExpense {
                shop_id,
                expense_id,
                kind: request.kind,
                lines: request.lines.clone(),
                actor,
                occurred_at: at,
            }))?;
            if events.is_empty() {
                return Ok(ExpenseOutcome::new(shop_id, &expense, Vec::new()));
            }

            let entries = self.commit_expense(shop_id, &mut expense, version, events)?;
            info!("expense revised");
            Ok(ExpenseOutcome::new(shop_id, &expense, entries))
        })
    }

    pub fn expense(&self, shop_id: ShopId, expense_id: ExpenseId) -> EngineResult<ExpenseOutcome> {
        let mut expense = Expense::empty(expense_id);
        self.rehydrate(shop_id, DocumentKind::Expense, expense_id.0, &mut expense)?;
        if !expense.is_recorded() {
            return Err(EngineError::not_found(format!("expense {expense_id} in shop {shop_id}")));
        }
        Ok(ExpenseOutcome::new(shop_id, &expense, Vec::new()))
    }

    fn commit_expense(
        &self,
        shop_id: ShopId,
        expense: &mut Expense,
        version: u64,
        events: Vec<ExpenseEvent>,
    ) -> EngineResult<Vec<LedgerEntry>> {
        let postings = events.iter().flat_map(ExpenseEvent::stock_postings).collect();
        let uncommitted = events
            .iter()
            .map(UncommittedEvent::from_typed)
            .collect::<Result<Vec<_>, _>>()?;
        let batch = WriteBatch::postings(postings).with_document(DocumentAppend {
            shop_id,
            stream_id: expense.id_typed().0,
            kind: DocumentKind::Expense,
            expected: ExpectedVersion::Exact(version),
            events: uncommitted,
        });

        let receipt = self.store.commit(batch)?;
        self.publish_receipt(&receipt);

        for event in &events {
            expense.apply(event);
        }
        Ok(receipt.entries.into_iter().map(|r| r.entry).collect())
    }
}
