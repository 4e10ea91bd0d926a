//! Order consumption workflow.
//!
//! Placing an order checks availability per unit against the balances it
//! read, snapshots the catalog, and commits the sale postings together with
//! the `OrderPlaced` event. Every posting is pinned to the unit version the
//! check saw, so two orders racing for the last units cannot both land.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, instrument};

use stockledger_core::{Aggregate, AggregateId, AggregateRoot, ExpectedVersion, ShopId, UserId};
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_inventory::{LedgerEntry, LedgerPosting};
use stockledger_products::{StockUnit, UnitBalance, describe_unit, resolve_unit};
use stockledger_sales::{
    LineRef, LineUpdate, Order, OrderCommand, OrderEvent, OrderId, OrderLine, PlaceOrder, PlacedLine, UpdateOrder,
};

use super::InventoryEngine;
use crate::error::{EngineError, EngineResult};
use crate::store::{DocumentAppend, DocumentKind, UncommittedEvent, WriteBatch};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub reference: LineRef,
    pub quantity: i64,
    #[serde(default)]
    pub unit_price: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    /// Caller-chosen id; generated when absent.
    #[serde(default)]
    pub order_id: Option<OrderId>,
    pub lines: Vec<OrderLineRequest>,
}

/// Submitted state of one line; only `quantity_returned` may differ.
pub type OrderUpdateLine = LineUpdate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOrderRequest {
    pub lines: Vec<OrderUpdateLine>,
}

/// An order as stored, plus the ledger entries the call posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderOutcome {
    pub order_id: OrderId,
    pub shop_id: ShopId,
    pub version: u64,
    pub placed_at: Option<DateTime<Utc>>,
    pub lines: Vec<OrderLine>,
    pub entries: Vec<LedgerEntry>,
}

impl OrderOutcome {
    fn new(shop_id: ShopId, order: &Order, entries: Vec<LedgerEntry>) -> Self {
        Self {
            order_id: order.id_typed(),
            shop_id,
            version: order.version(),
            placed_at: order.placed_at(),
            lines: order.lines().to_vec(),
            entries,
        }
    }
}

/// Quantity requested so far against one unit in this order.
struct UnitDemand {
    balance: UnitBalance,
    requested: i64,
}

impl<B> InventoryEngine<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Place an order, posting one `sale` entry per stock-tracked line.
    #[instrument(skip(self, request), fields(lines = request.lines.len()), err)]
    pub fn place_order(
        &self,
        shop_id: ShopId,
        request: PlaceOrderRequest,
        actor: Option<UserId>,
    ) -> EngineResult<OrderOutcome> {
        let order_id = request.order_id.unwrap_or_else(|| OrderId::new(AggregateId::new()));
        let at = Utc::now();
        self.with_retries("place_order", || self.try_place_order(shop_id, order_id, &request.lines, actor, at))
    }

    fn try_place_order(
        &self,
        shop_id: ShopId,
        order_id: OrderId,
        requested: &[OrderLineRequest],
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> EngineResult<OrderOutcome> {
        let mut order = Order::empty(order_id);
        let version = self.rehydrate(shop_id, DocumentKind::Order, order_id.0, &mut order)?;
        if order.is_placed() {
            return Err(EngineError::Conflict(format!("order {order_id} already exists")));
        }

        let mut demand: HashMap<StockUnit, UnitDemand> = HashMap::new();
        let mut lines = Vec::with_capacity(requested.len());
        for (idx, line) in requested.iter().enumerate() {
            if line.quantity <= 0 {
                return Err(EngineError::validation(format!(
                    "line {}: quantity must be positive",
                    idx + 1
                )));
            }
            let (product_id, batch_id) = match line.reference {
                LineRef::Service { .. } => {
                    lines.push(PlacedLine {
                        reference: line.reference,
                        quantity: line.quantity,
                        unit_price: line.unit_price,
                        product_snapshot: None,
                        batch_snapshot: None,
                        unit: None,
                    });
                    continue;
                }
                LineRef::Product { product_id, batch_id } => (product_id, batch_id),
            };

            let (product, batch) = self.load_refs(shop_id, product_id, batch_id)?;
            let unit = resolve_unit(&product, batch.as_ref())?;

            if let Some(unit) = unit {
                let balance = match &batch {
                    Some(batch) => batch.balance(),
                    None => product.balance(),
                };
                let entry = demand.entry(unit).or_insert(UnitDemand { balance, requested: 0 });
                entry.requested += line.quantity;
                if entry.requested > entry.balance.quantity {
                    return Err(EngineError::InsufficientStock {
                        unit: describe_unit(&product, batch.as_ref()),
                        requested: entry.requested,
                        available: entry.balance.quantity,
                    });
                }
            }

            lines.push(PlacedLine {
                reference: line.reference,
                quantity: line.quantity,
                unit_price: line.unit_price,
                product_snapshot: Some(product.snapshot()),
                batch_snapshot: batch.as_ref().map(|b| b.snapshot()),
                unit,
            });
        }

        let events = order.handle(&OrderCommand::PlaceOrder(PlaceOrder {
            shop_id,
            order_id,
            lines,
            actor,
            occurred_at: at,
        }))?;

        let postings = events
            .iter()
            .flat_map(OrderEvent::stock_postings)
            .map(|p| {
                let expected = demand
                    .get(&p.unit)
                    .map(|d| ExpectedVersion::Exact(d.balance.version))
                    .unwrap_or(ExpectedVersion::Any);
                p.expecting(expected)
            })
            .collect();

        let entries = self.commit_order(shop_id, &mut order, version, events, postings)?;
        info!(order_id = %order_id, entries = entries.len(), "order placed");
        Ok(OrderOutcome::new(shop_id, &order, entries))
    }

    /// Record returns on an existing order.
    ///
    /// The line count and each line's reference are frozen; `quantity_returned`
    /// may only grow, up to the purchased quantity. Each increase posts a
    /// `return` entry to the unit the sale used.
    #[instrument(skip(self, order_id, request), fields(order_id = %order_id), err)]
    pub fn update_order(
        &self,
        shop_id: ShopId,
        order_id: OrderId,
        request: UpdateOrderRequest,
        actor: Option<UserId>,
    ) -> EngineResult<OrderOutcome> {
        let at = Utc::now();
        self.with_retries("update_order", || {
            let mut order = Order::empty(order_id);
            let version = self.rehydrate(shop_id, DocumentKind::Order, order_id.0, &mut order)?;
            if !order.is_placed() {
                return Err(EngineError::not_found(format!("order {order_id} in shop {shop_id}")));
            }

            let events = order.handle(&OrderCommand::UpdateOrder(UpdateOrder {
                shop_id,
                order_id,
                lines: request.lines.clone(),
                actor,
                occurred_at: at,
            }))?;
            if events.is_empty() {
                return Ok(OrderOutcome::new(shop_id, &order, Vec::new()));
            }

            // Returns only add stock; the document version guards against double counting.
            let postings = events.iter().flat_map(OrderEvent::stock_postings).collect();
            let entries = self.commit_order(shop_id, &mut order, version, events, postings)?;
            info!(returned_entries = entries.len(), "order updated");
            Ok(OrderOutcome::new(shop_id, &order, entries))
        })
    }

    /// Current state of an order.
    pub fn order(&self, shop_id: ShopId, order_id: OrderId) -> EngineResult<OrderOutcome> {
        let mut order = Order::empty(order_id);
        self.rehydrate(shop_id, DocumentKind::Order, order_id.0, &mut order)?;
        if !order.is_placed() {
            return Err(EngineError::not_found(format!("order {order_id} in shop {shop_id}")));
        }
        Ok(OrderOutcome::new(shop_id, &order, Vec::new()))
    }

    fn commit_order(
        &self,
        shop_id: ShopId,
        order: &mut Order,
        version: u64,
        events: Vec<OrderEvent>,
        postings: Vec<LedgerPosting>,
    ) -> EngineResult<Vec<LedgerEntry>> {
        let uncommitted = events
            .iter()
            .map(UncommittedEvent::from_typed)
            .collect::<Result<Vec<_>, _>>()?;
        let batch = WriteBatch::postings(postings).with_document(DocumentAppend {
            shop_id,
            stream_id: order.id_typed().0,
            kind: DocumentKind::Order,
            expected: ExpectedVersion::Exact(version),
            events: uncommitted,
        });

        let receipt = self.store.commit(batch)?;
        self.publish_receipt(&receipt);

        for event in &events {
            order.apply(event);
        }
        Ok(receipt.entries.into_iter().map(|r| r.entry).collect())
    }
}
