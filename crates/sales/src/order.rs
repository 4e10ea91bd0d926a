use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ShopId, UserId};
use stockledger_events::Event;
use stockledger_inventory::{LedgerPosting, MovementKind, OriginRef};
use stockledger_products::{BatchId, BatchSnapshot, ProductId, ProductSnapshot, StockUnit};

/// Order identifier (shop-scoped via `shop_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Identifier of a non-stock service sold on an order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(pub AggregateId);

/// What a line sells. Fixed for the lifetime of the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LineRef {
    Product {
        product_id: ProductId,
        batch_id: Option<BatchId>,
    },
    Service {
        service_id: ServiceId,
    },
}

impl LineRef {
    pub fn product_id(&self) -> Option<ProductId> {
        match self {
            LineRef::Product { product_id, .. } => Some(*product_id),
            LineRef::Service { .. } => None,
        }
    }
}

/// Return progress of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineState {
    Posted,
    PartiallyReturned,
    FullyReturned,
}

/// Order line with its frozen catalog snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub reference: LineRef,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
    pub original_quantity_at_purchase: i64,
    pub quantity_returned: i64,
    pub product_snapshot: Option<ProductSnapshot>,
    pub batch_snapshot: Option<BatchSnapshot>,
    /// Stock unit the sale was posted against; `None` for services and untracked products.
    pub unit: Option<StockUnit>,
}

impl OrderLine {
    pub fn state(&self) -> LineState {
        if self.quantity_returned == 0 {
            LineState::Posted
        } else if self.quantity_returned < self.original_quantity_at_purchase {
            LineState::PartiallyReturned
        } else {
            LineState::FullyReturned
        }
    }

    pub fn returnable(&self) -> i64 {
        self.original_quantity_at_purchase - self.quantity_returned
    }
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    shop_id: Option<ShopId>,
    lines: Vec<OrderLine>,
    created_by: Option<UserId>,
    updated_by: Option<UserId>,
    placed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-placed aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            shop_id: None,
            lines: Vec::new(),
            created_by: None,
            updated_by: None,
            placed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn shop_id(&self) -> Option<ShopId> {
        self.shop_id
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn updated_by(&self) -> Option<UserId> {
        self.updated_by
    }

    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }

    pub fn is_placed(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// A line as resolved by the caller against the live catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedLine {
    pub reference: LineRef,
    pub quantity: i64,
    pub unit_price: u64,
    pub product_snapshot: Option<ProductSnapshot>,
    pub batch_snapshot: Option<BatchSnapshot>,
    pub unit: Option<StockUnit>,
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub lines: Vec<PlacedLine>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Submitted state of one line on update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineUpdate {
    pub reference: LineRef,
    pub quantity_returned: i64,
}

/// Command: UpdateOrder.
///
/// Carries the full line list; only `quantity_returned` may differ from the
/// stored order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOrder {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub lines: Vec<LineUpdate>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    UpdateOrder(UpdateOrder),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub lines: Vec<OrderLine>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemReturned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReturned {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub line_no: u32,
    pub delta: i64,
    pub quantity_returned: i64,
    pub unit: Option<StockUnit>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    ItemReturned(ItemReturned),
}

impl OrderEvent {
    /// Ledger postings this event implies, unpinned (`ExpectedVersion::Any`).
    ///
    /// Sales post `-quantity` per tracked line, returns post `+delta` to the
    /// unit the sale used. Service and untracked lines post nothing.
    pub fn stock_postings(&self) -> Vec<LedgerPosting> {
        match self {
            OrderEvent::OrderPlaced(e) => {
                let origin = OriginRef::order(e.order_id.0);
                e.lines
                    .iter()
                    .filter_map(|line| {
                        line.unit.map(|unit| {
                            LedgerPosting::new(
                                unit,
                                MovementKind::Sale,
                                -line.quantity,
                                e.actor,
                                e.occurred_at,
                            )
                            .with_origin(origin)
                        })
                    })
                    .collect()
            }
            OrderEvent::ItemReturned(e) => e
                .unit
                .map(|unit| {
                    LedgerPosting::new(unit, MovementKind::Return, e.delta, e.actor, e.occurred_at)
                        .with_origin(OriginRef::order(e.order_id.0))
                })
                .into_iter()
                .collect(),
        }
    }
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "sales.order.placed",
            OrderEvent::ItemReturned(_) => "sales.order.item_returned",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::ItemReturned(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.shop_id = Some(e.shop_id);
                self.lines = e.lines.clone();
                self.created_by = e.actor;
                self.updated_by = e.actor;
                self.placed_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::ItemReturned(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == e.line_no) {
                    line.quantity_returned = e.quantity_returned;
                }
                if e.actor.is_some() {
                    self.updated_by = e.actor;
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::UpdateOrder(cmd) => self.handle_update(cmd),
        }
    }
}

impl Order {
    fn ensure_shop(&self, shop_id: ShopId) -> Result<(), DomainError> {
        if self.shop_id != Some(shop_id) {
            return Err(DomainError::not_found(format!("order {} in shop {shop_id}", self.id)));
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: OrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!("order {} already exists", cmd.order_id)));
        }
        self.ensure_order_id(cmd.order_id)?;
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("an order needs at least one line"));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, placed) in cmd.lines.iter().enumerate() {
            let line_no = (idx as u32) + 1;
            if placed.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "line {line_no}: quantity must be positive"
                )));
            }
            match placed.reference {
                LineRef::Product { product_id, batch_id } => {
                    let snapshot = placed.product_snapshot.as_ref().ok_or_else(|| {
                        DomainError::validation(format!("line {line_no}: missing product snapshot"))
                    })?;
                    if snapshot.product_id != product_id {
                        return Err(DomainError::validation(format!(
                            "line {line_no}: snapshot does not match product {product_id}"
                        )));
                    }
                    if batch_id != placed.batch_snapshot.as_ref().map(|b| b.batch_id) {
                        return Err(DomainError::validation(format!(
                            "line {line_no}: batch snapshot does not match the batch reference"
                        )));
                    }
                    if let Some(unit) = placed.unit {
                        if unit.shop_id != cmd.shop_id || unit.product_id != product_id {
                            return Err(DomainError::validation(format!(
                                "line {line_no}: stock unit does not belong to product {product_id}"
                            )));
                        }
                    }
                }
                LineRef::Service { .. } => {
                    if placed.unit.is_some() || placed.product_snapshot.is_some() {
                        return Err(DomainError::validation(format!(
                            "line {line_no}: service lines carry no stock"
                        )));
                    }
                }
            }
            lines.push(OrderLine {
                line_no,
                reference: placed.reference,
                quantity: placed.quantity,
                unit_price: placed.unit_price,
                original_quantity_at_purchase: placed.quantity,
                quantity_returned: 0,
                product_snapshot: placed.product_snapshot.clone(),
                batch_snapshot: placed.batch_snapshot.clone(),
                unit: placed.unit,
            });
        }

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            shop_id: cmd.shop_id,
            order_id: cmd.order_id,
            lines,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("order {}", cmd.order_id)));
        }
        self.ensure_shop(cmd.shop_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if cmd.lines.len() != self.lines.len() {
            return Err(DomainError::invariant(format!(
                "order {} has {} lines; the line count cannot change (got {})",
                self.id,
                self.lines.len(),
                cmd.lines.len()
            )));
        }

        let mut events = Vec::new();
        for (stored, submitted) in self.lines.iter().zip(&cmd.lines) {
            if stored.reference != submitted.reference {
                return Err(DomainError::invariant(format!(
                    "line {}: the referenced product or service cannot change",
                    stored.line_no
                )));
            }
            if submitted.quantity_returned < stored.quantity_returned {
                return Err(DomainError::invariant(format!(
                    "line {}: returned quantity cannot decrease ({} -> {})",
                    stored.line_no, stored.quantity_returned, submitted.quantity_returned
                )));
            }
            if submitted.quantity_returned > stored.original_quantity_at_purchase {
                return Err(DomainError::invariant(format!(
                    "line {}: returned quantity {} exceeds purchased quantity {}",
                    stored.line_no, submitted.quantity_returned, stored.original_quantity_at_purchase
                )));
            }

            let delta = submitted.quantity_returned - stored.quantity_returned;
            if delta > 0 {
                events.push(OrderEvent::ItemReturned(ItemReturned {
                    shop_id: cmd.shop_id,
                    order_id: cmd.order_id,
                    line_no: stored.line_no,
                    delta,
                    quantity_returned: submitted.quantity_returned,
                    unit: stored.unit,
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                }));
            }
        }
        Ok(events)
    }
}
