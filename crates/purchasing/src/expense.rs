use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ShopId, UserId};
use stockledger_events::Event;
use stockledger_inventory::{LedgerPosting, MovementKind, OriginRef};
use stockledger_products::{BatchId, BatchSnapshot, ProductId, ProductSnapshot, StockUnit};

/// Expense identifier (shop-scoped via `shop_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpenseId(pub AggregateId);

impl ExpenseId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseKind {
    Inventory,
    NonInventory,
}

/// Expense line with its frozen catalog snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseLine {
    pub line_no: u32,
    pub product_id: Option<ProductId>,
    pub batch_id: Option<BatchId>,
    pub description: String,
    pub quantity: i64,
    /// Cost in smallest currency unit (e.g., cents).
    pub unit_cost: u64,
    pub product_snapshot: Option<ProductSnapshot>,
    pub batch_snapshot: Option<BatchSnapshot>,
    /// Unit receiving the purchase; `None` when nothing is posted for the line.
    pub unit: Option<StockUnit>,
}

/// Aggregate root: Expense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expense {
    id: ExpenseId,
    shop_id: Option<ShopId>,
    kind: ExpenseKind,
    update_stock: bool,
    lines: Vec<ExpenseLine>,
    created_by: Option<UserId>,
    updated_by: Option<UserId>,
    recorded_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Expense {
    /// Create an empty, not-yet-recorded aggregate instance for rehydration.
    pub fn empty(id: ExpenseId) -> Self {
        Self {
            id,
            shop_id: None,
            kind: ExpenseKind::NonInventory,
            update_stock: false,
            lines: Vec::new(),
            created_by: None,
            updated_by: None,
            recorded_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ExpenseId {
        self.id
    }

    pub fn shop_id(&self) -> Option<ShopId> {
        self.shop_id
    }

    pub fn kind(&self) -> ExpenseKind {
        self.kind
    }

    pub fn update_stock(&self) -> bool {
        self.update_stock
    }

    pub fn lines(&self) -> &[ExpenseLine] {
        &self.lines
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn updated_by(&self) -> Option<UserId> {
        self.updated_by
    }

    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        self.recorded_at
    }

    pub fn is_recorded(&self) -> bool {
        self.created
    }

    pub fn total_cost(&self) -> u64 {
        self.lines
            .iter()
            .map(|l| l.unit_cost.saturating_mul(l.quantity.unsigned_abs()))
            .sum()
    }
}

impl AggregateRoot for Expense {
    type Id = ExpenseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// A line as resolved by the caller against the live catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseLineInput {
    pub product_id: Option<ProductId>,
    pub batch_id: Option<BatchId>,
    pub description: String,
    pub quantity: i64,
    pub unit_cost: u64,
    pub product_snapshot: Option<ProductSnapshot>,
    pub batch_snapshot: Option<BatchSnapshot>,
    pub unit: Option<StockUnit>,
}

/// Command: RecordExpense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordExpense {
    pub shop_id: ShopId,
    pub expense_id: ExpenseId,
    pub kind: ExpenseKind,
    pub update_stock: bool,
    pub lines: Vec<ExpenseLineInput>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Submitted state of one line on revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRevision {
    pub product_id: Option<ProductId>,
    pub quantity: i64,
    pub description: String,
    pub unit_cost: u64,
}

/// Command: ReviseExpense.
///
/// Kind, line count, products and quantities are frozen; descriptions and
/// costs may be corrected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseExpense {
    pub shop_id: ShopId,
    pub expense_id: ExpenseId,
    pub kind: ExpenseKind,
    pub lines: Vec<LineRevision>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseCommand {
    RecordExpense(RecordExpense),
    ReviseExpense(ReviseExpense),
}

/// Event: ExpenseRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRecorded {
    pub shop_id: ShopId,
    pub expense_id: ExpenseId,
    pub kind: ExpenseKind,
    pub update_stock: bool,
    pub lines: Vec<ExpenseLine>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ExpenseRevised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRevised {
    pub shop_id: ShopId,
    pub expense_id: ExpenseId,
    pub lines: Vec<LineRevision>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseEvent {
    ExpenseRecorded(ExpenseRecorded),
    ExpenseRevised(ExpenseRevised),
}

impl ExpenseEvent {
    /// Purchase postings implied by this event, unpinned.
    ///
    /// Only a recorded inventory expense with stock updates enabled posts, one
    /// `+quantity` entry per line that resolved to a unit.
    pub fn stock_postings(&self) -> Vec<LedgerPosting> {
        match self {
            ExpenseEvent::ExpenseRecorded(e)
                if e.kind == ExpenseKind::Inventory && e.update_stock =>
            {
                let origin = OriginRef::expense(e.expense_id.0);
                e.lines
                    .iter()
                    .filter_map(|line| {
                        line.unit.map(|unit| {
                            LedgerPosting::new(
                                unit,
                                MovementKind::Purchase,
                                line.quantity,
                                e.actor,
                                e.occurred_at,
                            )
                            .with_origin(origin)
                        })
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }
}

impl Event for ExpenseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ExpenseEvent::ExpenseRecorded(_) => "purchasing.expense.recorded",
            ExpenseEvent::ExpenseRevised(_) => "purchasing.expense.revised",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ExpenseEvent::ExpenseRecorded(e) => e.occurred_at,
            ExpenseEvent::ExpenseRevised(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Expense {
    type Command = ExpenseCommand;
    type Event = ExpenseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ExpenseEvent::ExpenseRecorded(e) => {
                self.id = e.expense_id;
                self.shop_id = Some(e.shop_id);
                self.kind = e.kind;
                self.update_stock = e.update_stock;
                self.lines = e.lines.clone();
                self.created_by = e.actor;
                self.updated_by = e.actor;
                self.recorded_at = Some(e.occurred_at);
                self.created = true;
            }
            ExpenseEvent::ExpenseRevised(e) => {
                for (line, revision) in self.lines.iter_mut().zip(&e.lines) {
                    line.description = revision.description.clone();
                    line.unit_cost = revision.unit_cost;
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
            ExpenseCommand::RecordExpense(cmd) => self.handle_record(cmd),
            ExpenseCommand::ReviseExpense(cmd) => self.handle_revise(cmd),
        }
    }
}

impl Expense {
    fn ensure_shop(&self, shop_id: ShopId) -> Result<(), DomainError> {
        if self.shop_id != Some(shop_id) {
            return Err(DomainError::not_found(format!(
                "expense {} in shop {shop_id}",
                self.id
            )));
        }
        Ok(())
    }

    fn ensure_expense_id(&self, expense_id: ExpenseId) -> Result<(), DomainError> {
        if self.id != expense_id {
            return Err(DomainError::invariant("expense_id mismatch"));
        }
        Ok(())
    }

    fn handle_record(&self, cmd: &RecordExpense) -> Result<Vec<ExpenseEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!(
                "expense {} already exists",
                cmd.expense_id
            )));
        }
        self.ensure_expense_id(cmd.expense_id)?;
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("an expense needs at least one line"));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, input) in cmd.lines.iter().enumerate() {
            let line_no = (idx as u32) + 1;
            if input.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "line {line_no}: quantity must be positive"
                )));
            }
            match (cmd.kind, input.product_id) {
                (ExpenseKind::Inventory, None) => {
                    return Err(DomainError::validation(format!(
                        "line {line_no}: inventory expenses must reference a product"
                    )));
                }
                (ExpenseKind::NonInventory, Some(_)) => {
                    return Err(DomainError::validation(format!(
                        "line {line_no}: non-inventory expenses cannot reference a product"
                    )));
                }
                (ExpenseKind::Inventory, Some(product_id)) => {
                    if input.product_snapshot.as_ref().map(|s| s.product_id) != Some(product_id) {
                        return Err(DomainError::validation(format!(
                            "line {line_no}: missing snapshot for product {product_id}"
                        )));
                    }
                    if input.batch_id != input.batch_snapshot.as_ref().map(|b| b.batch_id) {
                        return Err(DomainError::validation(format!(
                            "line {line_no}: batch snapshot does not match the batch reference"
                        )));
                    }
                    if let Some(unit) = input.unit {
                        if unit.shop_id != cmd.shop_id || unit.product_id != product_id {
                            return Err(DomainError::validation(format!(
                                "line {line_no}: stock unit does not belong to product {product_id}"
                            )));
                        }
                    }
                }
                (ExpenseKind::NonInventory, None) => {
                    if input.description.trim().is_empty() {
                        return Err(DomainError::validation(format!(
                            "line {line_no}: description cannot be empty"
                        )));
                    }
                }
            }
            lines.push(ExpenseLine {
                line_no,
                product_id: input.product_id,
                batch_id: input.batch_id,
                description: input.description.trim().to_string(),
                quantity: input.quantity,
                unit_cost: input.unit_cost,
                product_snapshot: input.product_snapshot.clone(),
                batch_snapshot: input.batch_snapshot.clone(),
                unit: input.unit,
            });
        }

        Ok(vec![ExpenseEvent::ExpenseRecorded(ExpenseRecorded {
            shop_id: cmd.shop_id,
            expense_id: cmd.expense_id,
            kind: cmd.kind,
            update_stock: cmd.update_stock,
            lines,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revise(&self, cmd: &ReviseExpense) -> Result<Vec<ExpenseEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("expense {}", cmd.expense_id)));
        }
        self.ensure_shop(cmd.shop_id)?;
        self.ensure_expense_id(cmd.expense_id)?;

        if cmd.kind != self.kind {
            return Err(DomainError::invariant(format!(
                "expense {} type cannot change",
                self.id
            )));
        }
        if cmd.lines.len() != self.lines.len() {
            return Err(DomainError::invariant(format!(
                "expense {} has {} lines; the line count cannot change (got {})",
                self.id,
                self.lines.len(),
                cmd.lines.len()
            )));
        }
        for (stored, submitted) in self.lines.iter().zip(&cmd.lines) {
            if stored.product_id != submitted.product_id {
                return Err(DomainError::invariant(format!(
                    "line {}: the referenced product cannot change",
                    stored.line_no
                )));
            }
            if stored.quantity != submitted.quantity {
                return Err(DomainError::invariant(format!(
                    "line {}: received quantity cannot change ({} -> {})",
                    stored.line_no, stored.quantity, submitted.quantity
                )));
            }
        }

        let unchanged = self
            .lines
            .iter()
            .zip(&cmd.lines)
            .all(|(s, r)| s.description == r.description.trim() && s.unit_cost == r.unit_cost);
        if unchanged {
            return Ok(Vec::new());
        }

        Ok(vec![ExpenseEvent::ExpenseRevised(ExpenseRevised {
            shop_id: cmd.shop_id,
            expense_id: cmd.expense_id,
            lines: cmd
                .lines
                .iter()
                .map(|r| LineRevision {
                    description: r.description.trim().to_string(),
                    ..r.clone()
                })
                .collect(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}
