//! Persistence boundary for the inventory engine.
//!
//! Three concerns share one backend so that a single commit can span them:
//!
//! - **Catalog**: products and batches, including the materialized balance and
//!   ledger version of every stock unit.
//! - **Ledger**: write-once entries. A [`WriteBatch`] posts entries and appends
//!   document events all-or-nothing, after checking every [`ExpectedVersion`].
//! - **Documents**: orders and expenses, stored as event streams and rehydrated
//!   through their aggregates.
//!
//! Implementations must never let a balance change without the entry that
//! explains it, and never store an entry without updating the balance.

pub mod in_memory;
pub mod postgres;
pub mod query;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use stockledger_core::{AggregateId, DomainError, ExpectedVersion, ShopId, UserId};
use stockledger_events::{Event, EventEnvelope};
use stockledger_inventory::{LedgerEntry, LedgerPosting, MovementKind, Reconciliation};
use stockledger_products::{Batch, BatchId, Product, ProductId, StockUnit, UnitBalance};

pub use in_memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use query::{LedgerFilter, LedgerPage, Pagination};

/// Store operation error.
///
/// Infrastructure-level failures; the engine folds them into `EngineError`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An `ExpectedVersion` did not match (another writer got there first).
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// A uniqueness rule was violated (duplicate id or active batch number).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The write is malformed relative to the stored state.
    #[error("invalid write: {0}")]
    Validation(String),

    /// A domain rule evaluated inside the store's critical section failed.
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Closure applied to a product inside the store's critical section.
pub type ProductEdit<'a> = &'a mut (dyn FnMut(&mut Product) -> Result<(), DomainError> + Send);

/// How strictly a batch unit must still be addressable.
///
/// New stock movements need the batch linked to the product. Returns and
/// maintenance reads address the unit a past entry already used, which may
/// have been unlinked since by deactivation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnitAccess {
    Linked,
    Historical,
}

impl UnitAccess {
    pub fn for_kind(kind: MovementKind) -> Self {
        match kind {
            MovementKind::Return => UnitAccess::Historical,
            _ => UnitAccess::Linked,
        }
    }

    /// Whether `batch` may still be addressed under `product_id`.
    pub fn admits(self, batch: &Batch, product_id: ProductId) -> bool {
        match self {
            UnitAccess::Linked => batch.belongs_to(product_id),
            UnitAccess::Historical => true,
        }
    }
}

/// Document stream discriminator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Order,
    Expense,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Order => "sales.order",
            DocumentKind::Expense => "purchasing.expense",
        }
    }
}

/// A document event ready to be appended (not yet assigned a sequence number).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl UncommittedEvent {
    pub fn from_typed<E>(event: &E) -> StoreResult<Self>
    where
        E: Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| StoreError::Validation(format!("failed to serialize event: {e}")))?;
        Ok(Self {
            event_id: Uuid::now_v7(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// A persisted document event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub shop_id: ShopId,
    pub stream_id: AggregateId,
    pub kind: DocumentKind,
    /// Position in the document stream (1-based).
    pub sequence_number: u64,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            self.event_id,
            self.shop_id,
            self.stream_id,
            self.event_type.clone(),
            self.sequence_number,
            self.payload.clone(),
        )
    }

    pub fn decode<E: serde::de::DeserializeOwned>(&self) -> StoreResult<E> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            StoreError::Backend(format!(
                "failed to decode {} event {} of stream {}: {e}",
                self.event_type, self.sequence_number, self.stream_id
            ))
        })
    }
}

/// Events to append to one document stream as part of a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentAppend {
    pub shop_id: ShopId,
    pub stream_id: AggregateId,
    pub kind: DocumentKind,
    pub expected: ExpectedVersion,
    pub events: Vec<UncommittedEvent>,
}

/// Unit of work committed atomically by [`LedgerStore::commit`].
///
/// Each posting's `expected` version is compared with its unit's version as
/// it was *before* the batch; several postings against the same unit in one
/// batch are applied in order on top of each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    pub postings: Vec<LedgerPosting>,
    pub document: Option<DocumentAppend>,
}

impl WriteBatch {
    pub fn postings(postings: Vec<LedgerPosting>) -> Self {
        Self {
            postings,
            document: None,
        }
    }

    pub fn with_document(mut self, document: DocumentAppend) -> Self {
        self.document = Some(document);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty() && self.document.as_ref().is_none_or(|d| d.events.is_empty())
    }
}

/// An entry as committed, with the alert threshold of its unit at that moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEntry {
    pub entry: LedgerEntry,
    pub stock_alert_threshold: i64,
}

/// Everything a successful [`LedgerStore::commit`] wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    pub entries: Vec<RecordedEntry>,
    pub document_events: Vec<StoredEvent>,
}

/// Products and batches of every shop.
pub trait CatalogStore: Send + Sync {
    /// Insert a new product. Fails with `Conflict` if the id is taken.
    fn insert_product(&self, product: Product) -> StoreResult<()>;

    fn product(&self, shop_id: ShopId, product_id: ProductId) -> StoreResult<Option<Product>>;

    fn products(&self, shop_id: ShopId) -> StoreResult<Vec<Product>>;

    /// Active product with this barcode in the shop, if any.
    fn find_product_by_barcode(&self, shop_id: ShopId, barcode: &str) -> StoreResult<Option<Product>>;

    /// Apply `edit` to the stored product atomically and return the result.
    ///
    /// Edits never touch the materialized quantity; only ledger commits do.
    fn modify_product(
        &self,
        shop_id: ShopId,
        product_id: ProductId,
        edit: ProductEdit<'_>,
    ) -> StoreResult<Product>;

    /// Insert a batch, optionally linking it to `link_to` in the same step.
    ///
    /// Fails with `Conflict` when an active batch of the shop already uses
    /// the batch number.
    fn insert_batch(
        &self,
        batch: Batch,
        link_to: Option<ProductId>,
        actor: Option<UserId>,
    ) -> StoreResult<Batch>;

    fn batch(&self, shop_id: ShopId, batch_id: BatchId) -> StoreResult<Option<Batch>>;

    fn batches(&self, shop_id: ShopId) -> StoreResult<Vec<Batch>>;

    /// Active batch of the shop carrying `batch_number`, if any.
    fn find_active_batch_by_number(&self, shop_id: ShopId, batch_number: &str) -> StoreResult<Option<Batch>>;

    /// Link every batch to the product, all-or-nothing.
    fn link_batches(
        &self,
        shop_id: ShopId,
        product_id: ProductId,
        batch_ids: &[BatchId],
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> StoreResult<Product>;

    /// Deactivate the product and clear the product reference of every batch
    /// it was linked to, in one step. Returns the product and released batches.
    fn deactivate_product(
        &self,
        shop_id: ShopId,
        product_id: ProductId,
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> StoreResult<(Product, Vec<BatchId>)>;

    /// Deactivate a batch and drop it from its product's link list, in one step.
    fn deactivate_batch(&self, shop_id: ShopId, batch_id: BatchId, at: DateTime<Utc>) -> StoreResult<Batch>;
}

/// The append-only ledger and the materialized balances it drives.
pub trait LedgerStore: Send + Sync {
    /// Apply a [`WriteBatch`] atomically.
    ///
    /// For every posting: check the unit exists, check `expected` against the
    /// unit's pre-batch version, stamp the resulting balance, write the entry,
    /// and update the unit's materialized quantity and version. The document
    /// append, if any, is checked and written in the same step. Any failure
    /// leaves the store untouched.
    fn commit(&self, batch: WriteBatch) -> StoreResult<CommitReceipt>;

    /// Materialized balance of a unit (never recomputed from the ledger).
    fn balance(&self, unit: StockUnit) -> StoreResult<UnitBalance>;

    /// Entries of one unit in sequence order.
    fn unit_entries(&self, unit: StockUnit) -> StoreResult<Vec<LedgerEntry>>;

    /// Entries of a shop matching `filter`, oldest first.
    fn query_entries(
        &self,
        shop_id: ShopId,
        filter: &LedgerFilter,
        pagination: Pagination,
    ) -> StoreResult<LedgerPage>;

    /// Rewrite the unit's materialized balance from its ledger.
    ///
    /// Returns the reconciliation as observed *before* the rewrite.
    fn rematerialize(&self, unit: StockUnit) -> StoreResult<Reconciliation>;
}

/// Order and expense streams.
pub trait DocumentStore: Send + Sync {
    /// Events of a document stream in sequence order (empty if absent).
    fn load_document(
        &self,
        shop_id: ShopId,
        kind: DocumentKind,
        stream_id: AggregateId,
    ) -> StoreResult<Vec<StoredEvent>>;
}

/// Full persistence surface used by the engine.
pub trait InventoryStore: CatalogStore + LedgerStore + DocumentStore {}

impl<T> InventoryStore for T where T: CatalogStore + LedgerStore + DocumentStore {}
