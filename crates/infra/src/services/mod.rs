//! Inventory engine: the workflows callers use to move and read stock.
//!
//! ```text
//! request
//!   ↓
//! 1. read current catalog state and unit balances (with versions)
//!   ↓
//! 2. validate / decide (pure domain crates)
//!   ↓
//! 3. commit one WriteBatch: postings pinned to the versions read in (1),
//!    plus the order/expense document events
//!   ↓
//! 4. publish notifications (after commit; failures are logged only)
//! ```
//!
//! A commit that loses a version race is retried from step 1, so the
//! availability check is always made against the balance the write lands on.

mod batches;
mod catalog;
mod ledger;
mod orders;
mod receipts;
mod resolver;
mod transfers;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};
use uuid::Uuid;

use stockledger_core::{Aggregate, AggregateId, ShopId};
use stockledger_events::{Event, EventBus, EventEnvelope};
use stockledger_inventory::{EntryRecorded, InventoryEvent};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::store::{CommitReceipt, DocumentKind, InventoryStore, StoredEvent};

pub use batches::NewBatch;
pub use catalog::NewProduct;
pub use ledger::{Adjustment, RecordMovement};
pub use orders::{OrderLineRequest, OrderOutcome, OrderUpdateLine, PlaceOrderRequest, UpdateOrderRequest};
pub use receipts::{ExpenseLineRequest, ExpenseOutcome, RecordExpenseRequest, ReviseExpenseRequest};
pub use resolver::LowStockUnit;
pub use transfers::{TransferFailure, TransferOutcome, TransferResult};

/// Entry point for every inventory operation.
///
/// Holds the store behind a trait object so the same engine drives the
/// in-memory and Postgres backends; `B` is the notification bus.
pub struct InventoryEngine<B> {
    store: Arc<dyn InventoryStore>,
    bus: B,
    config: EngineConfig,
}

impl<B> std::fmt::Debug for InventoryEngine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<B> InventoryEngine<B> {
    pub fn new(store: Arc<dyn InventoryStore>, bus: B, config: EngineConfig) -> Self {
        Self { store, bus, config }
    }

    pub fn store(&self) -> &Arc<dyn InventoryStore> {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl<B> InventoryEngine<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run `attempt` until it succeeds, fails with anything other than a
    /// concurrency conflict, or the configured retries are used up.
    fn with_retries<T>(&self, operation: &str, mut attempt: impl FnMut() -> EngineResult<T>) -> EngineResult<T> {
        let mut tries = 0u32;
        loop {
            match attempt() {
                Err(EngineError::Concurrency(msg)) if tries < self.config.max_conflict_retries => {
                    tries += 1;
                    debug!(operation, attempt = tries, reason = %msg, "retrying after concurrency conflict");
                }
                Err(EngineError::Concurrency(msg)) => {
                    warn!(operation, attempts = tries + 1, reason = %msg, "giving up after repeated concurrency conflicts");
                    return Err(EngineError::Concurrency(msg));
                }
                other => return other,
            }
        }
    }

    /// Replay a document stream into `aggregate` and return the stream version.
    fn rehydrate<A>(&self, shop_id: ShopId, kind: DocumentKind, stream_id: AggregateId, aggregate: &mut A) -> EngineResult<u64>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_document(shop_id, kind, stream_id)?;
        let mut version = 0;
        for stored in &history {
            if stored.shop_id != shop_id || stored.stream_id != stream_id || stored.sequence_number <= version {
                return Err(EngineError::Store(format!(
                    "{} stream {stream_id} is out of order at sequence {}",
                    kind.as_str(),
                    stored.sequence_number
                )));
            }
            let event: A::Event = stored.decode()?;
            aggregate.apply(&event);
            version = stored.sequence_number;
        }
        Ok(version)
    }

    /// Publish everything a commit wrote: one `EntryRecorded` per entry,
    /// sequenced by the unit's ledger version, then the document events.
    fn publish_receipt(&self, receipt: &CommitReceipt) {
        for recorded in &receipt.entries {
            let entry = &recorded.entry;
            let event = InventoryEvent::EntryRecorded(EntryRecorded::from_entry(entry, recorded.stock_alert_threshold));
            self.publish_inventory(entry.shop_id, entry.unit().stream_id(), entry.sequence, &event);
        }
        self.publish_documents(&receipt.document_events);
    }

    fn publish_documents(&self, events: &[StoredEvent]) {
        for stored in events {
            self.publish(stored.to_envelope());
        }
    }

    fn publish_inventory(&self, shop_id: ShopId, stream_id: AggregateId, sequence: u64, event: &InventoryEvent) {
        match to_payload(event) {
            Some(payload) => self.publish(EventEnvelope::new(
                Uuid::now_v7(),
                shop_id,
                stream_id,
                event.event_type(),
                sequence,
                payload,
            )),
            None => warn!(event_type = event.event_type(), "skipping notification that failed to serialize"),
        }
    }

    fn publish(&self, envelope: EventEnvelope<JsonValue>) {
        if let Err(err) = self.bus.publish(envelope.clone()) {
            warn!(
                event_type = envelope.event_type(),
                stream_id = %envelope.stream_id(),
                sequence = envelope.sequence_number(),
                error = ?err,
                "failed to publish committed event"
            );
        }
    }
}

fn to_payload<T: Serialize>(value: &T) -> Option<JsonValue> {
    serde_json::to_value(value).ok()
}
