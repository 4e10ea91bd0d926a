use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockledger_core::{AggregateId, ShopId};

/// Envelope for a published event, carrying shop + stream metadata.
///
/// - `shop_id` partitions consumers' read models.
/// - `stream_id` is the stock unit (product or batch) or catalog record the
///   event is about.
/// - `sequence_number` is the position in that stream. For ledger entries it is
///   the unit's ledger version after the entry; catalog notifications that are
///   not part of an ordered stream carry `0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    shop_id: ShopId,
    stream_id: AggregateId,
    event_type: String,
    sequence_number: u64,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        shop_id: ShopId,
        stream_id: AggregateId,
        event_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            shop_id,
            stream_id,
            event_type: event_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn shop_id(&self) -> ShopId {
        self.shop_id
    }

    pub fn stream_id(&self) -> AggregateId {
        self.stream_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn is_sequenced(&self) -> bool {
        self.sequence_number > 0
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
