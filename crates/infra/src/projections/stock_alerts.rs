use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use stockledger_core::{AggregateId, ShopId};
use stockledger_events::EventEnvelope;
use stockledger_inventory::InventoryEvent;
use stockledger_products::{ProductId, StockUnit};

use crate::read_model::ShopStore;

pub const ENTRY_RECORDED: &str = "inventory.entry.recorded";
pub const PRODUCT_DEACTIVATED: &str = "inventory.product.deactivated";

/// A stock unit whose balance is at or below its alert threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAlert {
    pub unit: StockUnit,
    pub quantity: i64,
    pub stock_alert_threshold: i64,
    /// Ledger version of the unit when the alert was last refreshed.
    pub sequence: u64,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    shop_id: ShopId,
    stream_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum StockAlertProjectionError {
    #[error("failed to deserialize inventory event: {0}")]
    Deserialize(String),

    #[error("shop isolation violation: {0}")]
    ShopIsolation(String),

    #[error("ledger entry envelope without a sequence number")]
    Unsequenced,
}

/// Low-stock alert projection.
///
/// Consumes `inventory.entry.recorded` envelopes and keeps, per shop, the units
/// currently at or below their threshold. Every entry carries the absolute
/// resulting balance, so the newest sequence per unit stream wins and gaps are
/// tolerated; replays at or below the cursor are ignored.
#[derive(Debug)]
pub struct StockAlertProjection<S>
where
    S: ShopStore<StockUnit, StockAlert>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> StockAlertProjection<S>
where
    S: ShopStore<StockUnit, StockAlert>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, unit: &StockUnit) -> Option<StockAlert> {
        self.store.get(unit.shop_id, unit)
    }

    /// Open alerts of a shop, lowest balance first.
    pub fn list(&self, shop_id: ShopId) -> Vec<StockAlert> {
        let mut alerts = self.store.list(shop_id);
        alerts.sort_by_key(|a| (a.quantity, a.unit));
        alerts
    }

    /// Apply a published envelope. Envelopes of other event types are ignored.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), StockAlertProjectionError> {
        match envelope.event_type() {
            ENTRY_RECORDED => self.apply_entry(envelope),
            PRODUCT_DEACTIVATED => self.apply_deactivation(envelope),
            _ => Ok(()),
        }
    }

    fn apply_entry(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), StockAlertProjectionError> {
        let shop_id = envelope.shop_id();
        let seq = envelope.sequence_number();
        if seq == 0 {
            return Err(StockAlertProjectionError::Unsequenced);
        }

        let entry = match decode(envelope)? {
            InventoryEvent::EntryRecorded(e) => e,
            _ => {
                return Err(StockAlertProjectionError::Deserialize(
                    "payload is not an EntryRecorded event".to_string(),
                ));
            }
        };
        if entry.shop_id != shop_id {
            return Err(StockAlertProjectionError::ShopIsolation(
                "event shop_id does not match envelope shop_id".to_string(),
            ));
        }

        let unit = match entry.batch_id {
            Some(batch_id) => StockUnit::batch(shop_id, entry.product_id, batch_id),
            None => StockUnit::product(shop_id, entry.product_id),
        };

        let Ok(mut cursors) = self.cursors.write() else {
            return Ok(());
        };
        let key = CursorKey {
            shop_id,
            stream_id: envelope.stream_id(),
        };
        if seq <= cursors.get(&key).copied().unwrap_or(0) {
            // Duplicate or stale delivery.
            return Ok(());
        }

        if entry.is_below_alert() {
            self.store.upsert(
                shop_id,
                unit,
                StockAlert {
                    unit,
                    quantity: entry.resulting_balance,
                    stock_alert_threshold: entry.stock_alert_threshold,
                    sequence: seq,
                    raised_at: entry.occurred_at,
                },
            );
        } else {
            self.store.remove(shop_id, &unit);
        }
        cursors.insert(key, seq);
        Ok(())
    }

    fn apply_deactivation(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), StockAlertProjectionError> {
        let event = match decode(envelope)? {
            InventoryEvent::ProductDeactivated(e) => e,
            _ => return Ok(()),
        };
        if event.shop_id != envelope.shop_id() {
            return Err(StockAlertProjectionError::ShopIsolation(
                "event shop_id does not match envelope shop_id".to_string(),
            ));
        }
        self.clear_product(event.shop_id, event.product_id);
        Ok(())
    }

    fn clear_product(&self, shop_id: ShopId, product_id: ProductId) {
        for alert in self.store.list(shop_id) {
            if alert.unit.product_id == product_id {
                self.store.remove(shop_id, &alert.unit);
            }
        }
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), StockAlertProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        let mut shops = envs.iter().map(|e| e.shop_id()).collect::<Vec<_>>();
        shops.sort();
        shops.dedup();
        for shop in shops {
            self.store.clear_shop(shop);
        }

        // Deterministic replay order: shop, stream, sequence.
        envs.sort_by_key(|e| (e.shop_id(), e.stream_id(), e.sequence_number()));
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

fn decode(envelope: &EventEnvelope<JsonValue>) -> Result<InventoryEvent, StockAlertProjectionError> {
    serde_json::from_value(envelope.payload().clone())
        .map_err(|e| StockAlertProjectionError::Deserialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use stockledger_inventory::{EntryRecorded, LedgerEntryId, MovementKind, ProductDeactivated};
    use uuid::Uuid;

    use crate::read_model::InMemoryShopStore;

    fn entry_envelope(shop_id: ShopId, product_id: ProductId, seq: u64, balance: i64) -> EventEnvelope<JsonValue> {
        let event = InventoryEvent::EntryRecorded(EntryRecorded {
            shop_id,
            entry_id: LedgerEntryId::new(),
            product_id,
            batch_id: None,
            kind: MovementKind::Sale,
            quantity: -1,
            resulting_balance: balance,
            sequence: seq,
            stock_alert_threshold: 5,
            origin: None,
            occurred_at: Utc::now(),
        });
        EventEnvelope::new(
            Uuid::now_v7(),
            shop_id,
            product_id.0,
            ENTRY_RECORDED,
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    fn projection() -> StockAlertProjection<InMemoryShopStore<StockUnit, StockAlert>> {
        StockAlertProjection::new(InMemoryShopStore::new())
    }

    #[test]
    fn raises_and_clears_alerts() {
        let p = projection();
        let shop = ShopId::new();
        let product = ProductId::new(AggregateId::new());
        let unit = StockUnit::product(shop, product);

        p.apply_envelope(&entry_envelope(shop, product, 1, 4)).unwrap();
        assert_eq!(p.get(&unit).map(|a| a.quantity), Some(4));

        p.apply_envelope(&entry_envelope(shop, product, 2, 20)).unwrap();
        assert!(p.get(&unit).is_none());
    }

    #[test]
    fn stale_and_duplicate_deliveries_are_ignored() {
        let p = projection();
        let shop = ShopId::new();
        let product = ProductId::new(AggregateId::new());

        p.apply_envelope(&entry_envelope(shop, product, 3, 2)).unwrap();
        p.apply_envelope(&entry_envelope(shop, product, 2, 50)).unwrap();
        p.apply_envelope(&entry_envelope(shop, product, 3, 50)).unwrap();

        assert_eq!(p.list(shop).len(), 1);
        assert_eq!(p.list(shop)[0].sequence, 3);
    }

    #[test]
    fn unrelated_event_types_are_ignored() {
        let p = projection();
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            ShopId::new(),
            AggregateId::new(),
            "inventory.batch.created",
            0,
            serde_json::json!({"anything": true}),
        );
        assert!(p.apply_envelope(&env).is_ok());
    }

    #[test]
    fn deactivation_drops_product_alerts() {
        let p = projection();
        let shop = ShopId::new();
        let product = ProductId::new(AggregateId::new());
        p.apply_envelope(&entry_envelope(shop, product, 1, 0)).unwrap();

        let event = InventoryEvent::ProductDeactivated(ProductDeactivated {
            shop_id: shop,
            product_id: product,
            released_batch_ids: vec![],
            actor: None,
            occurred_at: Utc::now(),
        });
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            shop,
            product.0,
            PRODUCT_DEACTIVATED,
            0,
            serde_json::to_value(event).unwrap(),
        );
        p.apply_envelope(&env).unwrap();

        assert!(p.list(shop).is_empty());
    }

    #[test]
    fn rebuild_resets_cursors() {
        let p = projection();
        let shop = ShopId::new();
        let product = ProductId::new(AggregateId::new());
        p.apply_envelope(&entry_envelope(shop, product, 5, 1)).unwrap();

        p.rebuild_from_scratch(vec![entry_envelope(shop, product, 1, 3)]).unwrap();

        assert_eq!(p.list(shop)[0].sequence, 1);
    }
}
