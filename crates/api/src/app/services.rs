use std::sync::Arc;

use serde_json::Value as JsonValue;
use sqlx::PgPool;

use stockledger_core::ShopId;
use stockledger_events::{EventBus, EventEnvelope, InMemoryEventBus};
use stockledger_infra::{
    EngineConfig, InventoryEngine,
    projections::{StockAlert, StockAlertProjection},
    read_model::InMemoryShopStore,
    store::{InMemoryInventoryStore, InventoryStore, PostgresInventoryStore},
};
use stockledger_products::StockUnit;

use crate::config::ApiConfig;

pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type AlertProjection = StockAlertProjection<Arc<InMemoryShopStore<StockUnit, StockAlert>>>;

/// Everything a handler needs: the engine and the alert read model it feeds.
#[derive(Debug)]
pub struct AppServices {
    engine: InventoryEngine<Bus>,
    alerts: Arc<AlertProjection>,
    backend: &'static str,
}

impl AppServices {
    /// Wire an engine over `store` and start the bus -> alert projection worker.
    pub fn new(store: Arc<dyn InventoryStore>, backend: &'static str, config: EngineConfig) -> Self {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let alerts: Arc<AlertProjection> = Arc::new(StockAlertProjection::new(Arc::new(InMemoryShopStore::new())));

        // Background subscriber: bus -> projection. Ends when the bus is dropped.
        {
            let sub = bus.subscribe();
            let alerts = alerts.clone();
            let spawned = std::thread::Builder::new()
                .name("stock-alerts".to_string())
                .spawn(move || {
                    while let Ok(env) = sub.recv() {
                        if let Err(e) = alerts.apply_envelope(&env) {
                            tracing::warn!("stock alert projection apply failed: {e}");
                        }
                    }
                });
            if let Err(e) = spawned {
                tracing::error!("failed to start the stock alert worker: {e}");
            }
        }

        Self {
            engine: InventoryEngine::new(store, bus, config),
            alerts,
            backend,
        }
    }

    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(Arc::new(InMemoryInventoryStore::new()), "in_memory", config)
    }

    pub fn engine(&self) -> &InventoryEngine<Bus> {
        &self.engine
    }

    pub fn alerts(&self, shop_id: ShopId) -> Vec<StockAlert> {
        self.alerts.list(shop_id)
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }
}

/// Pick the store from configuration: Postgres when a database URL is set.
pub async fn build_services(config: &ApiConfig, engine_config: EngineConfig) -> anyhow::Result<Arc<AppServices>> {
    let services = match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url).await?;
            let store = PostgresInventoryStore::new(pool);
            store.migrate().await?;
            tracing::info!("using the postgres inventory store");
            AppServices::new(Arc::new(store), "postgres", engine_config)
        }
        None => AppServices::in_memory(engine_config),
    };
    Ok(Arc::new(services))
}
