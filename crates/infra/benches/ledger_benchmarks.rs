use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use stockledger_core::ShopId;
use stockledger_events::{EventBus, EventEnvelope, InMemoryEventBus};
use stockledger_inventory::{LedgerPosting, MovementKind};
use stockledger_infra::projections::StockAlertProjection;
use stockledger_infra::read_model::InMemoryShopStore;
use stockledger_infra::services::{Adjustment, NewProduct, OrderLineRequest, PlaceOrderRequest};
use stockledger_infra::store::{InMemoryInventoryStore, LedgerStore, WriteBatch};
use stockledger_infra::{EngineConfig, InventoryEngine};
use stockledger_products::Product;
use stockledger_sales::LineRef;

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

fn setup() -> (InventoryEngine<Bus>, Bus, ShopId, Product) {
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let engine = InventoryEngine::new(
        Arc::new(InMemoryInventoryStore::new()),
        bus.clone(),
        EngineConfig::default(),
    );
    let shop = ShopId::new();
    let product = engine
        .create_product(
            shop,
            NewProduct {
                name: "Bench Item".to_string(),
                barcode: Some("BENCH".to_string()),
                cost_price: 10,
                selling_price: 12,
                tracks_inventory: true,
                tracks_expiry: false,
                stock_alert_threshold: 5,
            },
            None,
        )
        .unwrap();
    (engine, bus, shop, product)
}

fn restock(engine: &InventoryEngine<Bus>, shop: ShopId, product: &Product, quantity: i64) {
    engine
        .adjust(
            shop,
            Adjustment {
                product_id: product.id_typed(),
                batch_id: None,
                quantity,
                reason: "bench restock".to_string(),
            },
            None,
        )
        .unwrap();
}

fn bench_posting_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("posting_latency");
    group.sample_size(500);

    group.bench_function("adjustment", |b| {
        let (engine, _bus, shop, product) = setup();
        b.iter(|| restock(&engine, shop, &product, black_box(1)));
    });

    group.bench_function("single_line_order", |b| {
        let (engine, _bus, shop, product) = setup();
        restock(&engine, shop, &product, i64::MAX / 2);
        b.iter(|| {
            engine
                .place_order(
                    shop,
                    PlaceOrderRequest {
                        order_id: None,
                        lines: vec![OrderLineRequest {
                            reference: LineRef::Product {
                                product_id: product.id_typed(),
                                batch_id: None,
                            },
                            quantity: black_box(1),
                            unit_price: 12,
                        }],
                    },
                    None,
                )
                .unwrap()
        });
    });

    group.finish();
}

fn bench_commit_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit_throughput");

    for batch_size in [1usize, 10, 100].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(BenchmarkId::new("postings_per_commit", batch_size), batch_size, |b, &size| {
            let (engine, _bus, _shop, product) = setup();
            let store = engine.store().clone();
            b.iter(|| {
                let postings = (0..size)
                    .map(|_| LedgerPosting::new(product.unit(), MovementKind::Purchase, 1, None, Utc::now()))
                    .collect();
                store.commit(black_box(WriteBatch::postings(postings))).unwrap()
            });
        });
    }

    group.finish();
}

fn bench_alert_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("alert_projection_rebuild");

    for entry_count in [10usize, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("rebuild_from_entries", entry_count), entry_count, |b, &count| {
            let (engine, bus, shop, product) = setup();
            let sub = bus.subscribe();
            for i in 0..count {
                let delta = if i % 2 == 0 { 3 } else { -2 };
                restock(&engine, shop, &product, delta);
            }
            let mut envelopes = Vec::with_capacity(count);
            while let Ok(env) = sub.try_recv() {
                envelopes.push(env);
            }

            let projection = StockAlertProjection::new(InMemoryShopStore::new());
            b.iter(|| {
                projection.rebuild_from_scratch(black_box(envelopes.clone())).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_posting_latency, bench_commit_throughput, bench_alert_rebuild);
criterion_main!(benches);
