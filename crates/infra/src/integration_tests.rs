//! End-to-end workflow tests over the in-memory store.
//!
//! Engine → InMemoryInventoryStore → EventBus → StockAlertProjection

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use proptest::prelude::*;
    use serde_json::Value as JsonValue;

    use stockledger_core::{AggregateId, ShopId, UserId};
    use stockledger_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
    use stockledger_inventory::{MovementKind, OriginKind, TransferRequest};
    use stockledger_products::{Batch, Product, StockUnit};
    use stockledger_purchasing::{ExpenseKind, LineRevision};
    use stockledger_sales::{LineRef, LineState, LineUpdate, OrderId, ServiceId};

    use crate::config::EngineConfig;
    use crate::error::EngineError;
    use crate::projections::StockAlertProjection;
    use crate::read_model::InMemoryShopStore;
    use crate::services::{
        Adjustment, ExpenseLineRequest, InventoryEngine, NewBatch, NewProduct, OrderLineRequest,
        OrderOutcome, PlaceOrderRequest, RecordExpenseRequest, ReviseExpenseRequest, TransferResult, UpdateOrderRequest,
    };
    use crate::store::{InMemoryInventoryStore, LedgerFilter};

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    fn setup_with(config: EngineConfig) -> (Arc<InventoryEngine<Bus>>, Bus) {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let engine = InventoryEngine::new(Arc::new(InMemoryInventoryStore::new()), bus.clone(), config);
        (Arc::new(engine), bus)
    }

    fn setup() -> (Arc<InventoryEngine<Bus>>, Bus) {
        setup_with(EngineConfig::default())
    }

    fn actor() -> Option<UserId> {
        Some(UserId::new())
    }

    fn new_product(engine: &InventoryEngine<Bus>, shop: ShopId, barcode: &str, tracks_expiry: bool) -> Product {
        engine
            .create_product(
                shop,
                NewProduct {
                    name: format!("Item {barcode}"),
                    barcode: Some(barcode.to_string()),
                    cost_price: 100,
                    selling_price: 150,
                    tracks_inventory: true,
                    tracks_expiry,
                    stock_alert_threshold: 5,
                },
                actor(),
            )
            .unwrap()
    }

    fn new_batch(engine: &InventoryEngine<Bus>, shop: ShopId, number: &str, product: Option<&Product>) -> Batch {
        engine
            .create_batch(
                shop,
                NewBatch {
                    batch_number: number.to_string(),
                    expiry_date: Utc::now() + Duration::days(30),
                    stock_alert_threshold: 5,
                    product_id: product.map(|p| p.id_typed()),
                },
                actor(),
            )
            .unwrap()
    }

    fn stock(engine: &InventoryEngine<Bus>, shop: ShopId, product: &Product, batch: Option<&Batch>, quantity: i64) {
        engine
            .adjust(
                shop,
                Adjustment {
                    product_id: product.id_typed(),
                    batch_id: batch.map(|b| b.id_typed()),
                    quantity,
                    reason: "opening count".to_string(),
                },
                actor(),
            )
            .unwrap();
    }

    fn sell(product: &Product, batch: Option<&Batch>, quantity: i64) -> OrderLineRequest {
        OrderLineRequest {
            reference: LineRef::Product {
                product_id: product.id_typed(),
                batch_id: batch.map(|b| b.id_typed()),
            },
            quantity,
            unit_price: 150,
        }
    }

    fn order_of(lines: Vec<OrderLineRequest>) -> PlaceOrderRequest {
        PlaceOrderRequest { order_id: None, lines }
    }

    fn drain(sub: &Subscription<EventEnvelope<JsonValue>>) -> Vec<EventEnvelope<JsonValue>> {
        let mut out = Vec::new();
        while let Ok(env) = sub.try_recv() {
            out.push(env);
        }
        out
    }

    #[test]
    fn sale_then_return_moves_balance_and_regression_is_rejected() {
        let (engine, _bus) = setup();
        let shop = ShopId::new();
        let product = new_product(&engine, shop, "P-001", false);
        stock(&engine, shop, &product, None, 100);
        let unit = product.unit();

        let placed = engine.place_order(shop, order_of(vec![sell(&product, None, 10)]), actor()).unwrap();
        assert_eq!(engine.current_balance(unit).unwrap(), 90);
        assert_eq!(placed.entries.len(), 1);
        let sale = &placed.entries[0];
        assert_eq!(sale.kind, MovementKind::Sale);
        assert_eq!(sale.quantity, -10);
        assert_eq!(sale.resulting_balance, 90);
        assert_eq!(sale.origin.map(|o| o.kind), Some(OriginKind::Order));
        assert_eq!(placed.lines[0].original_quantity_at_purchase, 10);

        let reference = placed.lines[0].reference;
        let returned = engine
            .update_order(
                shop,
                placed.order_id,
                UpdateOrderRequest {
                    lines: vec![LineUpdate { reference, quantity_returned: 3 }],
                },
                actor(),
            )
            .unwrap();
        assert_eq!(engine.current_balance(unit).unwrap(), 93);
        assert_eq!(returned.entries.len(), 1);
        assert_eq!(returned.entries[0].kind, MovementKind::Return);
        assert_eq!(returned.entries[0].quantity, 3);
        assert_eq!(returned.entries[0].resulting_balance, 93);
        assert_eq!(returned.lines[0].state(), LineState::PartiallyReturned);

        let err = engine
            .update_order(
                shop,
                placed.order_id,
                UpdateOrderRequest {
                    lines: vec![LineUpdate { reference, quantity_returned: 2 }],
                },
                actor(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Invariant(_)));
        assert_eq!(engine.current_balance(unit).unwrap(), 93);
    }

    #[test]
    fn resubmitting_the_same_return_posts_nothing() {
        let (engine, _bus) = setup();
        let shop = ShopId::new();
        let product = new_product(&engine, shop, "P-001", false);
        stock(&engine, shop, &product, None, 20);

        let placed = engine.place_order(shop, order_of(vec![sell(&product, None, 4)]), actor()).unwrap();
        let update = UpdateOrderRequest {
            lines: vec![LineUpdate {
                reference: placed.lines[0].reference,
                quantity_returned: 4,
            }],
        };
        engine.update_order(shop, placed.order_id, update.clone(), actor()).unwrap();
        let again = engine.update_order(shop, placed.order_id, update, actor()).unwrap();

        assert!(again.entries.is_empty());
        assert_eq!(again.lines[0].state(), LineState::FullyReturned);
        assert_eq!(engine.current_balance(product.unit()).unwrap(), 20);
    }

    #[test]
    fn order_line_count_cannot_change() {
        let (engine, _bus) = setup();
        let shop = ShopId::new();
        let product = new_product(&engine, shop, "P-001", false);
        stock(&engine, shop, &product, None, 20);

        let placed = engine
            .place_order(shop, order_of(vec![sell(&product, None, 1), sell(&product, None, 2)]), actor())
            .unwrap();
        let err = engine
            .update_order(
                shop,
                placed.order_id,
                UpdateOrderRequest {
                    lines: vec![LineUpdate {
                        reference: placed.lines[0].reference,
                        quantity_returned: 1,
                    }],
                },
                actor(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Invariant(_)));
        assert_eq!(engine.order(shop, placed.order_id).unwrap().lines.len(), 2);
    }

    #[test]
    fn overselling_is_rejected_before_posting() {
        let (engine, _bus) = setup();
        let shop = ShopId::new();
        let product = new_product(&engine, shop, "P-001", false);
        stock(&engine, shop, &product, None, 5);

        let err = engine.place_order(shop, order_of(vec![sell(&product, None, 6)]), actor()).unwrap_err();
        assert_eq!(err.shortfall(), Some(1));
        assert_eq!(err.code(), "insufficient_stock");

        // Two lines on one unit are checked cumulatively.
        let err = engine
            .place_order(shop, order_of(vec![sell(&product, None, 3), sell(&product, None, 3)]), actor())
            .unwrap_err();
        assert_eq!(err.shortfall(), Some(1));

        assert_eq!(engine.current_balance(product.unit()).unwrap(), 5);
        assert_eq!(engine.unit_history(product.unit()).unwrap().len(), 1);
    }

    #[test]
    fn service_lines_and_untracked_products_post_nothing() {
        let (engine, _bus) = setup();
        let shop = ShopId::new();
        let untracked = engine
            .create_product(
                shop,
                NewProduct {
                    name: "Gift wrap".to_string(),
                    barcode: None,
                    cost_price: 0,
                    selling_price: 200,
                    tracks_inventory: false,
                    tracks_expiry: false,
                    stock_alert_threshold: 0,
                },
                actor(),
            )
            .unwrap();

        let placed = engine
            .place_order(
                shop,
                order_of(vec![
                    OrderLineRequest {
                        reference: LineRef::Service {
                            service_id: ServiceId(AggregateId::new()),
                        },
                        quantity: 1,
                        unit_price: 500,
                    },
                    sell(&untracked, None, 2),
                ]),
                actor(),
            )
            .unwrap();

        assert!(placed.entries.is_empty());
        assert!(placed.lines[0].product_snapshot.is_none());
        assert_eq!(
            placed.lines[1].product_snapshot.as_ref().map(|s| s.name.as_str()),
            Some("Gift wrap")
        );
    }

    #[test]
    fn expiry_tracked_sale_requires_a_batch_of_the_same_product() {
        let (engine, _bus) = setup();
        let shop = ShopId::new();
        let milk = new_product(&engine, shop, "MILK", true);
        let cheese = new_product(&engine, shop, "CHEESE", true);
        let cheese_batch = new_batch(&engine, shop, "C-1", Some(&cheese));

        let err = engine.place_order(shop, order_of(vec![sell(&milk, None, 1)]), actor()).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = engine
            .place_order(shop, order_of(vec![sell(&milk, Some(&cheese_batch), 1)]), actor())
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn batch_level_sale_uses_the_batch_balance_and_snapshots_it() {
        let (engine, _bus) = setup();
        let shop = ShopId::new();
        let milk = new_product(&engine, shop, "MILK", true);
        let early = new_batch(&engine, shop, "M-1", Some(&milk));
        let late = new_batch(&engine, shop, "M-2", Some(&milk));
        stock(&engine, shop, &milk, Some(&early), 10);
        stock(&engine, shop, &milk, Some(&late), 7);

        let placed = engine.place_order(shop, order_of(vec![sell(&milk, Some(&late), 4)]), actor()).unwrap();
        let unit = StockUnit::batch(shop, milk.id_typed(), late.id_typed());
        assert_eq!(placed.lines[0].unit, Some(unit));
        assert_eq!(
            placed.lines[0].batch_snapshot.as_ref().map(|s| s.batch_number.as_str()),
            Some("M-2")
        );
        assert_eq!(engine.current_balance(unit).unwrap(), 3);
        assert_eq!(engine.product_total(shop, milk.id_typed()).unwrap(), 13);
        assert!(engine.is_below_alert(unit).unwrap());
    }

    #[test]
    fn snapshot_survives_later_catalog_edits() {
        let (engine, _bus) = setup();
        let shop = ShopId::new();
        let product = new_product(&engine, shop, "P-001", false);
        stock(&engine, shop, &product, None, 10);
        let placed = engine.place_order(shop, order_of(vec![sell(&product, None, 1)]), actor()).unwrap();

        engine
            .update_product(
                shop,
                product.id_typed(),
                stockledger_products::UpdateProductDetails {
                    name: Some("Renamed".to_string()),
                    ..Default::default()
                },
                actor(),
            )
            .unwrap();

        let stored = engine.order(shop, placed.order_id).unwrap();
        assert_eq!(
            stored.lines[0].product_snapshot.as_ref().map(|s| s.name.as_str()),
            Some("Item P-001")
        );
    }

    #[test]
    fn batch_number_is_unique_among_active_batches_of_a_shop() {
        let (engine, _bus) = setup();
        let shop = ShopId::new();
        let first = new_batch(&engine, shop, "LOT-7", None);

        let duplicate = engine.create_batch(
            shop,
            NewBatch {
                batch_number: "LOT-7".to_string(),
                expiry_date: Utc::now() + Duration::days(10),
                stock_alert_threshold: 1,
                product_id: None,
            },
            actor(),
        );
        assert!(matches!(duplicate, Err(EngineError::Conflict(_))));

        // Another shop may reuse the number.
        new_batch(&engine, ShopId::new(), "LOT-7", None);

        engine.deactivate_batch(shop, first.id_typed()).unwrap();
        let reused = new_batch(&engine, shop, "LOT-7", None);
        assert!(reused.is_active());
    }

    #[test]
    fn batch_expiry_must_be_in_the_future() {
        let (engine, _bus) = setup();
        let err = engine
            .create_batch(
                ShopId::new(),
                NewBatch {
                    batch_number: "OLD".to_string(),
                    expiry_date: Utc::now() - Duration::seconds(1),
                    stock_alert_threshold: 1,
                    product_id: None,
                },
                actor(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn deactivating_a_product_releases_every_linked_batch() {
        let (engine, bus) = setup();
        let sub = bus.subscribe();
        let shop = ShopId::new();
        let milk = new_product(&engine, shop, "MILK", true);
        let a = new_batch(&engine, shop, "M-1", None);
        let b = new_batch(&engine, shop, "M-2", None);
        let linked = engine.link_batches(shop, milk.id_typed(), &[a.id_typed(), b.id_typed()], actor()).unwrap();
        assert_eq!(linked.batch_ids().len(), 2);

        let deactivated = engine.deactivate_product(shop, milk.id_typed(), actor()).unwrap();
        assert!(!deactivated.is_active());
        assert!(deactivated.batch_ids().is_empty());
        for batch in engine.batches(shop).unwrap() {
            assert_eq!(batch.product_id(), None);
        }

        let err = engine.place_order(shop, order_of(vec![sell(&milk, Some(&a), 1)]), actor()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        let types: Vec<_> = drain(&sub).iter().map(|e| e.event_type().to_string()).collect();
        assert!(types.contains(&"inventory.product.deactivated".to_string()));
    }

    fn sold_from_batch(
        engine: &InventoryEngine<Bus>,
        shop: ShopId,
    ) -> (Product, Batch, OrderId, LineRef) {
        let milk = new_product(engine, shop, "MILK", true);
        let lot = new_batch(engine, shop, "M-1", Some(&milk));
        stock(engine, shop, &milk, Some(&lot), 10);
        let placed = engine.place_order(shop, order_of(vec![sell(&milk, Some(&lot), 4)]), actor()).unwrap();
        (milk, lot, placed.order_id, placed.lines[0].reference)
    }

    fn return_two(
        engine: &InventoryEngine<Bus>,
        shop: ShopId,
        order_id: OrderId,
        reference: LineRef,
    ) -> OrderOutcome {
        engine
            .update_order(
                shop,
                order_id,
                UpdateOrderRequest {
                    lines: vec![LineUpdate { reference, quantity_returned: 2 }],
                },
                actor(),
            )
            .unwrap()
    }

    #[test]
    fn return_reaches_the_sold_batch_after_it_is_deactivated() {
        let (engine, _bus) = setup();
        let shop = ShopId::new();
        let (milk, lot, order_id, reference) = sold_from_batch(&engine, shop);
        engine.deactivate_batch(shop, lot.id_typed()).unwrap();

        let returned = return_two(&engine, shop, order_id, reference);
        let unit = StockUnit::batch(shop, milk.id_typed(), lot.id_typed());
        assert_eq!(returned.entries.len(), 1);
        assert_eq!(returned.entries[0].kind, MovementKind::Return);
        assert_eq!(returned.entries[0].unit(), unit);
        assert_eq!(returned.entries[0].resulting_balance, 8);
        assert_eq!(engine.current_balance(unit).unwrap(), 8);
        assert!(engine.reconcile(unit).unwrap().is_consistent());
    }

    #[test]
    fn return_reaches_the_sold_batch_after_its_product_is_deactivated() {
        let (engine, _bus) = setup();
        let shop = ShopId::new();
        let (milk, lot, order_id, reference) = sold_from_batch(&engine, shop);
        engine.deactivate_product(shop, milk.id_typed(), actor()).unwrap();

        let returned = return_two(&engine, shop, order_id, reference);
        let unit = StockUnit::batch(shop, milk.id_typed(), lot.id_typed());
        assert_eq!(returned.entries.len(), 1);
        assert_eq!(returned.entries[0].unit(), unit);
        assert_eq!(returned.entries[0].resulting_balance, 8);
        assert_eq!(engine.current_balance(unit).unwrap(), 8);

        // New movements still need the link.
        let err = engine
            .adjust(
                shop,
                Adjustment {
                    product_id: milk.id_typed(),
                    batch_id: Some(lot.id_typed()),
                    quantity: 1,
                    reason: "recount".to_string(),
                },
                actor(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_) | EngineError::NotFound(_)));
        assert_eq!(engine.current_balance(unit).unwrap(), 8);
    }

    #[test]
    fn linking_a_batch_to_another_product_moves_it() {
        let (engine, _bus) = setup();
        let shop = ShopId::new();
        let milk = new_product(&engine, shop, "MILK", true);
        let cream = new_product(&engine, shop, "CREAM", true);
        let lot = new_batch(&engine, shop, "L-1", Some(&milk));
        assert_eq!(engine.product(shop, milk.id_typed()).unwrap().batch_ids().len(), 1);

        let cream = engine.link_batches(shop, cream.id_typed(), &[lot.id_typed()], actor()).unwrap();
        assert_eq!(cream.batch_ids(), &[lot.id_typed()]);
        assert!(engine.product(shop, milk.id_typed()).unwrap().batch_ids().is_empty());
        let moved = engine.batches(shop).unwrap().into_iter().find(|b| b.id_typed() == lot.id_typed()).unwrap();
        assert_eq!(moved.product_id(), Some(cream.id_typed()));

        stock(&engine, shop, &cream, Some(&lot), 3);
        let err = engine
            .adjust(
                shop,
                Adjustment {
                    product_id: milk.id_typed(),
                    batch_id: Some(lot.id_typed()),
                    quantity: 1,
                    reason: "recount".to_string(),
                },
                actor(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_) | EngineError::NotFound(_)));
    }

    #[test]
    fn fifo_candidates_skip_inactive_and_order_by_expiry() {
        let (engine, _bus) = setup();
        let shop = ShopId::new();
        let milk = new_product(&engine, shop, "MILK", true);
        let later = engine
            .create_batch(
                shop,
                NewBatch {
                    batch_number: "LATER".to_string(),
                    expiry_date: Utc::now() + Duration::days(20),
                    stock_alert_threshold: 1,
                    product_id: Some(milk.id_typed()),
                },
                actor(),
            )
            .unwrap();
        let sooner = engine
            .create_batch(
                shop,
                NewBatch {
                    batch_number: "SOONER".to_string(),
                    expiry_date: Utc::now() + Duration::days(2),
                    stock_alert_threshold: 1,
                    product_id: Some(milk.id_typed()),
                },
                actor(),
            )
            .unwrap();
        let dropped = new_batch(&engine, shop, "DROPPED", Some(&milk));
        engine.deactivate_batch(shop, dropped.id_typed()).unwrap();

        let ids: Vec<_> = engine
            .fifo_candidates(shop, milk.id_typed(), Utc::now())
            .unwrap()
            .iter()
            .map(|b| b.id_typed())
            .collect();
        assert_eq!(ids, vec![sooner.id_typed(), later.id_typed()]);
    }

    #[test]
    fn inventory_expense_receives_stock_unless_disabled() {
        let (engine, _bus) = setup();
        let shop = ShopId::new();
        let product = new_product(&engine, shop, "P-001", false);
        let line = ExpenseLineRequest {
            product_id: Some(product.id_typed()),
            batch_id: None,
            description: String::new(),
            quantity: 12,
            unit_cost: 90,
        };

        let recorded = engine
            .record_expense(
                shop,
                RecordExpenseRequest {
                    expense_id: None,
                    kind: ExpenseKind::Inventory,
                    update_stock: true,
                    lines: vec![line.clone()],
                },
                actor(),
            )
            .unwrap();
        assert_eq!(recorded.entries.len(), 1);
        assert_eq!(recorded.entries[0].kind, MovementKind::Purchase);
        assert_eq!(recorded.total_cost, 1080);
        assert_eq!(recorded.lines[0].description, "Item P-001");
        assert_eq!(engine.current_balance(product.unit()).unwrap(), 12);

        let financial_only = engine
            .record_expense(
                shop,
                RecordExpenseRequest {
                    expense_id: None,
                    kind: ExpenseKind::Inventory,
                    update_stock: false,
                    lines: vec![line],
                },
                actor(),
            )
            .unwrap();
        assert!(financial_only.entries.is_empty());
        assert!(financial_only.lines[0].product_snapshot.is_some());
        assert_eq!(engine.current_balance(product.unit()).unwrap(), 12);
    }

    #[test]
    fn expense_for_an_unknown_product_is_not_found() {
        let (engine, _bus) = setup();
        let err = engine
            .record_expense(
                ShopId::new(),
                RecordExpenseRequest {
                    expense_id: None,
                    kind: ExpenseKind::Inventory,
                    update_stock: true,
                    lines: vec![ExpenseLineRequest {
                        product_id: Some(stockledger_products::ProductId::new(AggregateId::new())),
                        batch_id: None,
                        description: String::new(),
                        quantity: 1,
                        unit_cost: 1,
                    }],
                },
                actor(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn expiry_tracked_purchase_posts_to_the_batch_when_given() {
        let (engine, _bus) = setup();
        let shop = ShopId::new();
        let milk = new_product(&engine, shop, "MILK", true);
        let batch = new_batch(&engine, shop, "M-1", Some(&milk));

        let with_batch = engine
            .record_expense(
                shop,
                RecordExpenseRequest {
                    expense_id: None,
                    kind: ExpenseKind::Inventory,
                    update_stock: true,
                    lines: vec![
                        ExpenseLineRequest {
                            product_id: Some(milk.id_typed()),
                            batch_id: Some(batch.id_typed()),
                            description: String::new(),
                            quantity: 30,
                            unit_cost: 10,
                        },
                        ExpenseLineRequest {
                            product_id: Some(milk.id_typed()),
                            batch_id: None,
                            description: String::new(),
                            quantity: 5,
                            unit_cost: 10,
                        },
                    ],
                },
                actor(),
            )
            .unwrap();

        assert_eq!(with_batch.entries.len(), 1);
        assert_eq!(with_batch.lines[1].unit, None);
        let unit = StockUnit::batch(shop, milk.id_typed(), batch.id_typed());
        assert_eq!(engine.current_balance(unit).unwrap(), 30);
    }

    #[test]
    fn expense_revision_keeps_structure_frozen() {
        let (engine, _bus) = setup();
        let shop = ShopId::new();
        let recorded = engine
            .record_expense(
                shop,
                RecordExpenseRequest {
                    expense_id: None,
                    kind: ExpenseKind::NonInventory,
                    update_stock: false,
                    lines: vec![ExpenseLineRequest {
                        product_id: None,
                        batch_id: None,
                        description: "Electricity".to_string(),
                        quantity: 1,
                        unit_cost: 4200,
                    }],
                },
                actor(),
            )
            .unwrap();

        let revised = engine
            .revise_expense(
                shop,
                recorded.expense_id,
                ReviseExpenseRequest {
                    kind: ExpenseKind::NonInventory,
                    lines: vec![LineRevision {
                        product_id: None,
                        quantity: 1,
                        description: "Electricity (March)".to_string(),
                        unit_cost: 4300,
                    }],
                },
                actor(),
            )
            .unwrap();
        assert_eq!(revised.lines[0].description, "Electricity (March)");
        assert_eq!(revised.version, 2);

        let err = engine
            .revise_expense(
                shop,
                recorded.expense_id,
                ReviseExpenseRequest {
                    kind: ExpenseKind::Inventory,
                    lines: vec![LineRevision {
                        product_id: None,
                        quantity: 1,
                        description: "Electricity".to_string(),
                        unit_cost: 4300,
                    }],
                },
                actor(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Invariant(_)));

        let err = engine
            .revise_expense(
                shop,
                recorded.expense_id,
                ReviseExpenseRequest {
                    kind: ExpenseKind::NonInventory,
                    lines: Vec::new(),
                },
                actor(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Invariant(_)));
    }

    #[test]
    fn transfer_moves_stock_between_barcode_matched_products() {
        let (engine, _bus) = setup();
        let shop_a = ShopId::new();
        let shop_b = ShopId::new();
        let source = new_product(&engine, shop_a, "P-001", false);
        let target = new_product(&engine, shop_b, "P-001", false);
        stock(&engine, shop_a, &source, None, 100);
        stock(&engine, shop_b, &target, None, 50);

        let [out, into] = engine
            .transfer(
                &TransferRequest {
                    from_shop: shop_a,
                    to_shop: shop_b,
                    product_id: source.id_typed(),
                    batch_id: None,
                    quantity: 5,
                },
                actor(),
            )
            .unwrap();

        assert_eq!(engine.current_balance(source.unit()).unwrap(), 95);
        assert_eq!(engine.current_balance(target.unit()).unwrap(), 55);
        assert_eq!((out.kind, out.quantity, out.resulting_balance), (MovementKind::TransferOut, -5, 95));
        assert_eq!((into.kind, into.quantity, into.resulting_balance), (MovementKind::TransferIn, 5, 55));
        assert_eq!(out.origin, into.origin);

        let total = |shop| engine.history(shop, &LedgerFilter::default(), None, None).unwrap().total;
        assert_eq!(total(shop_a) + total(shop_b), 4);
    }

    #[test]
    fn transfer_matches_batches_by_number_under_the_destination_product() {
        let (engine, _bus) = setup();
        let shop_a = ShopId::new();
        let shop_b = ShopId::new();
        let source = new_product(&engine, shop_a, "MILK", true);
        let target = new_product(&engine, shop_b, "MILK", true);
        let source_batch = new_batch(&engine, shop_a, "M-1", Some(&source));
        let target_batch = new_batch(&engine, shop_b, "M-1", Some(&target));
        let unmatched = new_batch(&engine, shop_a, "M-9", Some(&source));
        stock(&engine, shop_a, &source, Some(&source_batch), 10);
        stock(&engine, shop_a, &source, Some(&unmatched), 10);

        engine
            .transfer(
                &TransferRequest {
                    from_shop: shop_a,
                    to_shop: shop_b,
                    product_id: source.id_typed(),
                    batch_id: Some(source_batch.id_typed()),
                    quantity: 4,
                },
                actor(),
            )
            .unwrap();
        let dest_unit = StockUnit::batch(shop_b, target.id_typed(), target_batch.id_typed());
        assert_eq!(engine.current_balance(dest_unit).unwrap(), 4);

        let err = engine
            .transfer(
                &TransferRequest {
                    from_shop: shop_a,
                    to_shop: shop_b,
                    product_id: source.id_typed(),
                    batch_id: Some(unmatched.id_typed()),
                    quantity: 1,
                },
                actor(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        let source_unit = StockUnit::batch(shop_a, source.id_typed(), unmatched.id_typed());
        assert_eq!(engine.current_balance(source_unit).unwrap(), 10);
    }

    #[test]
    fn bulk_transfer_reports_each_tuple_independently() {
        let (engine, _bus) = setup();
        let shop_a = ShopId::new();
        let shop_b = ShopId::new();
        let shared = new_product(&engine, shop_a, "SHARED", false);
        new_product(&engine, shop_b, "SHARED", false);
        let local_only = new_product(&engine, shop_a, "LOCAL", false);
        stock(&engine, shop_a, &shared, None, 10);
        stock(&engine, shop_a, &local_only, None, 10);

        let request = |product: &Product, quantity| TransferRequest {
            from_shop: shop_a,
            to_shop: shop_b,
            product_id: product.id_typed(),
            batch_id: None,
            quantity,
        };
        let outcomes = engine.transfer_bulk(
            vec![request(&shared, 3), request(&local_only, 3), request(&shared, 50), request(&shared, 2)],
            actor(),
        );

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[0].is_success());
        match &outcomes[1].result {
            TransferResult::Failed(failure) => assert_eq!(failure.error, "not_found"),
            other => panic!("expected failure, got {other:?}"),
        }
        match &outcomes[2].result {
            TransferResult::Failed(failure) => assert_eq!(failure.error, "insufficient_stock"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(outcomes[3].is_success());
        assert_eq!(engine.current_balance(shared.unit()).unwrap(), 5);
        assert_eq!(engine.current_balance(local_only.unit()).unwrap(), 10);
    }

    #[test]
    fn transfer_to_the_same_shop_is_rejected() {
        let (engine, _bus) = setup();
        let shop = ShopId::new();
        let product = new_product(&engine, shop, "P-001", false);
        let err = engine
            .transfer(
                &TransferRequest {
                    from_shop: shop,
                    to_shop: shop,
                    product_id: product.id_typed(),
                    batch_id: None,
                    quantity: 1,
                },
                actor(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn concurrent_orders_never_oversell() {
        let (engine, _bus) = setup_with(EngineConfig {
            max_conflict_retries: 64,
            ..EngineConfig::default()
        });
        let shop = ShopId::new();
        let product = new_product(&engine, shop, "HOT", false);
        stock(&engine, shop, &product, None, 10);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let product = product.clone();
                std::thread::spawn(move || engine.place_order(shop, order_of(vec![sell(&product, None, 3)]), None))
            })
            .collect();

        let mut sold = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(_) => sold += 3,
                Err(err) => assert!(
                    matches!(err, EngineError::InsufficientStock { .. } | EngineError::Concurrency(_)),
                    "unexpected error {err:?}"
                ),
            }
        }

        let remaining = engine.current_balance(product.unit()).unwrap();
        assert!(sold <= 10);
        assert_eq!(remaining, 10 - sold);
        assert!(remaining >= 0);
        assert!(engine.reconcile(product.unit()).unwrap().is_consistent());
    }

    #[test]
    fn published_entries_drive_the_stock_alert_projection() {
        let (engine, bus) = setup();
        let sub = bus.subscribe();
        let projection = StockAlertProjection::new(InMemoryShopStore::new());
        let shop = ShopId::new();
        let product = new_product(&engine, shop, "P-001", false);
        stock(&engine, shop, &product, None, 8);
        engine.place_order(shop, order_of(vec![sell(&product, None, 4)]), None).unwrap();

        for envelope in drain(&sub) {
            projection.apply_envelope(&envelope).unwrap();
        }
        let alerts = projection.list(shop);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].quantity, 4);
        assert_eq!(alerts[0].sequence, 2);

        let low = engine.low_stock(shop).unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].unit, product.unit());

        stock(&engine, shop, &product, None, 10);
        for envelope in drain(&sub) {
            projection.apply_envelope(&envelope).unwrap();
        }
        assert!(projection.list(shop).is_empty());
    }

    #[test]
    fn history_filters_and_paginates() {
        let (engine, _bus) = setup();
        let shop = ShopId::new();
        let product = new_product(&engine, shop, "P-001", false);
        stock(&engine, shop, &product, None, 50);
        for _ in 0..3 {
            engine.place_order(shop, order_of(vec![sell(&product, None, 2)]), None).unwrap();
        }

        let sales = LedgerFilter {
            kind: Some(MovementKind::Sale),
            ..LedgerFilter::default()
        };
        let page = engine.history(shop, &sales, Some(2), None).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.entries.len(), 2);
        assert!(page.has_more);

        let all = engine.history(shop, &LedgerFilter::default(), None, None).unwrap();
        let sequences: Vec<_> = all.entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
        assert!(engine.history(ShopId::new(), &LedgerFilter::default(), None, None).unwrap().entries.is_empty());
    }

    #[test]
    fn adjustment_without_reason_is_rejected() {
        let (engine, _bus) = setup();
        let shop = ShopId::new();
        let product = new_product(&engine, shop, "P-001", false);
        let err = engine
            .adjust(
                shop,
                Adjustment {
                    product_id: product.id_typed(),
                    batch_id: None,
                    quantity: 3,
                    reason: "   ".to_string(),
                },
                actor(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn balance_always_equals_the_ledger_sum(
            movements in prop::collection::vec((1i64..40, any::<bool>()), 1..25)
        ) {
            let (engine, _bus) = setup();
            let shop = ShopId::new();
            let product = new_product(&engine, shop, "PROP", false);
            let unit = product.unit();

            let mut expected = 0i64;
            for (magnitude, inbound) in movements {
                let quantity = if inbound { magnitude } else { -magnitude };
                engine
                    .adjust(
                        shop,
                        Adjustment {
                            product_id: product.id_typed(),
                            batch_id: None,
                            quantity,
                            reason: "cycle count".to_string(),
                        },
                        None,
                    )
                    .unwrap();
                expected += quantity;
            }

            let entries = engine.unit_history(unit).unwrap();
            prop_assert_eq!(engine.current_balance(unit).unwrap(), expected);
            prop_assert_eq!(entries.iter().map(|e| e.quantity).sum::<i64>(), expected);
            prop_assert_eq!(entries.last().map(|e| e.resulting_balance), Some(expected));
            prop_assert!(engine.reconcile(unit).unwrap().is_consistent());
        }
    }
}
