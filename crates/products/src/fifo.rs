//! First-expiry-first-out ordering over a product's batches.

use chrono::{DateTime, Utc};

use crate::batch::Batch;
use crate::product::Product;

/// Batches eligible to satisfy a sale of `product`, soonest expiry first.
///
/// Only active, non-expired batches linked to the product are returned. Ties on
/// expiry fall back to creation time, then id, so the order is total.
pub fn fifo_candidates<'a>(
    batches: impl IntoIterator<Item = &'a Batch>,
    product: &Product,
    as_of: DateTime<Utc>,
) -> Vec<&'a Batch> {
    let product_id = product.id_typed();
    let mut eligible: Vec<&Batch> = batches
        .into_iter()
        .filter(|b| b.is_active() && b.belongs_to(product_id) && !b.is_expired(as_of))
        .collect();
    eligible.sort_by(|a, b| {
        a.expiry_date()
            .cmp(&b.expiry_date())
            .then_with(|| a.created_at().cmp(&b.created_at()))
            .then_with(|| a.id_typed().cmp(&b.id_typed()))
    });
    eligible
}

/// Sum of quantities across active batches linked to the product, expired ones included.
pub fn total_on_hand<'a>(batches: impl IntoIterator<Item = &'a Batch>, product: &Product) -> i64 {
    let product_id = product.id_typed();
    batches
        .into_iter()
        .filter(|b| b.is_active() && b.belongs_to(product_id))
        .map(Batch::quantity)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchId, CreateBatch};
    use crate::product::{CreateProduct, ProductId};
    use crate::unit::UnitBalance;
    use chrono::Duration;
    use proptest::prelude::*;
    use stockledger_core::{AggregateId, ShopId};

    fn product(shop_id: ShopId, now: DateTime<Utc>) -> Product {
        Product::create(CreateProduct {
            shop_id,
            product_id: ProductId::new(AggregateId::new()),
            name: "Milk".to_string(),
            barcode: None,
            cost_price: 90,
            selling_price: 130,
            tracks_inventory: true,
            tracks_expiry: true,
            stock_alert_threshold: 0,
            actor: None,
            occurred_at: now,
        })
        .unwrap()
    }

    fn linked_batch(product: &Product, now: DateTime<Utc>, expires_in_hours: i64, qty: i64) -> Batch {
        let mut batch = Batch::create(CreateBatch {
            shop_id: product.shop_id(),
            batch_id: BatchId::new(AggregateId::new()),
            batch_number: format!("M-{expires_in_hours}-{qty}"),
            expiry_date: now + Duration::hours(expires_in_hours),
            stock_alert_threshold: 1,
            actor: None,
            occurred_at: now,
        })
        .unwrap();
        batch.link_to(product.id_typed(), now).unwrap();
        batch.materialize(UnitBalance { quantity: qty, version: 1 }, now);
        batch
    }

    #[test]
    fn excludes_expired_inactive_and_foreign_batches() {
        let now = Utc::now();
        let shop = ShopId::new();
        let milk = product(shop, now);
        let other = product(shop, now);

        let soon = linked_batch(&milk, now, 2, 4);
        let later = linked_batch(&milk, now, 48, 10);
        let expiring = linked_batch(&milk, now, 1, 7);
        let mut retired = linked_batch(&milk, now, 24, 3);
        retired.deactivate(now);
        let foreign = linked_batch(&other, now, 1, 5);

        let all = [later.clone(), expiring.clone(), retired, foreign, soon.clone()];
        let as_of = now + Duration::hours(1);
        let picked: Vec<_> = fifo_candidates(&all, &milk, as_of)
            .into_iter()
            .map(|b| b.id_typed())
            .collect();

        assert_eq!(picked, vec![soon.id_typed(), later.id_typed()]);
        assert_eq!(total_on_hand(&all, &milk), 4 + 10 + 7);
    }

    proptest! {
        #[test]
        fn candidates_are_sorted_by_expiry(hours in prop::collection::vec(1i64..500, 1..20)) {
            let now = Utc::now();
            let milk = product(ShopId::new(), now);
            let batches: Vec<Batch> = hours.iter().map(|h| linked_batch(&milk, now, *h, 1)).collect();

            let picked = fifo_candidates(&batches, &milk, now);

            prop_assert_eq!(picked.len(), batches.len());
            for pair in picked.windows(2) {
                prop_assert!(pair[0].expiry_date() <= pair[1].expiry_date());
            }
        }
    }
}
