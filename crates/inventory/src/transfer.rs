use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockledger_core::{DomainError, DomainResult, ExpectedVersion, ShopId, UserId};
use stockledger_products::{BatchId, ProductId, StockUnit, UnitBalance};

use crate::ledger::LedgerPosting;
use crate::movement::{MovementKind, OriginRef};

/// One tuple of a bulk transfer call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_shop: ShopId,
    pub to_shop: ShopId,
    pub product_id: ProductId,
    pub batch_id: Option<BatchId>,
    pub quantity: i64,
}

impl TransferRequest {
    pub fn validate(&self) -> DomainResult<()> {
        if self.from_shop == self.to_shop {
            return Err(DomainError::validation(
                "source and destination shop must differ",
            ));
        }
        if self.quantity <= 0 {
            return Err(DomainError::validation("transfer quantity must be positive"));
        }
        Ok(())
    }
}

/// Build the paired postings for a transfer.
///
/// Both legs share one transfer origin id and pin the versions the caller
/// observed, so the pair lands together or not at all.
pub fn transfer_postings(
    transfer_id: Uuid,
    quantity: i64,
    source: (StockUnit, UnitBalance),
    destination: (StockUnit, UnitBalance),
    actor: Option<UserId>,
    occurred_at: DateTime<Utc>,
) -> DomainResult<[LedgerPosting; 2]> {
    let (source_unit, source_balance) = source;
    let (dest_unit, dest_balance) = destination;
    if source_unit.shop_id == dest_unit.shop_id {
        return Err(DomainError::validation(
            "source and destination shop must differ",
        ));
    }

    let origin = OriginRef::transfer(transfer_id);
    let out = LedgerPosting::new(source_unit, MovementKind::TransferOut, -quantity, actor, occurred_at)
        .with_origin(origin)
        .expecting(ExpectedVersion::Exact(source_balance.version));
    let into = LedgerPosting::new(dest_unit, MovementKind::TransferIn, quantity, actor, occurred_at)
        .with_origin(origin)
        .expecting(ExpectedVersion::Exact(dest_balance.version));
    out.validate()?;
    into.validate()?;
    Ok([out, into])
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockledger_core::AggregateId;

    #[test]
    fn same_shop_is_rejected() {
        let shop = ShopId::new();
        let req = TransferRequest {
            from_shop: shop,
            to_shop: shop,
            product_id: ProductId::new(AggregateId::new()),
            batch_id: None,
            quantity: 5,
        };
        assert!(matches!(req.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let req = TransferRequest {
            from_shop: ShopId::new(),
            to_shop: ShopId::new(),
            product_id: ProductId::new(AggregateId::new()),
            batch_id: None,
            quantity: 0,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn postings_mirror_each_other() {
        let src = StockUnit::product(ShopId::new(), ProductId::new(AggregateId::new()));
        let dst = StockUnit::product(ShopId::new(), ProductId::new(AggregateId::new()));
        let id = Uuid::now_v7();
        let [out, into] = transfer_postings(
            id,
            5,
            (src, UnitBalance { quantity: 100, version: 2 }),
            (dst, UnitBalance { quantity: 50, version: 7 }),
            None,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(out.kind, MovementKind::TransferOut);
        assert_eq!(out.quantity, -5);
        assert_eq!(out.expected, ExpectedVersion::Exact(2));
        assert_eq!(into.kind, MovementKind::TransferIn);
        assert_eq!(into.quantity, 5);
        assert_eq!(into.expected, ExpectedVersion::Exact(7));
        assert_eq!(out.origin, into.origin);
        assert_eq!(out.origin.map(|o| o.id), Some(id));
    }
}
