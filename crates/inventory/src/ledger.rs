use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockledger_core::{DomainError, DomainResult, ExpectedVersion, ShopId, UserId};
use stockledger_products::{BatchId, ProductId, StockUnit, UnitBalance};

use crate::movement::{MovementKind, OriginRef};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerEntryId(pub Uuid);

impl LedgerEntryId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LedgerEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for LedgerEntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A movement that has been decided but not yet written.
///
/// `expected` pins the unit's ledger version observed when the movement was
/// validated; the store rejects the posting if another entry landed first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPosting {
    pub unit: StockUnit,
    pub kind: MovementKind,
    pub quantity: i64,
    pub reason: Option<String>,
    pub origin: Option<OriginRef>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
    pub expected: ExpectedVersion,
}

impl LedgerPosting {
    pub fn new(
        unit: StockUnit,
        kind: MovementKind,
        quantity: i64,
        actor: Option<UserId>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            unit,
            kind,
            quantity,
            reason: None,
            origin: None,
            actor,
            occurred_at,
            expected: ExpectedVersion::Any,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_origin(mut self, origin: OriginRef) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn expecting(mut self, expected: ExpectedVersion) -> Self {
        self.expected = expected;
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        self.kind.check_sign(self.quantity)?;
        if self.kind == MovementKind::Adjustment
            && self.reason.as_deref().is_none_or(|r| r.trim().is_empty())
        {
            return Err(DomainError::validation("an adjustment requires a reason"));
        }
        Ok(())
    }

    /// Turn the posting into an entry on top of the unit's `prior` balance.
    pub fn into_entry(self, id: LedgerEntryId, prior: UnitBalance) -> LedgerEntry {
        let after = prior.apply(self.quantity);
        LedgerEntry {
            id,
            shop_id: self.unit.shop_id,
            product_id: self.unit.product_id,
            batch_id: self.unit.batch_id,
            kind: self.kind,
            quantity: self.quantity,
            resulting_balance: after.quantity,
            sequence: after.version,
            reason: self.reason.map(|r| r.trim().to_string()),
            origin: self.origin,
            created_by: self.actor,
            occurred_at: self.occurred_at,
        }
    }
}

/// An immutable, signed quantity movement with the running balance stamped in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub shop_id: ShopId,
    pub product_id: ProductId,
    pub batch_id: Option<BatchId>,
    pub kind: MovementKind,
    pub quantity: i64,
    pub resulting_balance: i64,
    /// Position of the entry in its unit's stream (1-based).
    pub sequence: u64,
    pub reason: Option<String>,
    pub origin: Option<OriginRef>,
    pub created_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn unit(&self) -> StockUnit {
        StockUnit {
            shop_id: self.shop_id,
            product_id: self.product_id,
            batch_id: self.batch_id,
        }
    }

    pub fn balance(&self) -> UnitBalance {
        UnitBalance {
            quantity: self.resulting_balance,
            version: self.sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockledger_core::AggregateId;

    fn unit() -> StockUnit {
        StockUnit::product(ShopId::new(), ProductId::new(AggregateId::new()))
    }

    #[test]
    fn adjustment_needs_reason() {
        let posting = LedgerPosting::new(unit(), MovementKind::Adjustment, -2, None, Utc::now());
        assert!(matches!(posting.validate(), Err(DomainError::Validation(_))));
        assert!(posting.clone().with_reason("   ").validate().is_err());
        assert!(posting.with_reason("damaged in transit").validate().is_ok());
    }

    #[test]
    fn entry_stamps_resulting_balance() {
        let posting = LedgerPosting::new(unit(), MovementKind::Sale, -10, None, Utc::now());
        let entry = posting.into_entry(
            LedgerEntryId::new(),
            UnitBalance {
                quantity: 100,
                version: 4,
            },
        );
        assert_eq!(entry.resulting_balance, 90);
        assert_eq!(entry.sequence, 5);
        assert_eq!(entry.balance(), UnitBalance { quantity: 90, version: 5 });
    }

    #[test]
    fn entry_serializes_kind_in_snake_case() {
        let posting = LedgerPosting::new(unit(), MovementKind::TransferOut, -1, None, Utc::now());
        let entry = posting.into_entry(LedgerEntryId::new(), UnitBalance::default());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "transfer_out");
        assert_eq!(json["resulting_balance"], -1);
    }
}
