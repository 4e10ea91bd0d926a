//! Recomputing a unit's balance from its ledger.
//!
//! Maintenance path only; request flow reads the materialized cache.

use serde::{Deserialize, Serialize};

use stockledger_products::{StockUnit, UnitBalance};

use crate::ledger::LedgerEntry;

/// Fold entries (in sequence order) into the balance they imply.
pub fn replay_balance<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> UnitBalance {
    entries
        .into_iter()
        .fold(UnitBalance::default(), |acc, e| acc.apply(e.quantity))
}

/// Result of comparing a unit's cached balance with its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub unit: StockUnit,
    pub materialized: UnitBalance,
    pub ledger: UnitBalance,
}

impl Reconciliation {
    pub fn new<'a>(
        unit: StockUnit,
        materialized: UnitBalance,
        entries: impl IntoIterator<Item = &'a LedgerEntry>,
    ) -> Self {
        Self {
            unit,
            materialized,
            ledger: replay_balance(entries),
        }
    }

    pub fn drift(&self) -> i64 {
        self.materialized.quantity - self.ledger.quantity
    }

    pub fn is_consistent(&self) -> bool {
        self.materialized == self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerEntryId, LedgerPosting};
    use crate::movement::MovementKind;
    use chrono::Utc;
    use proptest::prelude::*;
    use stockledger_core::{AggregateId, ShopId};
    use stockledger_products::ProductId;

    fn kind_for(q: i64) -> MovementKind {
        if q > 0 { MovementKind::Purchase } else { MovementKind::Sale }
    }

    fn post_all(unit: StockUnit, quantities: &[i64]) -> (UnitBalance, Vec<LedgerEntry>) {
        let mut balance = UnitBalance::default();
        let mut entries = Vec::new();
        for q in quantities {
            let entry = LedgerPosting::new(unit, kind_for(*q), *q, None, Utc::now())
                .into_entry(LedgerEntryId::new(), balance);
            balance = entry.balance();
            entries.push(entry);
        }
        (balance, entries)
    }

    proptest! {
        #[test]
        fn materialized_balance_equals_ledger_sum(
            quantities in prop::collection::vec(prop_oneof![1i64..1_000, -1_000i64..-1], 0..64)
        ) {
            let unit = StockUnit::product(ShopId::new(), ProductId::new(AggregateId::new()));
            let (balance, entries) = post_all(unit, &quantities);

            prop_assert_eq!(balance.quantity, quantities.iter().sum::<i64>());
            prop_assert_eq!(balance.version, quantities.len() as u64);
            prop_assert_eq!(replay_balance(&entries), balance);
            if let Some(last) = entries.last() {
                prop_assert_eq!(last.resulting_balance, balance.quantity);
            }
        }
    }

    #[test]
    fn drift_is_reported() {
        let unit = StockUnit::product(ShopId::new(), ProductId::new(AggregateId::new()));
        let (_, entries) = post_all(unit, &[100, -10, 3]);
        let rec = Reconciliation::new(unit, UnitBalance { quantity: 95, version: 3 }, &entries);
        assert!(!rec.is_consistent());
        assert_eq!(rec.drift(), 2);
    }
}
