use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockledger_core::{DomainError, DomainResult};

/// Why a quantity moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Purchase,
    Sale,
    Return,
    Adjustment,
    TransferOut,
    TransferIn,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Purchase => "purchase",
            MovementKind::Sale => "sale",
            MovementKind::Return => "return",
            MovementKind::Adjustment => "adjustment",
            MovementKind::TransferOut => "transfer_out",
            MovementKind::TransferIn => "transfer_in",
        }
    }

    /// Check that `quantity` carries the sign this kind requires.
    ///
    /// Inflows are strictly positive, outflows strictly negative, adjustments
    /// may go either way but never zero.
    pub fn check_sign(&self, quantity: i64) -> DomainResult<()> {
        if quantity == 0 {
            return Err(DomainError::validation("movement quantity cannot be zero"));
        }
        let ok = match self {
            MovementKind::Purchase | MovementKind::Return | MovementKind::TransferIn => quantity > 0,
            MovementKind::Sale | MovementKind::TransferOut => quantity < 0,
            MovementKind::Adjustment => true,
        };
        if ok {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "{} movement cannot have quantity {quantity}",
                self.as_str()
            )))
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(MovementKind::Purchase),
            "sale" => Ok(MovementKind::Sale),
            "return" => Ok(MovementKind::Return),
            "adjustment" => Ok(MovementKind::Adjustment),
            "transfer_out" => Ok(MovementKind::TransferOut),
            "transfer_in" => Ok(MovementKind::TransferIn),
            other => Err(DomainError::validation(format!("unknown movement kind: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    Order,
    Expense,
    Transfer,
}

/// Reference to the document that caused an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OriginRef {
    pub kind: OriginKind,
    pub id: Uuid,
}

impl OriginRef {
    pub fn order(id: impl Into<Uuid>) -> Self {
        Self {
            kind: OriginKind::Order,
            id: id.into(),
        }
    }

    pub fn expense(id: impl Into<Uuid>) -> Self {
        Self {
            kind: OriginKind::Expense,
            id: id.into(),
        }
    }

    pub fn transfer(id: Uuid) -> Self {
        Self {
            kind: OriginKind::Transfer,
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signs_per_kind() {
        assert!(MovementKind::Purchase.check_sign(3).is_ok());
        assert!(MovementKind::Purchase.check_sign(-3).is_err());
        assert!(MovementKind::Sale.check_sign(-1).is_ok());
        assert!(MovementKind::Sale.check_sign(1).is_err());
        assert!(MovementKind::TransferOut.check_sign(-2).is_ok());
        assert!(MovementKind::TransferIn.check_sign(2).is_ok());
        assert!(MovementKind::Adjustment.check_sign(-7).is_ok());
        assert!(MovementKind::Adjustment.check_sign(7).is_ok());
        assert!(matches!(
            MovementKind::Adjustment.check_sign(0),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn kind_parses_its_own_name() {
        for kind in [
            MovementKind::Purchase,
            MovementKind::Sale,
            MovementKind::Return,
            MovementKind::Adjustment,
            MovementKind::TransferOut,
            MovementKind::TransferIn,
        ] {
            assert_eq!(kind.as_str().parse::<MovementKind>().unwrap(), kind);
        }
        assert!("restock".parse::<MovementKind>().is_err());
    }
}
