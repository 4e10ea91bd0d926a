//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only. Every variant carries enough detail
/// to build a user-facing message; storage failures live in the infra crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (missing batch, non-future expiry, blank reason, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Structural immutability or state-machine rule violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Referenced shop/product/batch is absent or inactive.
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness or optimistic concurrency conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Requested quantity exceeds the available balance of a stock unit.
    #[error("insufficient stock for {unit}: requested {requested}, available {available}")]
    InsufficientStock {
        unit: String,
        requested: i64,
        available: i64,
    },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn insufficient_stock(unit: impl Into<String>, requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            unit: unit.into(),
            requested,
            available,
        }
    }

    /// Missing quantity for an `InsufficientStock` error.
    pub fn shortfall(&self) -> Option<i64> {
        match self {
            Self::InsufficientStock {
                requested,
                available,
                ..
            } => Some(*requested - (*available).max(0)),
            _ => None,
        }
    }
}
