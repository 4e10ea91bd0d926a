//! Engine-level error model.

use thiserror::Error;

use stockledger_core::DomainError;

use crate::store::StoreError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Error returned by every engine operation.
///
/// One variant per caller-visible failure category; domain and store errors
/// are folded into it so that callers match on a single taxonomy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Referenced product, batch, document or shop is absent or inactive.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// Duplicate active batch number, duplicate id or a batch linked elsewhere.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient stock for {unit}: requested {requested}, available {available}")]
    InsufficientStock {
        unit: String,
        requested: i64,
        available: i64,
    },

    /// Structural immutability violated on a document update.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Optimistic concurrency retries were exhausted.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    #[error("store error: {0}")]
    Store(String),
}

impl EngineError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
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

    /// Stable machine-readable code, used by the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::Invariant(_) => "invariant_violation",
            Self::Concurrency(_) => "concurrency_conflict",
            Self::Store(_) => "store_error",
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::InvariantViolation(msg) => Self::Invariant(msg),
            DomainError::NotFound(msg) => Self::NotFound(msg),
            DomainError::Conflict(msg) => Self::Conflict(msg),
            DomainError::InsufficientStock {
                unit,
                requested,
                available,
            } => Self::InsufficientStock {
                unit,
                requested,
                available,
            },
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Concurrency(msg) => Self::Concurrency(msg),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::NotFound(msg) => Self::NotFound(msg),
            StoreError::Validation(msg) => Self::Validation(msg),
            StoreError::Domain(err) => err.into(),
            StoreError::Backend(msg) => Self::Store(msg),
        }
    }
}
