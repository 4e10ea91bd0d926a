//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. The product and
/// batch snapshots frozen into order and expense lines are value objects: once
/// captured they are never re-derived from the live catalog record.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
