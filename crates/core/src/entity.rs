//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Products and batches are entities: they are edited in place by the
/// catalog, while their quantities only ever move through the ledger.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
