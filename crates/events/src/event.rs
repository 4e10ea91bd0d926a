use chrono::{DateTime, Utc};

/// A domain-agnostic event.
///
/// Events are immutable facts about committed inventory changes. They are
/// versioned so consumers can evolve with the payload schema.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "inventory.entry.recorded").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the underlying change happened (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
