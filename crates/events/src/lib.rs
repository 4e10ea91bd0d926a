//! Inventory notifications: event trait, envelopes and the pub/sub bus.
//!
//! The ledger is the source of truth. Events published here are post-commit
//! notifications for reporting consumers (alert read models, exports); losing
//! one never changes a balance.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
