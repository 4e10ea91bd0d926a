//! Inventory ledger domain module.
//!
//! Signed quantity movements, the write-once ledger entries they become, and
//! the balance arithmetic over them. Pure domain logic (no IO, no storage).

pub mod events;
pub mod ledger;
pub mod movement;
pub mod replay;
pub mod transfer;

pub use events::{BatchCreated, BatchesLinked, EntryRecorded, InventoryEvent, ProductDeactivated};
pub use ledger::{LedgerEntry, LedgerEntryId, LedgerPosting};
pub use movement::{MovementKind, OriginKind, OriginRef};
pub use replay::{Reconciliation, replay_balance};
pub use transfer::{TransferRequest, transfer_postings};
