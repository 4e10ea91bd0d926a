//! Sales orders domain module.
//!
//! Business rules for orders: frozen line structure, monotonic returns and the
//! stock movements a placed or updated order implies. Deterministic domain
//! logic only (no IO, no HTTP, no storage).

pub mod order;

pub use order::{
    ItemReturned, LineRef, LineState, LineUpdate, Order, OrderCommand, OrderEvent, OrderId,
    OrderLine, OrderPlaced, PlaceOrder, PlacedLine, ServiceId, UpdateOrder,
};
