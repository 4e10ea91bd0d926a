//! Shop-isolated read model storage abstractions.

pub mod shop_store;

pub use shop_store::{InMemoryShopStore, ShopStore};
