//! Catalog domain module: products, expiring batches and stock units.
//!
//! Pure, deterministic rules (no IO). Quantities on products and batches are
//! materialized caches owned by the ledger; nothing in this crate authors them
//! except [`Product::materialize`] / [`Batch::materialize`], which the ledger
//! store calls while committing an entry.

pub mod batch;
pub mod fifo;
pub mod product;
pub mod snapshot;
pub mod unit;

pub use batch::{Batch, BatchId, BatchStatus, CreateBatch};
pub use fifo::{fifo_candidates, total_on_hand};
pub use product::{CreateProduct, Product, ProductId, ProductStatus, Tracking, UpdateProductDetails};
pub use snapshot::{BatchSnapshot, ProductSnapshot};
pub use unit::{StockUnit, UnitBalance, describe_unit, resolve_unit};
