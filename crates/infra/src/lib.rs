//! Infrastructure layer: stores, workflows, read models and configuration.
//!
//! Domain crates decide; this crate reads the current state, asks them, and
//! commits the outcome atomically through a [`store::InventoryStore`].

pub mod config;
pub mod error;
pub mod projections;
pub mod read_model;
pub mod services;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use services::InventoryEngine;
