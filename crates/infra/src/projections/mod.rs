//! Projection implementations (read model builders).
//!
//! Projections consume published envelopes and build query-optimized read
//! models. They are rebuildable, shop-isolated and idempotent under
//! at-least-once delivery. The ledger stays authoritative: a projection that
//! falls behind never affects a balance.

pub mod stock_alerts;

pub use stock_alerts::{StockAlert, StockAlertProjection, StockAlertProjectionError};
