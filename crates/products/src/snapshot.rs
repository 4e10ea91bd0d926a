//! Point-in-time copies of catalog records embedded in order and expense lines.
//!
//! Snapshots are immutable once captured; later catalog edits never rewrite them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::ValueObject;

use crate::batch::BatchId;
use crate::product::ProductId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub name: String,
    pub barcode: Option<String>,
    pub cost_price: u64,
    pub selling_price: u64,
    pub tracks_inventory: bool,
    pub tracks_expiry: bool,
    pub stock_alert_threshold: i64,
    pub quantity: i64,
}

impl ValueObject for ProductSnapshot {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSnapshot {
    pub batch_id: BatchId,
    pub batch_number: String,
    pub expiry_date: DateTime<Utc>,
    pub stock_alert_threshold: i64,
    pub quantity: i64,
}

impl ValueObject for BatchSnapshot {}
