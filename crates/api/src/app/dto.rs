use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use stockledger_core::{AggregateId, ShopId};
use stockledger_infra::store::LedgerFilter;
use stockledger_inventory::{MovementKind, OriginKind, OriginRef, TransferRequest};
use stockledger_products::{BatchId, ProductId};
use stockledger_purchasing::ExpenseId;
use stockledger_sales::OrderId;

use crate::app::errors;

type Rejection = axum::response::Response;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LinkBatchesRequest {
    pub batch_ids: Vec<BatchId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UnitQuery {
    pub batch_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnitRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub batch_id: Option<BatchId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FifoQuery {
    /// RFC3339; defaults to now.
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LedgerQuery {
    pub product_id: Option<String>,
    pub batch_id: Option<String>,
    pub kind: Option<String>,
    pub origin_kind: Option<String>,
    pub origin_id: Option<Uuid>,
    pub occurred_after: Option<DateTime<Utc>>,
    pub occurred_before: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct TransferLine {
    pub to_shop: ShopId,
    pub product_id: ProductId,
    #[serde(default)]
    pub batch_id: Option<BatchId>,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct BulkTransferRequest {
    pub transfers: Vec<TransferLine>,
}

impl BulkTransferRequest {
    /// Every tuple leaves the caller's shop.
    pub fn into_requests(self, from_shop: ShopId) -> Vec<TransferRequest> {
        self.transfers
            .into_iter()
            .map(|t| TransferRequest {
                from_shop,
                to_shop: t.to_shop,
                product_id: t.product_id,
                batch_id: t.batch_id,
                quantity: t.quantity,
            })
            .collect()
    }
}

// -------------------------
// Parsing helpers
// -------------------------

fn parse_aggregate_id(kind: &'static str, s: &str) -> Result<AggregateId, Rejection> {
    s.parse::<AggregateId>()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {kind} id: {s}")))
}

pub fn parse_product_id(s: &str) -> Result<ProductId, Rejection> {
    parse_aggregate_id("product", s).map(ProductId::new)
}

pub fn parse_batch_id(s: &str) -> Result<BatchId, Rejection> {
    parse_aggregate_id("batch", s).map(BatchId::new)
}

pub fn parse_order_id(s: &str) -> Result<OrderId, Rejection> {
    parse_aggregate_id("order", s).map(OrderId::new)
}

pub fn parse_expense_id(s: &str) -> Result<ExpenseId, Rejection> {
    parse_aggregate_id("expense", s).map(ExpenseId::new)
}

pub fn parse_optional_batch_id(s: Option<&str>) -> Result<Option<BatchId>, Rejection> {
    s.filter(|v| !v.is_empty()).map(parse_batch_id).transpose()
}

fn parse_origin_kind(s: &str) -> Result<OriginKind, Rejection> {
    match s {
        "order" => Ok(OriginKind::Order),
        "expense" => Ok(OriginKind::Expense),
        "transfer" => Ok(OriginKind::Transfer),
        _ => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_origin_kind",
            "origin_kind must be one of: order, expense, transfer",
        )),
    }
}

impl LedgerQuery {
    pub fn to_filter(&self) -> Result<LedgerFilter, Rejection> {
        let kind = self
            .kind
            .as_deref()
            .map(|k| {
                k.parse::<MovementKind>()
                    .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_kind", e.to_string()))
            })
            .transpose()?;

        let origin = match (self.origin_kind.as_deref(), self.origin_id) {
            (Some(kind), Some(id)) => Some(OriginRef {
                kind: parse_origin_kind(kind)?,
                id,
            }),
            (None, None) => None,
            _ => {
                return Err(errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_origin",
                    "origin_kind and origin_id must be given together",
                ));
            }
        };

        Ok(LedgerFilter {
            product_id: self.product_id.as_deref().map(parse_product_id).transpose()?,
            batch_id: parse_optional_batch_id(self.batch_id.as_deref())?,
            kind,
            origin,
            occurred_after: self.occurred_after,
            occurred_before: self.occurred_before,
        })
    }
}
