use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use stockledger_infra::services::Adjustment;
use stockledger_products::StockUnit;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{ActorContext, ShopContext};

pub fn router() -> Router {
    Router::new()
        .route("/units/:product_id", get(unit_stock))
        .route("/low", get(low_stock))
        .route("/alerts", get(stock_alerts))
        .route("/adjustments", post(adjust_stock))
        .route("/reconcile", post(reconcile_unit))
        .route("/rematerialize", post(rematerialize_unit))
}

fn unit_of(shop: ShopContext, body: &dto::UnitRequest) -> StockUnit {
    match body.batch_id {
        Some(batch_id) => StockUnit::batch(shop.shop_id(), body.product_id, batch_id),
        None => StockUnit::product(shop.shop_id(), body.product_id),
    }
}

pub async fn unit_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Path(product_id): Path<String>,
    Query(query): Query<dto::UnitQuery>,
) -> axum::response::Response {
    let product_id = match dto::parse_product_id(&product_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let batch_id = match dto::parse_optional_batch_id(query.batch_id.as_deref()) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let unit = unit_of(shop, &dto::UnitRequest { product_id, batch_id });

    let engine = services.engine();
    let below_alert = match engine.is_below_alert(unit) {
        Ok(v) => v,
        Err(e) => return errors::engine_error_to_response(e),
    };
    match engine.unit_balance(unit) {
        Ok(balance) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "unit": unit,
                "quantity": balance.quantity,
                "version": balance.version,
                "below_alert": below_alert,
            })),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
) -> axum::response::Response {
    match services.engine().low_stock(shop.shop_id()) {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Alerts as seen by the projection; may trail the ledger briefly.
pub async fn stock_alerts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
) -> axum::response::Response {
    let items = services.alerts(shop.shop_id());
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<Adjustment>,
) -> axum::response::Response {
    match services.engine().adjust(shop.shop_id(), body, actor.actor()) {
        Ok(entry) => (StatusCode::CREATED, Json(entry)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn reconcile_unit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Json(body): Json<dto::UnitRequest>,
) -> axum::response::Response {
    let unit = unit_of(shop, &body);
    match services.engine().reconcile(unit) {
        Ok(reconciliation) => {
            let consistent = reconciliation.is_consistent();
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "reconciliation": reconciliation,
                    "consistent": consistent,
                })),
            )
                .into_response()
        }
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn rematerialize_unit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Json(body): Json<dto::UnitRequest>,
) -> axum::response::Response {
    let unit = unit_of(shop, &body);
    match services.engine().rematerialize(unit) {
        Ok(reconciliation) => (StatusCode::OK, Json(reconciliation)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
