use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use stockledger_infra::services::{RecordExpenseRequest, ReviseExpenseRequest};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{ActorContext, ShopContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(record_expense))
        .route("/:id", get(get_expense).put(revise_expense))
}

pub async fn record_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<RecordExpenseRequest>,
) -> axum::response::Response {
    match services.engine().record_expense(shop.shop_id(), body, actor.actor()) {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let expense_id = match dto::parse_expense_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine().expense(shop.shop_id(), expense_id) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Correct descriptions or costs; never posts stock.
pub async fn revise_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<ReviseExpenseRequest>,
) -> axum::response::Response {
    let expense_id = match dto::parse_expense_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine().revise_expense(shop.shop_id(), expense_id, body, actor.actor()) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
