use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use crate::app::dto;
use crate::app::services::AppServices;
use crate::context::{ActorContext, ShopContext};

pub fn router() -> Router {
    Router::new().route("/", post(transfer_stock))
}

/// Move stock from the caller's shop to others.
///
/// Tuples are applied independently; the response lists each outcome in
/// submission order. The status is 200 only when every tuple succeeded.
pub async fn transfer_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::BulkTransferRequest>,
) -> axum::response::Response {
    let requests = body.into_requests(shop.shop_id());
    let outcomes = services.engine().transfer_bulk(requests, actor.actor());

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    let status = if failed == 0 { StatusCode::OK } else { StatusCode::MULTI_STATUS };
    (
        status,
        Json(serde_json::json!({
            "items": outcomes,
            "failed": failed,
        })),
    )
        .into_response()
}
