use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ShopContext;

pub fn router() -> Router {
    Router::new().route("/", get(list_entries))
}

/// Filtered, paginated ledger history of the caller's shop.
pub async fn list_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Query(query): Query<dto::LedgerQuery>,
) -> axum::response::Response {
    let filter = match query.to_filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    match services.engine().history(shop.shop_id(), &filter, query.limit, query.offset) {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
