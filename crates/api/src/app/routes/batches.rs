use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use stockledger_infra::services::NewBatch;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{ActorContext, ShopContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_batch).get(list_batches))
        .route("/:id/deactivate", post(deactivate_batch))
}

pub async fn create_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<NewBatch>,
) -> axum::response::Response {
    match services.engine().create_batch(shop.shop_id(), body, actor.actor()) {
        Ok(batch) => (StatusCode::CREATED, Json(batch)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_batches(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
) -> axum::response::Response {
    match services.engine().batches(shop.shop_id()) {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn deactivate_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shop): Extension<ShopContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let batch_id = match dto::parse_batch_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine().deactivate_batch(shop.shop_id(), batch_id) {
        Ok(batch) => (StatusCode::OK, Json(batch)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
