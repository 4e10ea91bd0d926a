use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use stockledger_core::{ShopId, UserId};

use crate::app::errors::json_error;
use crate::context::{ActorContext, ShopContext};

pub const SHOP_HEADER: &str = "x-shop-id";
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Derive the shop (required) and actor (optional) of a request from headers.
pub async fn context_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let shop_id: ShopId = required_header(req.headers(), SHOP_HEADER)?;
    let actor: Option<UserId> = optional_header(req.headers(), ACTOR_HEADER)?;

    req.extensions_mut().insert(ShopContext::new(shop_id));
    req.extensions_mut().insert(ActorContext::new(actor));

    Ok(next.run(req).await)
}

fn required_header<T: std::str::FromStr>(headers: &HeaderMap, name: &'static str) -> Result<T, Response> {
    optional_header(headers, name)?
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "missing_header", format!("{name} header is required")))
}

fn optional_header<T: std::str::FromStr>(headers: &HeaderMap, name: &'static str) -> Result<Option<T>, Response> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_header", format!("{name} is not valid text")))?
        .trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_header", format!("{name} is not a valid id")))
}
