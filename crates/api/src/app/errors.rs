use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockledger_infra::EngineError;

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    let code = err.code();
    match err {
        EngineError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, code, msg),
        EngineError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, code, msg),
        EngineError::Conflict(msg) | EngineError::Concurrency(msg) => json_error(StatusCode::CONFLICT, code, msg),
        EngineError::InsufficientStock {
            ref unit,
            requested,
            available,
        } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": code,
                "message": err.to_string(),
                "unit": unit,
                "requested": requested,
                "available": available,
                "shortfall": err.shortfall(),
            })),
        )
            .into_response(),
        EngineError::Invariant(msg) => json_error(StatusCode::UNPROCESSABLE_ENTITY, code, msg),
        EngineError::Store(msg) => {
            tracing::error!("store failure: {msg}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, code, msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
