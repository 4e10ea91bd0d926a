use axum::{Router, routing::get};

pub mod batches;
pub mod expenses;
pub mod ledger;
pub mod orders;
pub mod products;
pub mod stock;
pub mod system;
pub mod transfers;

/// Router for all shop-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/products", products::router())
        .nest("/batches", batches::router())
        .nest("/stock", stock::router())
        .nest("/ledger", ledger::router())
        .nest("/orders", orders::router())
        .nest("/expenses", expenses::router())
        .nest("/transfers", transfers::router())
}
