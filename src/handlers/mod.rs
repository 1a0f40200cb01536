pub mod checkout;
pub mod orders;
pub mod webhooks;

use axum::{routing::get, routing::post, Json, Router};

use crate::db::AppState;

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/checkout", post(checkout::create_checkout))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/retry", post(orders::retry_order))
        .merge(webhooks::router())
}
