pub mod common;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
    Router,
};

use crate::db::AppState;
use crate::models::Gateway;

use common::{process_webhook, Ack};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook/stripe", post(handle_stripe_webhook))
        .route("/webhook/alipay", post(handle_alipay_webhook))
        .route("/webhook/wechat", post(handle_wechat_webhook))
}

/// Stripe only inspects the status code; bodies are informational.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    process_webhook(
        &state,
        &headers,
        &body,
        Gateway::Stripe,
        Ack {
            ok: "ok",
            rejected: "signature verification failed",
            error: "internal error",
        },
    )
    .await
}

/// Alipay acknowledges with the literal body `success`; anything else is
/// treated as delivery failure and retried.
pub async fn handle_alipay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    process_webhook(
        &state,
        &headers,
        &body,
        Gateway::Alipay,
        Ack {
            ok: "success",
            rejected: "failure",
            error: "failure",
        },
    )
    .await
}

/// WeChat Pay expects a JSON acknowledgement code.
pub async fn handle_wechat_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    process_webhook(
        &state,
        &headers,
        &body,
        Gateway::Wechat,
        Ack {
            ok: r#"{"code":"SUCCESS"}"#,
            rejected: r#"{"code":"FAIL","message":"verification failed"}"#,
            error: r#"{"code":"FAIL","message":"internal error"}"#,
        },
    )
    .await
}
