//! Handler-level validation: requests that must be refused before any
//! gateway or database side effect

mod common;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use common::*;
use featuregate::error::AppError;
use featuregate::handlers::checkout::{create_checkout, CheckoutRequest};
use featuregate::handlers::orders::{get_order, retry_order, RetryRequest};

fn buyer_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-buyer-id", "buyer_test".parse().unwrap());
    headers
}

fn checkout_request(amount_cents: i64, discount_cents: i64) -> CheckoutRequest {
    CheckoutRequest {
        feature_id: "advanced-export".to_string(),
        amount_cents,
        discount_cents,
        currency: "usd".to_string(),
        gateway: Gateway::Stripe,
        billing_name: None,
        billing_email: None,
        metadata: None,
    }
}

#[tokio::test]
async fn test_checkout_requires_buyer_header() {
    let state = setup_test_state();

    let result = create_checkout(
        State(state.clone()),
        HeaderMap::new(),
        Json(checkout_request(999, 0)),
    )
    .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

/// A discount that consumes the whole amount leaves nothing to charge; no
/// gateway accepts that, so the order is never created.
#[tokio::test]
async fn test_checkout_rejects_zero_final_amount() {
    let state = setup_test_state();

    let result = create_checkout(
        State(state.clone()),
        buyer_headers(),
        Json(checkout_request(999, 999)),
    )
    .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let result = create_checkout(
        State(state.clone()),
        buyer_headers(),
        Json(checkout_request(999, 1500)),
    )
    .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let result = create_checkout(
        State(state.clone()),
        buyer_headers(),
        Json(checkout_request(999, -1)),
    )
    .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let conn = state.db.get().unwrap();
    assert_eq!(queries::count_orders(&conn).unwrap(), 0);
}

/// An order whose final amount is zero has nothing to charge; a retry must
/// be refused before reaching the gateway.
#[tokio::test]
async fn test_retry_rejects_unchargeable_order() {
    let state = setup_test_state();
    let order_id = {
        let conn = state.db.get().unwrap();
        create_test_order(&conn, 999, 999).id
    };

    let result = retry_order(
        State(state.clone()),
        Path(order_id),
        Json(RetryRequest {
            gateway: Gateway::Stripe,
        }),
    )
    .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

/// Ids that do not match the issued format are refused without a lookup.
#[tokio::test]
async fn test_order_lookup_rejects_malformed_id() {
    let state = setup_test_state();

    let result = get_order(State(state.clone()), Path("not-an-id".to_string())).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    // SQL metacharacters never reach the query either
    let result = get_order(
        State(state.clone()),
        Path("fg_ord_' OR '1'='1".to_string()),
    )
    .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    let result = retry_order(
        State(state.clone()),
        Path("fg_pay_0123".to_string()),
        Json(RetryRequest {
            gateway: Gateway::Stripe,
        }),
    )
    .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

/// A well-formed id that simply does not exist is a plain not-found.
#[tokio::test]
async fn test_order_lookup_unknown_id_not_found() {
    let state = setup_test_state();

    let result = get_order(
        State(state.clone()),
        Path("fg_ord_ffffffffffffffffffffffffffffffff".to_string()),
    )
    .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}
