use axum::{
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::id::EntityType;
use crate::models::{CreateOrder, CreatePayment, Gateway, Order};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub feature_id: String,
    pub amount_cents: i64,
    #[serde(default)]
    pub discount_cents: i64,
    pub currency: String,
    pub gateway: Gateway,
    pub billing_name: Option<String>,
    pub billing_email: Option<String>,
    pub metadata: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order: Order,
    pub payment_id: String,
    /// Where to send the buyer: hosted page URL for Stripe, gateway
    /// redirect for Alipay, QR code payload for WeChat.
    pub redirect_url: String,
}

fn buyer_id(headers: &HeaderMap) -> Result<String> {
    headers
        .get("x-buyer-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| AppError::BadRequest("Missing x-buyer-id header".to_string()))
}

/// Create an order and its first payment attempt, and hand back the
/// provider redirect.
///
/// The pre-generated payment id is sent to the provider as the merchant
/// reference before the payment row exists; the row is only inserted once
/// the provider accepted the checkout, so a gateway failure leaves a
/// pending order with no attempt (retryable).
pub async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> Result<impl IntoResponse> {
    let buyer_id = buyer_id(&headers)?;

    if req.amount_cents <= 0 {
        return Err(AppError::BadRequest("amount_cents must be positive".to_string()));
    }
    // No gateway accepts a zero-amount charge; the final amount must stay
    // positive after the discount.
    if req.discount_cents < 0 || req.amount_cents - req.discount_cents <= 0 {
        return Err(AppError::BadRequest(
            "final amount (amount_cents - discount_cents) must be positive".to_string(),
        ));
    }
    if req.currency.is_empty() {
        return Err(AppError::BadRequest("currency is required".to_string()));
    }

    let client = state
        .gateways
        .get(req.gateway)
        .ok_or_else(|| AppError::GatewayUnavailable(format!("{} is not configured", req.gateway)))?;

    let order = {
        let conn = state.db.get()?;
        queries::create_order(
            &conn,
            &CreateOrder {
                buyer_id,
                feature_id: req.feature_id,
                amount_cents: req.amount_cents,
                discount_cents: req.discount_cents,
                currency: req.currency,
                billing_name: req.billing_name,
                billing_email: req.billing_email,
                metadata: req.metadata,
            },
        )?
    };

    let payment_id = EntityType::Payment.gen_id();
    let checkout = client.create_checkout(&order, &payment_id).await?;

    let conn = state.db.get()?;
    queries::create_payment(
        &conn,
        &CreatePayment {
            id: payment_id.clone(),
            order_id: order.id.clone(),
            gateway: req.gateway,
            session_ref: checkout.session_ref,
            amount_cents: order.final_cents,
            currency: order.currency.clone(),
        },
    )?;

    tracing::info!(
        order_id = %order.id,
        payment_id = %payment_id,
        gateway = %req.gateway,
        amount_cents = order.final_cents,
        "Checkout created"
    );

    Ok(Json(CheckoutResponse {
        order,
        payment_id,
        redirect_url: checkout.redirect_url,
    }))
}
