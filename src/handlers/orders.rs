use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, OptionExt, Result};
use crate::id::{is_valid_prefixed_id, EntityType};
use crate::models::{CreatePayment, Gateway, Invoice, Order, OrderStatus, Payment};

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    /// The authoritative (non-superseded) payment attempt, if one exists.
    pub payment: Option<Payment>,
    pub invoice: Option<Invoice>,
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    // Reject garbage ids before touching the database
    if !is_valid_prefixed_id(&id) {
        return Err(AppError::NotFound("order".to_string()));
    }

    let conn = state.db.get()?;
    let order = queries::get_order(&conn, &id)?.or_not_found("order")?;
    let payment = queries::get_active_payment(&conn, &order.id)?;
    let invoice = queries::get_invoice_for_order(&conn, &order.id)?;

    Ok(Json(OrderDetail {
        order,
        payment,
        invoice,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RetryRequest {
    pub gateway: Gateway,
}

/// Start a fresh payment attempt for an order whose current attempt died.
///
/// Only a pending order qualifies, and only once its active attempt is
/// terminal: a live attempt keeps exclusive claim on the order, and a paid
/// order has nothing left to settle. The old attempt is marked superseded in
/// the same transaction that admits the new one, so late webhooks for it can
/// still correlate but can no longer race the replacement for the order.
pub async fn retry_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RetryRequest>,
) -> Result<impl IntoResponse> {
    if !is_valid_prefixed_id(&id) {
        return Err(AppError::NotFound("order".to_string()));
    }

    let client = state
        .gateways
        .get(req.gateway)
        .ok_or_else(|| AppError::GatewayUnavailable(format!("{} is not configured", req.gateway)))?;

    let (order, previous) = {
        let conn = state.db.get()?;
        let order = queries::get_order(&conn, &id)?.or_not_found("order")?;
        if order.final_cents <= 0 {
            return Err(AppError::BadRequest(
                "order has no chargeable amount".to_string(),
            ));
        }
        if order.status != OrderStatus::Pending {
            return Err(AppError::Conflict(format!(
                "order is {}, only pending orders can be retried",
                order.status
            )));
        }

        let previous = queries::get_active_payment(&conn, &order.id)?;
        if let Some(p) = &previous {
            if !p.status.is_terminal() {
                return Err(AppError::Conflict(format!(
                    "active payment attempt is still {}",
                    p.status
                )));
            }
        }
        (order, previous)
    };

    let payment_id = EntityType::Payment.gen_id();
    let checkout = client.create_checkout(&order, &payment_id).await?;

    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    if let Some(p) = &previous {
        queries::supersede_payment(&tx, &p.id)?;
    }
    let payment = queries::create_payment(
        &tx,
        &CreatePayment {
            id: payment_id,
            order_id: order.id.clone(),
            gateway: req.gateway,
            session_ref: checkout.session_ref,
            amount_cents: order.final_cents,
            currency: order.currency.clone(),
        },
    )?;
    tx.commit()?;

    tracing::info!(
        order_id = %order.id,
        payment_id = %payment.id,
        gateway = %req.gateway,
        superseded = previous.as_ref().map(|p| p.id.as_str()).unwrap_or("none"),
        "Payment attempt retried"
    );

    Ok(Json(serde_json::json!({
        "order_id": order.id,
        "payment_id": payment.id,
        "redirect_url": checkout.redirect_url,
    })))
}
