//! Gateway-agnostic webhook processing.
//!
//! Each provider route delegates here with its own acknowledgement
//! vocabulary. The pipeline is: size check, verify, normalize, apply, audit.
//! Every callback produces exactly one audit entry; only a store failure
//! returns a non-2xx for a verified event, because that is the one case
//! where we want the gateway to redeliver.

use axum::http::{HeaderMap, StatusCode};
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;

use crate::audit::WebhookAuditBuilder;
use crate::db::AppState;
use crate::engine::{self, Transition};
use crate::gateways::{VerifyError, MAX_WEBHOOK_BODY};
use crate::models::{AuditOutcome, Gateway, Normalized};

/// Response tuple returned to the gateway.
pub type WebhookResult = (StatusCode, &'static str);

/// Provider-specific acknowledgement bodies. Gateways are picky about what
/// counts as "received": Alipay wants the literal string `success`, WeChat
/// wants a JSON code, Stripe only looks at the status code.
pub struct Ack {
    pub ok: &'static str,
    pub rejected: &'static str,
    pub error: &'static str,
}

/// One audit entry per callback, whatever its fate. Holds its own audit DB
/// connection so a main-pool failure cannot silence the trail.
struct Audit<'a> {
    conn: Option<PooledConnection<SqliteConnectionManager>>,
    enabled: bool,
    headers: &'a HeaderMap,
    gateway: Gateway,
}

impl<'a> Audit<'a> {
    fn new(state: &AppState, headers: &'a HeaderMap, gateway: Gateway) -> Self {
        let conn = match state.audit.get() {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::error!(%gateway, "Failed to get audit DB connection: {}", e);
                None
            }
        };
        Self {
            conn,
            enabled: state.audit_log_enabled,
            headers,
            gateway,
        }
    }

    fn record(
        &self,
        outcome: AuditOutcome,
        raw_type: Option<&str>,
        canonical_event: Option<&str>,
        payment: Option<(&str, Option<&str>)>,
        context: Option<serde_json::Value>,
    ) {
        let Some(conn) = &self.conn else {
            return;
        };
        let mut builder =
            WebhookAuditBuilder::new(conn, self.enabled, self.headers, self.gateway.as_str())
                .outcome(outcome);
        if let Some(raw_type) = raw_type {
            builder = builder.raw_type(raw_type);
        }
        if let Some(event) = canonical_event {
            builder = builder.canonical_event(event);
        }
        if let Some((payment_id, order_id)) = payment {
            builder = builder.payment(payment_id, order_id);
        }
        if let Some(context) = context {
            builder = builder.context(context);
        }
        builder.save();
    }

    fn rejected(&self, reason: &str) {
        self.record(
            AuditOutcome::Rejected,
            None,
            None,
            None,
            Some(serde_json::json!({ "reason": reason })),
        );
    }
}

pub async fn process_webhook(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
    gateway: Gateway,
    ack: Ack,
) -> WebhookResult {
    let audit = Audit::new(state, headers, gateway);

    if body.len() > MAX_WEBHOOK_BODY {
        tracing::warn!(%gateway, size = body.len(), "Webhook body too large");
        audit.rejected("body too large");
        return (StatusCode::PAYLOAD_TOO_LARGE, ack.rejected);
    }

    let client = match state.gateways.get(gateway) {
        Some(c) => c,
        None => {
            audit.rejected("gateway not configured");
            return (StatusCode::SERVICE_UNAVAILABLE, ack.error);
        }
    };

    let payload = match client.verify(headers, body) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(%gateway, "Webhook rejected: {}", e);
            audit.rejected(&e.to_string());
            // Authentication failures are 401, structural garbage is 400.
            let status = match e {
                VerifyError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
                VerifyError::Malformed(_) => StatusCode::BAD_REQUEST,
                VerifyError::MissingHeader(_)
                | VerifyError::StaleTimestamp
                | VerifyError::Mismatch
                | VerifyError::Decryption => StatusCode::UNAUTHORIZED,
            };
            return (status, ack.rejected);
        }
    };

    let evt = match client.normalize(&payload) {
        Ok(Normalized::Event(evt)) => evt,
        Ok(Normalized::Ignored { raw_type }) => {
            tracing::debug!(%gateway, raw_type, "Webhook event ignored");
            audit.record(AuditOutcome::Ignored, Some(&raw_type), None, None, None);
            return (StatusCode::OK, ack.ok);
        }
        Err(e) => {
            tracing::warn!(%gateway, "Webhook payload unusable: {}", e);
            audit.rejected(&e.to_string());
            return (StatusCode::BAD_REQUEST, ack.rejected);
        }
    };
    let canonical = evt.event.as_str();

    let mut conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(%gateway, "Failed to get DB connection: {}", e);
            audit.record(
                AuditOutcome::Error,
                Some(&evt.raw_type),
                Some(canonical),
                None,
                None,
            );
            return (StatusCode::INTERNAL_SERVER_ERROR, ack.error);
        }
    };

    match engine::apply_event(&mut conn, &evt) {
        Ok(Transition::Applied {
            payment_id,
            order_id,
            event,
            order_status,
            invoice_issued,
        }) => {
            tracing::info!(
                %gateway,
                %payment_id,
                %order_id,
                event = %event,
                order_status = %order_status,
                invoice_issued,
                "Webhook applied"
            );
            audit.record(
                AuditOutcome::Accepted,
                Some(&evt.raw_type),
                Some(canonical),
                Some((&payment_id, Some(&order_id))),
                Some(serde_json::json!({
                    "order_status": order_status.as_str(),
                    "invoice_issued": invoice_issued,
                })),
            );
            (StatusCode::OK, ack.ok)
        }
        Ok(Transition::Duplicate { payment_id }) => {
            tracing::debug!(%gateway, %payment_id, "Duplicate webhook delivery");
            audit.record(
                AuditOutcome::Duplicate,
                Some(&evt.raw_type),
                Some(canonical),
                Some((&payment_id, None)),
                None,
            );
            (StatusCode::OK, ack.ok)
        }
        Ok(Transition::OutOfOrder {
            payment_id,
            current_status,
        }) => {
            // Money may have moved on the provider side while we show a
            // terminal failure. Needs human reconciliation.
            tracing::warn!(
                %gateway,
                %payment_id,
                current_status = %current_status,
                "Success notification for terminally settled payment"
            );
            audit.record(
                AuditOutcome::Duplicate,
                Some(&evt.raw_type),
                Some(canonical),
                Some((&payment_id, None)),
                Some(serde_json::json!({
                    "out_of_order": true,
                    "current_status": current_status.as_str(),
                })),
            );
            (StatusCode::OK, ack.ok)
        }
        Ok(Transition::Orphan) => {
            tracing::warn!(
                %gateway,
                merchant_ref = %evt.merchant_ref,
                "Webhook references unknown payment"
            );
            audit.record(
                AuditOutcome::Orphan,
                Some(&evt.raw_type),
                Some(canonical),
                None,
                Some(serde_json::json!({ "merchant_ref": evt.merchant_ref })),
            );
            (StatusCode::OK, ack.ok)
        }
        Err(e) => {
            tracing::error!(%gateway, "Webhook transition failed: {}", e);
            audit.record(
                AuditOutcome::Error,
                Some(&evt.raw_type),
                Some(canonical),
                None,
                Some(serde_json::json!({ "error": e.to_string() })),
            );
            (StatusCode::INTERNAL_SERVER_ERROR, ack.error)
        }
    }
}
