//! Webhook audit trail helpers.
//!
//! Every inbound callback gets exactly one audit entry, whatever its fate.
//! Audit writes go to a separate database and must never block webhook
//! processing: a failed write is logged and swallowed.

use axum::http::HeaderMap;
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{AuditOutcome, WebhookAuditEntry};

/// Extract client IP and user agent from request headers.
pub fn extract_request_info(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    (ip, user_agent)
}

/// Builder for webhook audit entries.
///
/// # Example
/// ```ignore
/// WebhookAuditBuilder::new(&audit_conn, state.audit_log_enabled, &headers, "stripe")
///     .raw_type("payment_intent.succeeded")
///     .canonical_event("payment_succeeded")
///     .payment(&payment_id, Some(&order_id))
///     .outcome(AuditOutcome::Accepted)
///     .save();
/// ```
pub struct WebhookAuditBuilder<'a> {
    conn: &'a Connection,
    enabled: bool,
    headers: &'a HeaderMap,
    gateway: &'a str,
    raw_type: Option<&'a str>,
    canonical_event: Option<&'a str>,
    order_id: Option<&'a str>,
    payment_id: Option<&'a str>,
    outcome: AuditOutcome,
    context: Option<serde_json::Value>,
}

impl<'a> WebhookAuditBuilder<'a> {
    pub fn new(
        conn: &'a Connection,
        enabled: bool,
        headers: &'a HeaderMap,
        gateway: &'a str,
    ) -> Self {
        Self {
            conn,
            enabled,
            headers,
            gateway,
            raw_type: None,
            canonical_event: None,
            order_id: None,
            payment_id: None,
            outcome: AuditOutcome::Rejected,
            context: None,
        }
    }

    /// The provider's own event or state name.
    pub fn raw_type(mut self, raw_type: &'a str) -> Self {
        self.raw_type = Some(raw_type);
        self
    }

    pub fn canonical_event(mut self, event: &'a str) -> Self {
        self.canonical_event = Some(event);
        self
    }

    /// Correlate the entry with the payment (and order) it touched.
    pub fn payment(mut self, payment_id: &'a str, order_id: Option<&'a str>) -> Self {
        self.payment_id = Some(payment_id);
        self.order_id = order_id;
        self
    }

    pub fn outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Free-form context JSON (rejection reasons, out-of-order flags).
    pub fn context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Write the entry. Failures are logged, never propagated: losing an
    /// audit row must not turn a processed webhook into a gateway retry.
    pub fn save(self) -> Option<WebhookAuditEntry> {
        let (ip, ua) = extract_request_info(self.headers);
        match queries::create_webhook_audit(
            self.conn,
            self.enabled,
            self.gateway,
            self.raw_type,
            self.canonical_event,
            self.order_id,
            self.payment_id,
            self.outcome,
            self.context.as_ref(),
            ip.as_deref(),
            ua.as_deref(),
        ) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::error!(gateway = self.gateway, "Failed to write webhook audit entry: {}", e);
                None
            }
        }
    }
}
