//! All database access for orders, payments, invoices and the audit log.
//!
//! The transition helpers here are deliberately conditional: every status
//! change is a single `UPDATE ... WHERE status IN (...)` so that concurrent
//! or redelivered webhooks race to exactly one winner, and the loser observes
//! a no-op (`affected == 0`).

use rusqlite::{params, Connection};

use super::from_row::{
    query_all, query_one, INVOICE_COLS, ORDER_COLS, PAYMENT_COLS, WEBHOOK_AUDIT_COLS,
};
use crate::error::Result;
use crate::id::EntityType;
use crate::models::*;

/// Current Unix timestamp in seconds.
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

// ============ Orders ============

pub fn create_order(conn: &Connection, input: &CreateOrder) -> Result<Order> {
    let id = EntityType::Order.gen_id();
    let ts = now();
    let final_cents = input.amount_cents - input.discount_cents;

    conn.execute(
        "INSERT INTO orders (id, buyer_id, feature_id, amount_cents, discount_cents, final_cents, currency, status, billing_name, billing_email, metadata, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?9, ?10, ?11, ?11)",
        params![
            &id,
            &input.buyer_id,
            &input.feature_id,
            input.amount_cents,
            input.discount_cents,
            final_cents,
            &input.currency,
            &input.billing_name,
            &input.billing_email,
            &input.metadata,
            ts,
        ],
    )?;

    Ok(Order {
        id,
        buyer_id: input.buyer_id.clone(),
        feature_id: input.feature_id.clone(),
        amount_cents: input.amount_cents,
        discount_cents: input.discount_cents,
        final_cents,
        currency: input.currency.clone(),
        status: OrderStatus::Pending,
        paid_at: None,
        billing_name: input.billing_name.clone(),
        billing_email: input.billing_email.clone(),
        metadata: input.metadata.clone(),
        created_at: ts,
        updated_at: ts,
    })
}

pub fn get_order(conn: &Connection, id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLS),
        &[&id],
    )
}

pub fn count_orders(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))?;
    Ok(count)
}

/// Conditionally move an order to a new status.
///
/// Returns true if this call performed the transition; false if the order had
/// already left the source status (duplicate/out-of-order delivery).
pub fn try_transition_order(
    conn: &Connection,
    order_id: &str,
    from: OrderStatus,
    to: OrderStatus,
    paid_at: Option<i64>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET status = ?1, paid_at = COALESCE(?2, paid_at), updated_at = ?3
         WHERE id = ?4 AND status = ?5",
        params![to.as_str(), paid_at, now(), order_id, from.as_str()],
    )?;
    Ok(affected > 0)
}

// ============ Payments ============

pub fn create_payment(conn: &Connection, input: &CreatePayment) -> Result<Payment> {
    let ts = now();

    conn.execute(
        "INSERT INTO payments (id, order_id, gateway, session_ref, amount_cents, currency, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?7)",
        params![
            &input.id,
            &input.order_id,
            input.gateway.as_str(),
            &input.session_ref,
            input.amount_cents,
            &input.currency,
            ts,
        ],
    )?;

    Ok(Payment {
        id: input.id.clone(),
        order_id: input.order_id.clone(),
        gateway: input.gateway,
        session_ref: input.session_ref.clone(),
        external_txn_id: None,
        amount_cents: input.amount_cents,
        currency: input.currency.clone(),
        status: PaymentStatus::Pending,
        error_code: None,
        error_message: None,
        paid_at: None,
        superseded: false,
        created_at: ts,
        updated_at: ts,
    })
}

pub fn get_payment(conn: &Connection, id: &str) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!("SELECT {} FROM payments WHERE id = ?1", PAYMENT_COLS),
        &[&id],
    )
}

/// Locate the payment a verified gateway event refers to.
///
/// Correlation is strictly by the merchant reference recorded at checkout
/// creation AND the gateway the event was verified against - a forged or
/// reused order id can never reach an unrelated payment.
pub fn get_payment_for_event(
    conn: &Connection,
    gateway: Gateway,
    merchant_ref: &str,
) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payments WHERE id = ?1 AND gateway = ?2",
            PAYMENT_COLS
        ),
        &[&merchant_ref, &gateway.as_str()],
    )
}

/// The authoritative (non-superseded) attempt for an order, if any.
pub fn get_active_payment(conn: &Connection, order_id: &str) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payments WHERE order_id = ?1 AND superseded = 0",
            PAYMENT_COLS
        ),
        &[&order_id],
    )
}

/// Mark a terminal attempt as superseded so a retry can become authoritative.
pub fn supersede_payment(conn: &Connection, payment_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE payments SET superseded = 1, updated_at = ?1 WHERE id = ?2",
        params![now(), payment_id],
    )?;
    Ok(())
}

/// Conditionally move a payment to a new status (compare-and-swap on the
/// current status). This is the sole concurrency-safety mechanism for
/// webhook processing.
///
/// Returns true if this call won the transition; false if the row had
/// already left the source set.
pub fn try_transition_payment(
    conn: &Connection,
    payment_id: &str,
    from: &[PaymentStatus],
    to: PaymentStatus,
    external_txn_id: Option<&str>,
    paid_at: Option<i64>,
    error_code: Option<&str>,
    error_message: Option<&str>,
) -> Result<bool> {
    // Source statuses come from a static enum, so interpolation is safe.
    let from_set = from
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    let affected = conn.execute(
        &format!(
            "UPDATE payments SET status = ?1,
                    external_txn_id = COALESCE(?2, external_txn_id),
                    paid_at = COALESCE(?3, paid_at),
                    error_code = COALESCE(?4, error_code),
                    error_message = COALESCE(?5, error_message),
                    updated_at = ?6
             WHERE id = ?7 AND status IN ({})",
            from_set
        ),
        params![
            to.as_str(),
            external_txn_id,
            paid_at,
            error_code,
            error_message,
            now(),
            payment_id,
        ],
    )?;
    Ok(affected > 0)
}

// ============ Invoices ============

pub fn get_invoice_for_order(conn: &Connection, order_id: &str) -> Result<Option<Invoice>> {
    query_one(
        conn,
        &format!("SELECT {} FROM invoices WHERE order_id = ?1", INVOICE_COLS),
        &[&order_id],
    )
}

/// Insert an invoice for the order unless one already exists.
///
/// Uses INSERT OR IGNORE against the unique order_id index for atomicity -
/// two racing issuers produce exactly one row. Returns true if this call
/// created the invoice.
pub fn create_invoice_if_absent(conn: &Connection, order: &Order) -> Result<bool> {
    let id = EntityType::Invoice.gen_id();
    let affected = conn.execute(
        "INSERT OR IGNORE INTO invoices (id, order_id, amount_cents, currency, tax_cents, billing_name, billing_email, status, issued_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, 'issued', ?7)",
        params![
            &id,
            &order.id,
            order.final_cents,
            &order.currency,
            &order.billing_name,
            &order.billing_email,
            now(),
        ],
    )?;
    Ok(affected > 0)
}

// ============ Webhook Audit ============

#[allow(clippy::too_many_arguments)]
pub fn create_webhook_audit(
    conn: &Connection,
    enabled: bool,
    gateway: &str,
    raw_type: Option<&str>,
    canonical_event: Option<&str>,
    order_id: Option<&str>,
    payment_id: Option<&str>,
    outcome: AuditOutcome,
    context: Option<&serde_json::Value>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> Result<WebhookAuditEntry> {
    let id = EntityType::AuditEntry.gen_id();
    let timestamp = now();
    let context_str = context.map(|c| c.to_string());

    if enabled {
        conn.execute(
            "INSERT INTO webhook_audit (id, timestamp, gateway, raw_type, canonical_event, order_id, payment_id, outcome, context, ip_address, user_agent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                &id,
                timestamp,
                gateway,
                raw_type,
                canonical_event,
                order_id,
                payment_id,
                outcome.as_str(),
                &context_str,
                ip_address,
                user_agent,
            ],
        )?;
    }

    Ok(WebhookAuditEntry {
        id,
        timestamp,
        gateway: gateway.to_string(),
        raw_type: raw_type.map(String::from),
        canonical_event: canonical_event.map(String::from),
        order_id: order_id.map(String::from),
        payment_id: payment_id.map(String::from),
        outcome,
        context: context_str,
        ip_address: ip_address.map(String::from),
        user_agent: user_agent.map(String::from),
    })
}

/// Audit trail for one payment, newest first. Reconciliation tooling entry
/// point; forged callbacks that never resolved a payment are not returned.
pub fn list_webhook_audit_for_payment(
    conn: &Connection,
    payment_id: &str,
) -> Result<Vec<WebhookAuditEntry>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM webhook_audit WHERE payment_id = ?1 ORDER BY timestamp DESC",
            WEBHOOK_AUDIT_COLS
        ),
        &[&payment_id],
    )
}

/// Purge audit entries beyond the retention period (0 = never purge).
/// Returns the number of deleted records.
pub fn purge_old_webhook_audit(conn: &Connection, retention_days: i64) -> Result<usize> {
    if retention_days <= 0 {
        return Ok(0);
    }
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM webhook_audit WHERE timestamp < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}
