//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupt data.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const ORDER_COLS: &str = "id, buyer_id, feature_id, amount_cents, discount_cents, final_cents, currency, status, paid_at, billing_name, billing_email, metadata, created_at, updated_at";

pub const PAYMENT_COLS: &str = "id, order_id, gateway, session_ref, external_txn_id, amount_cents, currency, status, error_code, error_message, paid_at, superseded, created_at, updated_at";

pub const INVOICE_COLS: &str = "id, order_id, amount_cents, currency, tax_cents, billing_name, billing_email, status, issued_at";

pub const WEBHOOK_AUDIT_COLS: &str = "id, timestamp, gateway, raw_type, canonical_event, order_id, payment_id, outcome, context, ip_address, user_agent";

// ============ FromRow Implementations ============

impl FromRow for Order {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Order {
            id: row.get(0)?,
            buyer_id: row.get(1)?,
            feature_id: row.get(2)?,
            amount_cents: row.get(3)?,
            discount_cents: row.get(4)?,
            final_cents: row.get(5)?,
            currency: row.get(6)?,
            status: parse_enum(row, 7, "status")?,
            paid_at: row.get(8)?,
            billing_name: row.get(9)?,
            billing_email: row.get(10)?,
            metadata: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

impl FromRow for Payment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Payment {
            id: row.get(0)?,
            order_id: row.get(1)?,
            gateway: parse_enum(row, 2, "gateway")?,
            session_ref: row.get(3)?,
            external_txn_id: row.get(4)?,
            amount_cents: row.get(5)?,
            currency: row.get(6)?,
            status: parse_enum(row, 7, "status")?,
            error_code: row.get(8)?,
            error_message: row.get(9)?,
            paid_at: row.get(10)?,
            superseded: row.get::<_, i32>(11)? != 0,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

impl FromRow for Invoice {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Invoice {
            id: row.get(0)?,
            order_id: row.get(1)?,
            amount_cents: row.get(2)?,
            currency: row.get(3)?,
            tax_cents: row.get(4)?,
            billing_name: row.get(5)?,
            billing_email: row.get(6)?,
            status: parse_enum(row, 7, "status")?,
            issued_at: row.get(8)?,
        })
    }
}

impl FromRow for WebhookAuditEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WebhookAuditEntry {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            gateway: row.get(2)?,
            raw_type: row.get(3)?,
            canonical_event: row.get(4)?,
            order_id: row.get(5)?,
            payment_id: row.get(6)?,
            outcome: parse_enum(row, 7, "outcome")?,
            context: row.get(8)?,
            ip_address: row.get(9)?,
            user_agent: row.get(10)?,
        })
    }
}
