use rusqlite::Connection;

/// Initialize the main database schema (orders, payments, invoices).
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Orders (purchase intents - financial records, never deleted)
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            buyer_id TEXT NOT NULL,
            feature_id TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            discount_cents INTEGER NOT NULL DEFAULT 0,
            final_cents INTEGER NOT NULL CHECK (final_cents >= 0),
            currency TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'paid', 'failed', 'cancelled', 'refunded')),
            paid_at INTEGER,
            billing_name TEXT,
            billing_email TEXT,
            metadata TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_orders_buyer ON orders(buyer_id);
        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);

        -- Payments (settlement attempts - one non-superseded attempt per order)
        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES orders(id),
            gateway TEXT NOT NULL CHECK (gateway IN ('stripe', 'alipay', 'wechat')),
            session_ref TEXT,
            external_txn_id TEXT,
            amount_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'processing', 'success', 'failed', 'cancelled', 'refunded')),
            error_code TEXT,
            error_message TEXT,
            paid_at INTEGER,
            superseded INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_payments_order ON payments(order_id);
        CREATE INDEX IF NOT EXISTS idx_payments_external_txn ON payments(gateway, external_txn_id);
        -- Exactly one authoritative (non-superseded) attempt per order
        CREATE UNIQUE INDEX IF NOT EXISTS idx_payments_active ON payments(order_id) WHERE superseded = 0;

        -- Invoices (proof of completed sale - at most one per order)
        CREATE TABLE IF NOT EXISTS invoices (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL UNIQUE REFERENCES orders(id),
            amount_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            tax_cents INTEGER NOT NULL DEFAULT 0,
            billing_name TEXT,
            billing_email TEXT,
            status TEXT NOT NULL CHECK (status IN ('issued', 'void')),
            issued_at INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}

/// Initialize the audit log database schema (separate DB file).
/// Optimized for append-only workload with WAL mode.
pub fn init_audit_db(conn: &Connection) -> rusqlite::Result<()> {
    // WAL mode: writes are sequential appends, much faster for append-only workloads
    // synchronous=NORMAL: safe with WAL, faster than FULL
    // journal_size_limit: prevent WAL from growing indefinitely
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 1000;
        PRAGMA journal_size_limit = 67108864;

        CREATE TABLE IF NOT EXISTS webhook_audit (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            gateway TEXT NOT NULL,
            raw_type TEXT,
            canonical_event TEXT,
            order_id TEXT,                -- correlation by value, not FK: forged
            payment_id TEXT,              -- callbacks reference unknown orders
            outcome TEXT NOT NULL CHECK (outcome IN ('accepted', 'rejected', 'duplicate', 'ignored', 'orphan', 'error')),
            context TEXT,
            ip_address TEXT,
            user_agent TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_audit_timestamp ON webhook_audit(timestamp);
        CREATE INDEX IF NOT EXISTS idx_webhook_audit_payment ON webhook_audit(payment_id);
        CREATE INDEX IF NOT EXISTS idx_webhook_audit_outcome ON webhook_audit(outcome, timestamp);
        "#,
    )?;
    Ok(())
}
