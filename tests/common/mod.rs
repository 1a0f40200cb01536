//! Test utilities and fixtures for Featuregate integration tests

#![allow(dead_code)]

use std::sync::Arc;

use rusqlite::Connection;

pub use featuregate::config::{AlipayConfig, StripeConfig, WechatConfig};
pub use featuregate::db::{queries, schema, AppState, DbPool};
pub use featuregate::engine;
pub use featuregate::gateways::{
    AlipayGateway, GatewayClient, GatewayRegistry, StripeGateway, WechatGateway,
};
pub use featuregate::id::EntityType;
pub use featuregate::models::*;

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const TEST_API_V3_KEY: &str = "0123456789abcdef0123456789abcdef";
pub const TEST_PLATFORM_SECRET: &str = "wechat_platform_secret";
pub const TEST_BASE_URL: &str = "http://localhost:3000";

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    schema::init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Create an in-memory test audit database with schema initialized
pub fn setup_test_audit_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory audit database");
    schema::init_audit_db(&conn).expect("Failed to initialize audit schema");
    conn
}

/// Single-connection in-memory pool, so every checkout keeps hitting the
/// same database
fn test_pool() -> DbPool {
    r2d2::Pool::builder()
        .max_size(1)
        .build(r2d2_sqlite::SqliteConnectionManager::memory())
        .expect("Failed to build test pool")
}

/// Full application state over in-memory pools, with Stripe and WeChat
/// configured and Alipay deliberately absent
pub fn setup_test_state() -> AppState {
    let db = test_pool();
    let audit = test_pool();
    {
        let conn = db.get().expect("Failed to get test connection");
        schema::init_db(&conn).expect("Failed to initialize schema");
    }
    {
        let conn = audit.get().expect("Failed to get test audit connection");
        schema::init_audit_db(&conn).expect("Failed to initialize audit schema");
    }

    AppState {
        db,
        audit,
        gateways: Arc::new(GatewayRegistry {
            stripe: Some(stripe_test_gateway()),
            alipay: None,
            wechat: Some(wechat_test_gateway()),
        }),
        base_url: TEST_BASE_URL.to_string(),
        audit_log_enabled: true,
    }
}

/// Create a pending test order
pub fn create_test_order(conn: &Connection, amount_cents: i64, discount_cents: i64) -> Order {
    queries::create_order(
        conn,
        &CreateOrder {
            buyer_id: "buyer_test".to_string(),
            feature_id: "advanced-export".to_string(),
            amount_cents,
            discount_cents,
            currency: "usd".to_string(),
            billing_name: Some("Test Buyer".to_string()),
            billing_email: Some("buyer@example.com".to_string()),
            metadata: None,
        },
    )
    .expect("Failed to create test order")
}

/// Create a pending payment attempt for an order
pub fn create_test_payment(conn: &Connection, order: &Order, gateway: Gateway) -> Payment {
    queries::create_payment(
        conn,
        &CreatePayment {
            id: EntityType::Payment.gen_id(),
            order_id: order.id.clone(),
            gateway,
            session_ref: match gateway {
                Gateway::Stripe => Some("cs_test_123".to_string()),
                _ => None,
            },
            amount_cents: order.final_cents,
            currency: order.currency.clone(),
        },
    )
    .expect("Failed to create test payment")
}

/// A verified, normalized event as the engine would receive it
pub fn test_event(gateway: Gateway, merchant_ref: &str, event: CanonicalEvent) -> GatewayEvent {
    GatewayEvent {
        gateway,
        merchant_ref: merchant_ref.to_string(),
        external_txn_id: Some("txn_external_123".to_string()),
        event,
        raw_type: "test_event".to_string(),
        error_code: None,
        error_message: None,
    }
}

pub fn stripe_test_gateway() -> StripeGateway {
    StripeGateway::new(
        StripeConfig {
            secret_key: "sk_test_xxx".to_string(),
            webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
        },
        TEST_BASE_URL.to_string(),
    )
}

pub fn wechat_test_gateway() -> WechatGateway {
    WechatGateway::new(
        WechatConfig {
            mch_id: "1900000001".to_string(),
            app_id: "wx_test_app".to_string(),
            platform_secret: TEST_PLATFORM_SECRET.to_string(),
            api_v3_key: TEST_API_V3_KEY.to_string(),
        },
        TEST_BASE_URL.to_string(),
    )
}

/// Compute a Stripe-style signature header for a payload
pub fn stripe_signature_header(payload: &[u8], secret: &str, timestamp: i64) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(signed_payload.as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

/// Compute a WeChat transport signature over timestamp, nonce and body
pub fn wechat_transport_signature(secret: &str, timestamp: i64, nonce: &str, body: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let message = format!("{}\n{}\n{}\n", timestamp, nonce, body);
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// AES-256-GCM encrypt a WeChat notification resource the way the platform
/// does, returning the base64 ciphertext
pub fn wechat_encrypt_resource(key: &str, nonce: &str, aad: &str, plaintext: &str) -> String {
    use aes_gcm::aead::{Aead, Payload};
    use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(nonce.as_bytes()),
            Payload {
                msg: plaintext.as_bytes(),
                aad: aad.as_bytes(),
            },
        )
        .expect("encryption failed");
    BASE64.encode(ciphertext)
}
