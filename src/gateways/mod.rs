//! Payment gateway clients: checkout creation and webhook verification.
//!
//! Each provider implements [`GatewayClient`]. Verification is fail-closed:
//! any missing header, malformed field, stale timestamp or signature mismatch
//! rejects the callback before the body influences any state.

pub mod alipay;
pub mod stripe;
pub mod wechat;

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::models::{Gateway, Normalized, Order};

pub use alipay::AlipayGateway;
pub use stripe::StripeGateway;
pub use wechat::WechatGateway;

/// Maximum accepted webhook body, enforced before any verification work.
pub const MAX_WEBHOOK_BODY: usize = 256 * 1024;

/// Reject signed timestamps older than this (seconds). Limits replay window.
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 300;
/// Allow slight clock skew into the future (seconds).
pub const TIMESTAMP_FUTURE_TOLERANCE_SECS: i64 = 60;

/// Result of creating a hosted checkout with a provider.
#[derive(Debug, Clone)]
pub struct Checkout {
    /// Provider-side session identifier, when the provider assigns one
    /// at creation time (Stripe checkout sessions).
    pub session_ref: Option<String>,
    /// URL the buyer is redirected to in order to pay.
    pub redirect_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),
    #[error("malformed webhook payload: {0}")]
    Malformed(&'static str),
    #[error("timestamp outside tolerance")]
    StaleTimestamp,
    #[error("signature mismatch")]
    Mismatch,
    #[error("payload decryption failed")]
    Decryption,
    #[error("payload too large")]
    TooLarge,
}

/// A payment provider integration.
///
/// `verify` authenticates (and for encrypted providers, decrypts) a raw
/// callback and returns the trusted plaintext payload; `normalize` maps that
/// payload onto the canonical event vocabulary. The two are split so tests
/// can exercise normalization without real signatures.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    fn gateway(&self) -> Gateway;

    /// Create a hosted checkout for the order. `payment_id` is recorded
    /// provider-side as the merchant reference so later callbacks can be
    /// correlated back without trusting any other payload field.
    async fn create_checkout(
        &self,
        order: &Order,
        payment_id: &str,
    ) -> crate::error::Result<Checkout>;

    /// Authenticate a raw callback. Returns the trusted plaintext payload.
    fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<String, VerifyError>;

    /// Map a verified payload onto the canonical event vocabulary.
    fn normalize(&self, payload: &str) -> Result<Normalized, VerifyError>;
}

/// The set of configured gateways. A provider missing from the environment
/// simply is not routable; requests naming it get a clean 502.
#[derive(Default)]
pub struct GatewayRegistry {
    pub stripe: Option<StripeGateway>,
    pub alipay: Option<AlipayGateway>,
    pub wechat: Option<WechatGateway>,
}

impl GatewayRegistry {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            stripe: config
                .stripe
                .as_ref()
                .map(|c| StripeGateway::new(c.clone(), config.base_url.clone())),
            alipay: config
                .alipay
                .as_ref()
                .map(|c| AlipayGateway::new(c.clone(), config.base_url.clone())),
            wechat: config
                .wechat
                .as_ref()
                .map(|c| WechatGateway::new(c.clone(), config.base_url.clone())),
        }
    }

    pub fn get(&self, gateway: Gateway) -> Option<&dyn GatewayClient> {
        match gateway {
            Gateway::Stripe => self.stripe.as_ref().map(|g| g as &dyn GatewayClient),
            Gateway::Alipay => self.alipay.as_ref().map(|g| g as &dyn GatewayClient),
            Gateway::Wechat => self.wechat.as_ref().map(|g| g as &dyn GatewayClient),
        }
    }
}

/// Shared helper: enforce timestamp freshness for signed callbacks.
pub(crate) fn check_timestamp(signed_ts: i64, now: i64) -> Result<(), VerifyError> {
    if now - signed_ts > TIMESTAMP_TOLERANCE_SECS || signed_ts - now > TIMESTAMP_FUTURE_TOLERANCE_SECS
    {
        return Err(VerifyError::StaleTimestamp);
    }
    Ok(())
}
