use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use super::{Checkout, GatewayClient, VerifyError};
use crate::config::AlipayConfig;
use crate::error::{AppError, Result};
use crate::models::{CanonicalEvent, Gateway, GatewayEvent, Normalized, Order};

const GATEWAY_URL: &str = "https://openapi.alipay.com/gateway.do";

#[derive(Clone)]
pub struct AlipayGateway {
    config: AlipayConfig,
    base_url: String,
}

impl AlipayGateway {
    pub fn new(config: AlipayConfig, base_url: String) -> Self {
        Self { config, base_url }
    }

    fn private_key(&self) -> Result<RsaPrivateKey> {
        let der = BASE64
            .decode(&self.config.private_key)
            .map_err(|e| AppError::Internal(format!("Invalid Alipay private key: {}", e)))?;
        RsaPrivateKey::from_pkcs8_der(&der)
            .map_err(|e| AppError::Internal(format!("Invalid Alipay private key: {}", e)))
    }

    fn platform_public_key(&self) -> Result<RsaPublicKey, VerifyError> {
        let der = BASE64
            .decode(&self.config.alipay_public_key)
            .map_err(|_| VerifyError::Malformed("platform public key"))?;
        RsaPublicKey::from_public_key_der(&der)
            .map_err(|_| VerifyError::Malformed("platform public key"))
    }
}

/// Build the canonical string Alipay signs: all parameters except `sign` and
/// `sign_type`, sorted by key, joined as `k=v&...` over the decoded values.
fn signature_base(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(k, _)| k.as_str() != "sign" && k.as_str() != "sign_type")
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Alipay amounts are decimal yuan strings ("9.99"), not cents.
fn format_amount(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

#[async_trait]
impl GatewayClient for AlipayGateway {
    fn gateway(&self) -> Gateway {
        Gateway::Alipay
    }

    /// Alipay page pay has no session-creation API call. The checkout is a
    /// signed redirect URL to the open platform gateway; the provider assigns
    /// its transaction id only in the async notification.
    async fn create_checkout(&self, order: &Order, payment_id: &str) -> Result<Checkout> {
        let biz_content = serde_json::json!({
            "out_trade_no": payment_id,
            "product_code": "FAST_INSTANT_TRADE_PAY",
            "total_amount": format_amount(order.final_cents),
            "subject": format!("Feature: {}", order.feature_id),
        })
        .to_string();

        let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let notify_url = format!("{}/webhook/alipay", self.base_url);
        let return_url = format!("{}/return/success?order={}", self.base_url, order.id);

        let mut params = BTreeMap::new();
        params.insert("app_id".to_string(), self.config.app_id.clone());
        params.insert("method".to_string(), "alipay.trade.page.pay".to_string());
        params.insert("charset".to_string(), "utf-8".to_string());
        params.insert("sign_type".to_string(), "RSA2".to_string());
        params.insert("timestamp".to_string(), timestamp);
        params.insert("version".to_string(), "1.0".to_string());
        params.insert("notify_url".to_string(), notify_url);
        params.insert("return_url".to_string(), return_url);
        params.insert("biz_content".to_string(), biz_content);

        let digest = Sha256::digest(signature_base(&params).as_bytes());
        let signature = self
            .private_key()?
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|e| AppError::Internal(format!("Alipay request signing failed: {}", e)))?;
        params.insert("sign".to_string(), BASE64.encode(signature));

        let query: Vec<(&str, &str)> = params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let query = serde_urlencoded::to_string(&query)
            .map_err(|e| AppError::Internal(format!("Alipay URL encoding failed: {}", e)))?;

        Ok(Checkout {
            session_ref: None,
            redirect_url: format!("{}?{}", GATEWAY_URL, query),
        })
    }

    fn verify(&self, _headers: &HeaderMap, body: &[u8]) -> Result<String, VerifyError> {
        let body_str =
            std::str::from_utf8(body).map_err(|_| VerifyError::Malformed("body not utf-8"))?;

        let params: BTreeMap<String, String> = serde_urlencoded::from_str(body_str)
            .map_err(|_| VerifyError::Malformed("form body"))?;

        let sign = params.get("sign").ok_or(VerifyError::Malformed("missing sign"))?;
        match params.get("sign_type").map(String::as_str) {
            Some("RSA2") => {}
            _ => return Err(VerifyError::Malformed("sign_type")),
        }

        let signature = BASE64
            .decode(sign)
            .map_err(|_| VerifyError::Malformed("sign encoding"))?;
        let digest = Sha256::digest(signature_base(&params).as_bytes());

        self.platform_public_key()?
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
            .map_err(|_| VerifyError::Mismatch)?;

        Ok(body_str.to_string())
    }

    fn normalize(&self, payload: &str) -> Result<Normalized, VerifyError> {
        let params: BTreeMap<String, String> =
            serde_urlencoded::from_str(payload).map_err(|_| VerifyError::Malformed("form body"))?;

        let raw_type = params
            .get("trade_status")
            .cloned()
            .ok_or(VerifyError::Malformed("missing trade_status"))?;

        let canonical = match raw_type.as_str() {
            // TRADE_FINISHED is the no-further-refunds terminal form of a
            // successful trade; both settle the payment.
            "TRADE_SUCCESS" | "TRADE_FINISHED" => CanonicalEvent::PaymentSucceeded,
            // A closed trade that carries a refund amount was refunded after
            // settlement; a plain close means the buyer never paid.
            "TRADE_CLOSED" if params.contains_key("refund_fee") => {
                CanonicalEvent::PaymentRefunded
            }
            "TRADE_CLOSED" => CanonicalEvent::PaymentCancelled,
            _ => return Ok(Normalized::Ignored { raw_type }),
        };

        let merchant_ref = params
            .get("out_trade_no")
            .cloned()
            .ok_or(VerifyError::Malformed("missing out_trade_no"))?;

        Ok(Normalized::Event(GatewayEvent {
            gateway: Gateway::Alipay,
            merchant_ref,
            external_txn_id: params.get("trade_no").cloned(),
            event: canonical,
            raw_type,
            error_code: None,
            error_message: None,
        }))
    }
}
