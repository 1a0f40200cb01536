use std::fmt;

use serde::{Deserialize, Serialize};

use super::Gateway;

/// The gateway-agnostic event vocabulary applied by the transition engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalEvent {
    PaymentSucceeded,
    PaymentFailed,
    PaymentCancelled,
    PaymentRefunded,
}

impl CanonicalEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentSucceeded => "payment_succeeded",
            Self::PaymentFailed => "payment_failed",
            Self::PaymentCancelled => "payment_cancelled",
            Self::PaymentRefunded => "payment_refunded",
        }
    }
}

impl fmt::Display for CanonicalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A verified, normalized gateway notification.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub gateway: Gateway,
    /// Merchant reference recorded at checkout creation (the payment id we
    /// sent as `out_trade_no` / metadata). Correlation key; never an order id
    /// supplied by the caller.
    pub merchant_ref: String,
    /// Gateway transaction id carried by the notification, if any.
    pub external_txn_id: Option<String>,
    pub event: CanonicalEvent,
    /// The provider's own event/state name, kept for the audit trail.
    pub raw_type: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// Result of normalizing a verified payload.
#[derive(Debug)]
pub enum Normalized {
    Event(GatewayEvent),
    /// Recognized as harmless but irrelevant; acknowledged without a
    /// transition so the gateway stops retrying.
    Ignored { raw_type: String },
}
