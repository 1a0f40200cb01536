use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Gateway;

/// One attempt to settle an order through one gateway.
///
/// The payment id doubles as the merchant reference sent to the gateway at
/// checkout creation (Alipay/WeChat `out_trade_no`, Stripe metadata), so
/// verified webhook events correlate back to exactly this row. Gateway-issued
/// identifiers are stored separately as they become known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub gateway: Gateway,

    /// Gateway checkout/session id (Stripe `cs_xxx`), known at creation.
    pub session_ref: Option<String>,
    /// Gateway transaction id (Stripe `pi_xxx`, Alipay `trade_no`, WeChat
    /// `transaction_id`), learned from the success notification.
    pub external_txn_id: Option<String>,

    pub amount_cents: i64,
    pub currency: String,

    pub status: PaymentStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub paid_at: Option<i64>,

    /// Set when a retry replaced this attempt. Exactly one non-superseded
    /// payment exists per order (enforced by a partial unique index).
    pub superseded: bool,

    pub created_at: i64,
    pub updated_at: i64,
}

/// Data required to create a new payment attempt.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    /// Pre-generated id, sent to the gateway as the merchant reference
    /// before the row exists.
    pub id: String,
    pub order_id: String,
    pub gateway: Gateway,
    pub session_ref: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    /// Terminal statuses never change again, with the single exception of
    /// SUCCESS moving to REFUNDED.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Cancelled | Self::Refunded
        )
    }
}

impl FromStr for PaymentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            _ => Err(()),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
