use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A purchase intent for one digital feature.
///
/// Orders are financial records: they are created when the buyer confirms a
/// purchase, mutated only by the transition engine, and never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub buyer_id: String,
    pub feature_id: String,

    // Amounts (cents)
    pub amount_cents: i64,
    pub discount_cents: i64,
    /// amount - discount, always >= 0.
    pub final_cents: i64,
    pub currency: String,

    pub status: OrderStatus,
    pub paid_at: Option<i64>,

    // Billing identity snapshotted onto the invoice at issuance time
    pub billing_name: Option<String>,
    pub billing_email: Option<String>,

    /// Feature-specific metadata blob (JSON).
    pub metadata: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

/// Data required to create a new order.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    pub buyer_id: String,
    pub feature_id: String,
    pub amount_cents: i64,
    pub discount_cents: i64,
    pub currency: String,
    pub billing_name: Option<String>,
    pub billing_email: Option<String>,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            _ => Err(()),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
