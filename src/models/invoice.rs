use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Proof of a completed sale. At most one exists per order; issuance is
/// idempotent (create-if-absent keyed on the unique order_id index).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub order_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub tax_cents: i64,
    /// Billing identity snapshotted at issuance time, so later profile edits
    /// never retroactively alter a historical invoice.
    pub billing_name: Option<String>,
    pub billing_email: Option<String>,
    pub status: InvoiceStatus,
    pub issued_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Issued,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issued => "issued",
            Self::Void => "void",
        }
    }
}

impl FromStr for InvoiceStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issued" => Ok(Self::Issued),
            "void" => Ok(Self::Void),
            _ => Err(()),
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
