use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Append-only record of an inbound webhook and its disposition.
///
/// Written for every callback regardless of verification outcome; entries may
/// reference unknown orders (forged callbacks), so correlation is by value,
/// not foreign key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAuditEntry {
    pub id: String,
    pub timestamp: i64,
    pub gateway: String,
    /// The provider's own event/state name, when parseable.
    pub raw_type: Option<String>,
    pub canonical_event: Option<String>,
    pub order_id: Option<String>,
    pub payment_id: Option<String>,
    pub outcome: AuditOutcome,
    /// Free-form context (JSON).
    pub context: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// Verified and a state transition was applied.
    Accepted,
    /// Verification or parsing failed; nothing ran.
    Rejected,
    /// Verified, but the payment had already left the edge's source set.
    Duplicate,
    /// Verified, but the event subtype is not one we act on.
    Ignored,
    /// Verified, but no payment matches the merchant reference.
    Orphan,
    /// A store failure aborted the transition; the gateway will redeliver.
    Error,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Duplicate => "duplicate",
            Self::Ignored => "ignored",
            Self::Orphan => "orphan",
            Self::Error => "error",
        }
    }
}

impl FromStr for AuditOutcome {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "duplicate" => Ok(Self::Duplicate),
            "ignored" => Ok(Self::Ignored),
            "orphan" => Ok(Self::Orphan),
            "error" => Ok(Self::Error),
            _ => Err(()),
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
