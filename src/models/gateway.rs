use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The external payment gateways integrated with Featuregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gateway {
    Stripe,
    Alipay,
    Wechat,
}

impl Gateway {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Alipay => "alipay",
            Self::Wechat => "wechat",
        }
    }
}

impl FromStr for Gateway {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stripe" => Ok(Self::Stripe),
            "alipay" => Ok(Self::Alipay),
            "wechat" | "wechatpay" => Ok(Self::Wechat),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
