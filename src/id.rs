//! Prefixed ID generation for Featuregate entities.
//!
//! All IDs use an `fg_` brand prefix to guarantee collision avoidance with
//! gateway-issued identifiers (Stripe's `cs_`/`pi_`, Alipay trade numbers,
//! WeChat transaction ids).
//!
//! Format: `fg_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// All known entity prefixes for validation.
const ALL_PREFIXES: &[&str] = &["fg_ord_", "fg_pay_", "fg_inv_", "fg_aud_"];

/// Validate that a string is a valid Featuregate prefixed ID.
///
/// Cheap check to reject garbage before hitting the database.
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Entity types that have prefixed IDs.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    Order,
    Payment,
    Invoice,
    AuditEntry,
}

impl EntityType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Order => "fg_ord",
            Self::Payment => "fg_pay",
            Self::Invoice => "fg_inv",
            Self::AuditEntry => "fg_aud",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_format() {
        let id = EntityType::Order.gen_id();
        assert!(id.starts_with("fg_ord_"));
        // fg_ord_ (7 chars) + 32 hex chars = 39 chars total
        assert_eq!(id.len(), 39);
    }

    #[test]
    fn test_ids_are_unique() {
        let id1 = EntityType::Payment.gen_id();
        let id2 = EntityType::Payment.gen_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_is_valid_prefixed_id() {
        assert!(is_valid_prefixed_id("fg_ord_a1b2c3d4e5f6789012345678901234ab"));
        assert!(is_valid_prefixed_id(&EntityType::Order.gen_id()));
        assert!(is_valid_prefixed_id(&EntityType::Invoice.gen_id()));

        assert!(!is_valid_prefixed_id(""));
        assert!(!is_valid_prefixed_id("a1b2c3d4-e5f6-7890-1234-567890123456"));
        assert!(!is_valid_prefixed_id("fg_unknown_a1b2c3d4e5f6789012345678901234ab"));
        assert!(!is_valid_prefixed_id("fg_ord_a1b2c3d4"));
        assert!(!is_valid_prefixed_id("fg_ord_a1b2c3d4e5f6789012345678901234gg"));
        assert!(!is_valid_prefixed_id("ord_a1b2c3d4e5f6789012345678901234ab"));
    }
}
