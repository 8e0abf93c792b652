//! Ledger entry model
//!
//! Every point movement in the system is exactly one row here, signed:
//! positive credits, negative debits. Rows are append-only; corrections
//! are compensating entries, never updates. The single later mutation
//! allowed is attaching the notarization `tx_hash`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// Origin of a point movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerSource {
    /// Engine-granted credits: welcome bonus, referral reward
    System,
    /// Manual adjustment by an administrator
    Admin,
    /// Debit for a redemption request
    Redeem,
    /// Compensating credit for a cancelled or rejected redemption
    Refund,
    /// AUM-based daily yield
    Yield,
    /// Fixed daily login bonus
    Daily,
    /// Purchase-earned points
    Purchase,
}

impl LedgerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerSource::System => "system",
            LedgerSource::Admin => "admin",
            LedgerSource::Redeem => "redeem",
            LedgerSource::Refund => "refund",
            LedgerSource::Yield => "yield",
            LedgerSource::Daily => "daily",
            LedgerSource::Purchase => "purchase",
        }
    }

    pub fn parse(s: &str) -> Option<LedgerSource> {
        match s {
            "system" => Some(LedgerSource::System),
            "admin" => Some(LedgerSource::Admin),
            "redeem" => Some(LedgerSource::Redeem),
            "refund" => Some(LedgerSource::Refund),
            "yield" => Some(LedgerSource::Yield),
            "daily" => Some(LedgerSource::Daily),
            "purchase" => Some(LedgerSource::Purchase),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: Uuid,
    pub amount: i64,
    pub source: LedgerSource,
    pub reason: String,
    pub admin_id: Option<Uuid>,
    /// Redemption request this entry belongs to (debits and refunds)
    pub request_id: Option<Uuid>,
    /// External notarization id, backfilled after commit when available
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Entry waiting to be applied inside a caller-owned transaction.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub user_id: Uuid,
    pub amount: i64,
    pub source: LedgerSource,
    pub reason: String,
    pub admin_id: Option<Uuid>,
    pub request_id: Option<Uuid>,
}

impl NewEntry {
    pub fn new(user_id: Uuid, amount: i64, source: LedgerSource, reason: impl Into<String>) -> Self {
        Self {
            user_id,
            amount,
            source,
            reason: reason.into(),
            admin_id: None,
            request_id: None,
        }
    }

    pub fn with_admin(mut self, admin_id: Uuid) -> Self {
        self.admin_id = Some(admin_id);
        self
    }

    pub fn with_request(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// A zero amount is meaningless in an append-only ledger and almost
    /// always a caller bug, so it is rejected before any write.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.amount == 0 {
            return Err(EngineError::InvalidAmount);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_round_trip() {
        for source in [
            LedgerSource::System,
            LedgerSource::Admin,
            LedgerSource::Redeem,
            LedgerSource::Refund,
            LedgerSource::Yield,
            LedgerSource::Daily,
            LedgerSource::Purchase,
        ] {
            assert_eq!(LedgerSource::parse(source.as_str()), Some(source));
        }
        assert_eq!(LedgerSource::parse("bonus"), None);
    }

    #[test]
    fn test_source_serializes_snake_case() {
        let json = serde_json::to_string(&LedgerSource::Refund).unwrap();
        assert_eq!(json, "\"refund\"");
    }

    #[test]
    fn test_new_entry_builders() {
        let user = Uuid::new_v4();
        let admin = Uuid::new_v4();
        let request = Uuid::new_v4();

        let entry = NewEntry::new(user, -60, LedgerSource::Redeem, "Redeemed: Coffee Mug")
            .with_request(request);
        assert_eq!(entry.amount, -60);
        assert_eq!(entry.request_id, Some(request));
        assert_eq!(entry.admin_id, None);

        let adjustment =
            NewEntry::new(user, 25, LedgerSource::Admin, "Goodwill credit").with_admin(admin);
        assert_eq!(adjustment.admin_id, Some(admin));
    }

    #[test]
    fn test_zero_amount_is_rejected() {
        let entry = NewEntry::new(Uuid::new_v4(), 0, LedgerSource::Admin, "no-op");
        assert!(matches!(
            entry.validate(),
            Err(EngineError::InvalidAmount)
        ));

        let credit = NewEntry::new(Uuid::new_v4(), 1, LedgerSource::Daily, "login");
        assert!(credit.validate().is_ok());

        let debit = NewEntry::new(Uuid::new_v4(), -1, LedgerSource::Redeem, "spend");
        assert!(debit.validate().is_ok());
    }
}
