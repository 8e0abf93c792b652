//! Notarization service client
//!
//! The external notary accepts a value-transfer or log instruction and
//! eventually answers with a transaction hash. It is untrusted for
//! correctness: every caller treats its failures as lost audit trail,
//! nothing more. A disabled or misconfigured notary short-circuits to
//! `NotaryError::Skipped` without any network I/O, so the rest of the
//! engine runs identically with or without it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::config::NotaryConfig;

#[derive(Debug, Error)]
pub enum NotaryError {
    #[error("notarization timed out")]
    Timeout,

    #[error("notarization rejected: {0}")]
    Rejected(String),

    #[error("notarization skipped: service disabled or misconfigured")]
    Skipped,

    #[error("notarization transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotarizeKind {
    /// Debit taken for a redemption request
    RedeemDebit,
    /// Compensating refund for a cancelled or rejected redemption
    RedeemRefund,
    /// Referral code bound at registration
    ReferralBound,
    /// Daily login bonus and AUM yield credits
    YieldAward,
}

impl NotarizeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotarizeKind::RedeemDebit => "redeem_debit",
            NotarizeKind::RedeemRefund => "redeem_refund",
            NotarizeKind::ReferralBound => "referral_bound",
            NotarizeKind::YieldAward => "yield_award",
        }
    }
}

/// One instruction for the external ledger. The id is derived from the
/// instruction's content, so a resubmission of the same mutation maps to
/// the same notarization record.
#[derive(Debug, Clone, Serialize)]
pub struct NotarizeInstruction {
    pub instruction_id: String,
    pub kind: NotarizeKind,
    pub user_id: Uuid,
    pub amount: i64,
    /// Engine-side correlation id: request id, ledger entry id or
    /// referral pair, whatever the kind refers to.
    pub reference: String,
}

impl NotarizeInstruction {
    pub fn new(kind: NotarizeKind, user_id: Uuid, amount: i64, reference: impl Into<String>) -> Self {
        let reference = reference.into();
        let instruction_id = compute_instruction_id(kind, user_id, amount, &reference);
        Self {
            instruction_id,
            kind,
            user_id,
            amount,
            reference,
        }
    }
}

/// Deterministic instruction id: sha256 over the instruction content,
/// truncated to 128 bits, hex.
pub fn compute_instruction_id(
    kind: NotarizeKind,
    user_id: Uuid,
    amount: i64,
    reference: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(user_id.as_bytes());
    hasher.update(amount.to_be_bytes());
    hasher.update(reference.as_bytes());
    let hash = hasher.finalize();

    hash[..16].iter().map(|b| format!("{:02x}", b)).collect()
}

#[async_trait]
pub trait Notary: Send + Sync {
    async fn notarize(&self, instruction: &NotarizeInstruction) -> Result<String, NotaryError>;
}

#[derive(Debug, Deserialize)]
struct NotarizeResponse {
    tx_hash: String,
}

/// HTTP client for the notarization service.
pub struct HttpNotary {
    client: reqwest::Client,
    /// None = skip mode: disabled by config or misconfigured endpoint.
    endpoint: Option<Url>,
    api_key: String,
}

impl HttpNotary {
    pub fn from_config(config: &NotaryConfig) -> anyhow::Result<Self> {
        let endpoint = if config.enabled {
            match Url::parse(&config.endpoint) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
                _ => {
                    warn!(
                        endpoint = %config.endpoint,
                        "Notary endpoint invalid, all instructions will be skipped"
                    );
                    None
                }
            }
        } else {
            None
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.call_timeout_ms))
            .user_agent("scrip-engine")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build notary HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }
}

#[async_trait]
impl Notary for HttpNotary {
    async fn notarize(&self, instruction: &NotarizeInstruction) -> Result<String, NotaryError> {
        let Some(endpoint) = &self.endpoint else {
            debug!(
                instruction_id = %instruction.instruction_id,
                "Notary disabled, instruction skipped"
            );
            return Err(NotaryError::Skipped);
        };

        let response = self
            .client
            .post(endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(instruction)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotaryError::Timeout
                } else {
                    NotaryError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotaryError::Rejected(format!("{}: {}", status, body)));
        }

        let parsed: NotarizeResponse = response
            .json()
            .await
            .map_err(|e| NotaryError::Transport(e.to_string()))?;

        debug!(
            instruction_id = %instruction.instruction_id,
            tx_hash = %parsed.tx_hash,
            "Instruction notarized"
        );
        Ok(parsed.tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_id_is_deterministic() {
        let user = Uuid::new_v4();
        let a = compute_instruction_id(NotarizeKind::RedeemRefund, user, 60, "req-1");
        let b = compute_instruction_id(NotarizeKind::RedeemRefund, user, 60, "req-1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_instruction_id_varies_with_content() {
        let user = Uuid::new_v4();
        let base = compute_instruction_id(NotarizeKind::RedeemRefund, user, 60, "req-1");

        assert_ne!(
            base,
            compute_instruction_id(NotarizeKind::RedeemDebit, user, 60, "req-1")
        );
        assert_ne!(
            base,
            compute_instruction_id(NotarizeKind::RedeemRefund, user, 61, "req-1")
        );
        assert_ne!(
            base,
            compute_instruction_id(NotarizeKind::RedeemRefund, user, 60, "req-2")
        );
        assert_ne!(
            base,
            compute_instruction_id(NotarizeKind::RedeemRefund, Uuid::new_v4(), 60, "req-1")
        );
    }

    #[tokio::test]
    async fn test_disabled_notary_skips_without_network() {
        let config = NotaryConfig {
            enabled: false,
            endpoint: String::new(),
            api_key: String::new(),
            call_timeout_ms: 1_000,
            race_timeout_ms: 500,
        };
        let notary = HttpNotary::from_config(&config).unwrap();
        assert!(!notary.is_enabled());

        let instruction =
            NotarizeInstruction::new(NotarizeKind::YieldAward, Uuid::new_v4(), 36, "2024-01-01");
        let err = notary.notarize(&instruction).await.unwrap_err();
        assert!(matches!(err, NotaryError::Skipped));
    }

    #[tokio::test]
    async fn test_misconfigured_endpoint_degrades_to_skip() {
        let config = NotaryConfig {
            enabled: true,
            endpoint: "notary.example.com".to_string(), // missing scheme
            api_key: "key".to_string(),
            call_timeout_ms: 1_000,
            race_timeout_ms: 500,
        };
        let notary = HttpNotary::from_config(&config).unwrap();
        assert!(!notary.is_enabled());

        let instruction =
            NotarizeInstruction::new(NotarizeKind::ReferralBound, Uuid::new_v4(), 50, "ref");
        assert!(matches!(
            notary.notarize(&instruction).await,
            Err(NotaryError::Skipped)
        ));
    }
}
