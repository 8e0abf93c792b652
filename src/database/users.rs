//! User repository - registration, lookups and referral binding
//!
//! Registration is one transaction: user row, welcome credit and the
//! referrer's reward commit together. The referral code is derived from
//! the new user's id and wallet, so it needs no counter and no retry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::auth::Role;
use crate::config::EconomyConfig;
use crate::error::EngineError;
use crate::ledger::entry::{LedgerSource, NewEntry};
use crate::ledger::store as ledger_store;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub wallet_address: String,
    pub referral_code: String,
    pub referred_by: Option<Uuid>,
    pub role: Role,
    pub status: String,
    pub points_balance: i64,
    pub created_at: DateTime<Utc>,
}

/// Referrer credit applied during registration, kept for post-commit
/// notarization of the binding.
#[derive(Debug, Clone, Copy)]
pub struct ReferralCredit {
    pub referrer_id: Uuid,
    pub entry_id: i64,
    pub amount: i64,
}

#[derive(Debug)]
pub struct RegisteredUser {
    pub user: User,
    pub welcome_entry_id: Option<i64>,
    pub referral: Option<ReferralCredit>,
}

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register a user. The welcome bonus and, when a referral code was
    /// presented, the referrer's reward land in the same transaction as
    /// the user row. An unknown referral code fails the registration.
    pub async fn register(
        &self,
        wallet_address: &str,
        referral_code: Option<&str>,
        economy: &EconomyConfig,
    ) -> Result<RegisteredUser, EngineError> {
        let wallet_address = wallet_address.trim();
        if wallet_address.is_empty() {
            return Err(EngineError::Validation(
                "wallet address is required".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let referrer_id = match referral_code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => {
                let row = sqlx::query("SELECT id FROM users WHERE referral_code = $1")
                    .bind(code)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or(EngineError::NotFound("referral code"))?;
                Some(row.get::<Uuid, _>("id"))
            }
            None => None,
        };

        let user_id = Uuid::new_v4();
        let own_code = derive_referral_code(user_id, wallet_address);

        let row = sqlx::query(
            r#"
            INSERT INTO users (id, wallet_address, referral_code, referred_by, role, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING created_at
            "#,
        )
        .bind(user_id)
        .bind(wallet_address)
        .bind(&own_code)
        .bind(referrer_id)
        .bind(Role::User.as_str())
        .bind("active")
        .fetch_one(&mut *tx)
        .await?;
        let created_at: DateTime<Utc> = row.get("created_at");

        let mut points_balance = 0;
        let welcome_entry_id = if economy.welcome_bonus > 0 {
            let entry = NewEntry::new(
                user_id,
                economy.welcome_bonus,
                LedgerSource::System,
                "Welcome bonus".to_string(),
            );
            points_balance = economy.welcome_bonus;
            Some(ledger_store::apply(&mut tx, &entry).await?)
        } else {
            None
        };

        let referral = match referrer_id {
            Some(referrer_id) if economy.referral_reward > 0 => {
                let entry = NewEntry::new(
                    referrer_id,
                    economy.referral_reward,
                    LedgerSource::System,
                    format!("Referral reward: {}", wallet_address),
                );
                let entry_id = ledger_store::apply(&mut tx, &entry).await?;
                Some(ReferralCredit {
                    referrer_id,
                    entry_id,
                    amount: economy.referral_reward,
                })
            }
            _ => None,
        };

        tx.commit().await?;

        info!(
            user_id = %user_id,
            referred = referral.is_some(),
            welcome_bonus = economy.welcome_bonus,
            "User registered"
        );

        Ok(RegisteredUser {
            user: User {
                id: user_id,
                wallet_address: wallet_address.to_string(),
                referral_code: own_code,
                referred_by: referrer_id,
                role: Role::User,
                status: "active".to_string(),
                points_balance,
                created_at,
            },
            welcome_entry_id,
            referral,
        })
    }

    pub async fn get(&self, user_id: Uuid) -> Result<User, EngineError> {
        let row = sqlx::query(
            r#"
            SELECT id, wallet_address, referral_code, referred_by, role, status,
                   points_balance, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(EngineError::NotFound("user"))?;

        row_to_user(&row)
    }

    pub async fn find_by_referral_code(&self, code: &str) -> Result<Option<User>, EngineError> {
        let row = sqlx::query(
            r#"
            SELECT id, wallet_address, referral_code, referred_by, role, status,
                   points_balance, created_at
            FROM users
            WHERE referral_code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }
}

fn row_to_user(row: &PgRow) -> Result<User, EngineError> {
    let raw_role: String = row.get("role");
    let role = Role::parse(&raw_role)
        .ok_or_else(|| EngineError::Internal(format!("unknown role '{}'", raw_role)))?;

    Ok(User {
        id: row.get("id"),
        wallet_address: row.get("wallet_address"),
        referral_code: row.get("referral_code"),
        referred_by: row.get("referred_by"),
        role,
        status: row.get("status"),
        points_balance: row.get("points_balance"),
        created_at: row.get("created_at"),
    })
}

/// First 6 bytes of `sha256(user_id || wallet)` as uppercase hex. Unique
/// enough for a share code; the column's UNIQUE constraint backstops it.
pub fn derive_referral_code(user_id: Uuid, wallet_address: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(wallet_address.as_bytes());
    let hash = hasher.finalize();

    hash.iter()
        .take(6)
        .map(|b| format!("{:02X}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referral_code_is_deterministic() {
        let id = Uuid::new_v4();
        let a = derive_referral_code(id, "0xabc");
        let b = derive_referral_code(id, "0xabc");
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_referral_code_varies_with_inputs() {
        let id = Uuid::new_v4();
        assert_ne!(
            derive_referral_code(id, "0xabc"),
            derive_referral_code(id, "0xdef")
        );
        assert_ne!(
            derive_referral_code(Uuid::new_v4(), "0xabc"),
            derive_referral_code(Uuid::new_v4(), "0xabc")
        );
    }
}
