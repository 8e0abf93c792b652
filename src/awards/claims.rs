//! Idempotent period claims
//!
//! One row in `yield_claims` per (user, period); the insert doubles as
//! the claim gate. Marker and credits commit in a single transaction, so
//! a claim either fully lands or leaves the period open for a retry.

use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::awards::calculator::PlannedAward;
use crate::error::EngineError;
use crate::ledger::entry::NewEntry;
use crate::ledger::store as ledger_store;

/// Result of a claim attempt. `awarded = false` means the period was
/// already claimed (or there was nothing to pay out); the call is safe
/// to repeat.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimOutcome {
    pub awarded: bool,
    pub amount: i64,
    #[serde(skip)]
    pub entry_ids: Vec<i64>,
}

impl ClaimOutcome {
    fn already_claimed() -> Self {
        Self {
            awarded: false,
            amount: 0,
            entry_ids: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct AwardEngine {
    pool: PgPool,
}

impl AwardEngine {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the planned awards for one period, exactly once.
    ///
    /// The `ON CONFLICT DO NOTHING` insert on the (user, period) key is
    /// the only arbiter: whichever concurrent claim inserts the row wins
    /// and credits the ledger, every other claim sees zero rows affected
    /// and returns without writing. An empty plan list does not burn the
    /// period, so a claim retried after the wealth service recovers can
    /// still pay out.
    pub async fn claim_if_eligible(
        &self,
        user_id: Uuid,
        period_key: &str,
        plans: &[PlannedAward],
    ) -> Result<ClaimOutcome, EngineError> {
        if plans.is_empty() {
            debug!(user_id = %user_id, period_key, "Nothing to award, period left open");
            return Ok(ClaimOutcome::already_claimed());
        }

        let total: i64 = plans.iter().map(|p| p.amount).sum();

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO yield_claims (user_id, period_key, amount)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, period_key) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(period_key)
        .bind(total)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            debug!(user_id = %user_id, period_key, "Period already claimed");
            return Ok(ClaimOutcome::already_claimed());
        }

        let mut entry_ids = Vec::with_capacity(plans.len());
        for plan in plans {
            let entry = NewEntry::new(user_id, plan.amount, plan.source, plan.reason.clone());
            entry_ids.push(ledger_store::apply(&mut tx, &entry).await?);
        }

        tx.commit().await?;

        info!(
            user_id = %user_id,
            period_key,
            amount = total,
            credits = entry_ids.len(),
            "Daily awards claimed"
        );

        Ok(ClaimOutcome {
            awarded: true,
            amount: total,
            entry_ids,
        })
    }

    /// Whether a period has already been claimed. Read-only, for display.
    pub async fn has_claimed(&self, user_id: Uuid, period_key: &str) -> Result<bool, EngineError> {
        let row = sqlx::query(
            r#"
            SELECT 1 AS present FROM yield_claims
            WHERE user_id = $1 AND period_key = $2
            "#,
        )
        .bind(user_id)
        .bind(period_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }
}
