//! Transactional redemption operations
//!
//! Each operation is one storage transaction: validate against the state
//! machine, write the request row and its ledger mutation together,
//! commit or roll back as a unit. A debited-but-request-less state is
//! structurally impossible. Notarization happens strictly after commit
//! and never through this module.

use chrono::Utc;
use serde_json::json;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::catalog;
use crate::error::EngineError;
use crate::ledger::entry::{LedgerSource, NewEntry};
use crate::ledger::store as ledger_store;
use crate::redemption::state::{
    check_transition, merge_metadata, provenance_patch, Actor, RedeemRequest, RedeemStatus,
};

#[derive(Debug)]
pub struct CreatedRedemption {
    pub request: RedeemRequest,
    /// Ledger entry of the debit, for post-commit notarization backfill.
    pub debit_entry_id: i64,
}

#[derive(Debug)]
pub struct TransitionOutcome {
    pub request: RedeemRequest,
    /// Set when the transition carried a refund (cancelled/rejected).
    pub refund_entry_id: Option<i64>,
}

#[derive(Clone)]
pub struct RedemptionEngine {
    pool: PgPool,
}

impl RedemptionEngine {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a `pending` request: catalog lookup, sufficiency check,
    /// request insert and point debit, all in one transaction.
    pub async fn create(
        &self,
        user_id: Uuid,
        reward_id: Uuid,
    ) -> Result<CreatedRedemption, EngineError> {
        let mut tx = self.pool.begin().await?;

        let item = catalog::get_active(&mut tx, reward_id).await?;

        let balance = ledger_store::balance_for_update(&mut tx, user_id).await?;
        if balance < item.required_points {
            return Err(EngineError::InsufficientPoints {
                balance,
                required: item.required_points,
            });
        }

        let request_id = Uuid::new_v4();
        let metadata = json!({
            "reward_title": item.title,
            "required_points": item.required_points,
        });

        let row = sqlx::query(
            r#"
            INSERT INTO redeem_requests
            (id, user_id, reward_id, points_used, status, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING created_at, updated_at
            "#,
        )
        .bind(request_id)
        .bind(user_id)
        .bind(reward_id)
        .bind(item.required_points)
        .bind(RedeemStatus::Pending.as_str())
        .bind(&metadata)
        .fetch_one(&mut *tx)
        .await?;

        let debit = NewEntry::new(
            user_id,
            -item.required_points,
            LedgerSource::Redeem,
            format!("Redeemed: {}", item.title),
        )
        .with_request(request_id);
        let debit_entry_id = ledger_store::apply(&mut tx, &debit).await?;

        let request = RedeemRequest {
            id: request_id,
            user_id,
            reward_id,
            points_used: item.required_points,
            status: RedeemStatus::Pending,
            metadata,
            tx_hash: None,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        };

        tx.commit().await?;

        info!(
            request_id = %request_id,
            user_id = %user_id,
            points_used = request.points_used,
            "Redemption request created"
        );

        Ok(CreatedRedemption {
            request,
            debit_entry_id,
        })
    }

    /// Move a request through the state machine. Entry into `cancelled`
    /// or `rejected` applies exactly one refund in the same transaction;
    /// the terminal-state guard plus the row lock make a second refund
    /// impossible.
    pub async fn transition(
        &self,
        request_id: Uuid,
        target: RedeemStatus,
        actor: Actor,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, EngineError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT id, user_id, reward_id, points_used, status, metadata,
                   tx_hash, created_at, updated_at
            FROM redeem_requests
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EngineError::NotFound("redeem request"))?;

        let mut request = row_to_request(&row)?;

        check_transition(&request, target, &actor, reason)?;

        let refund_entry_id = if target.grants_refund() {
            let reason_text = match target {
                RedeemStatus::Cancelled => "Refund for cancelled redemption".to_string(),
                _ => format!(
                    "Refund for rejected redemption: {}",
                    reason.unwrap_or_default().trim()
                ),
            };
            let refund = NewEntry::new(
                request.user_id,
                request.points_used,
                LedgerSource::Refund,
                reason_text,
            )
            .with_request(request.id);
            Some(ledger_store::apply(&mut tx, &refund).await?)
        } else {
            None
        };

        let now = Utc::now();
        let patch = provenance_patch(target, &actor, reason, now);
        merge_metadata(&mut request.metadata, patch);

        sqlx::query(
            r#"
            UPDATE redeem_requests
            SET status = $2, metadata = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(request.id)
        .bind(target.as_str())
        .bind(&request.metadata)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            request_id = %request.id,
            from = request.status.as_str(),
            to = target.as_str(),
            refunded = refund_entry_id.is_some(),
            "Redemption transition committed"
        );

        request.status = target;
        request.updated_at = now;

        Ok(TransitionOutcome {
            request,
            refund_entry_id,
        })
    }

    pub async fn get(&self, request_id: Uuid) -> Result<RedeemRequest, EngineError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, reward_id, points_used, status, metadata,
                   tx_hash, created_at, updated_at
            FROM redeem_requests
            WHERE id = $1
            "#,
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(EngineError::NotFound("redeem request"))?;

        row_to_request(&row)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<RedeemRequest>, EngineError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, reward_id, points_used, status, metadata,
                   tx_hash, created_at, updated_at
            FROM redeem_requests
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_request).collect()
    }

    /// Backfill the notarization hash onto a request row. Same contract
    /// as the ledger-entry variant: idempotent, best effort, never an
    /// error to the caller.
    pub async fn attach_tx_hash(&self, request_id: Uuid, tx_hash: &str) -> bool {
        attach_request_tx_hash(&self.pool, request_id, tx_hash).await
    }
}

pub async fn attach_request_tx_hash(pool: &PgPool, request_id: Uuid, tx_hash: &str) -> bool {
    let result = sqlx::query(
        r#"
        UPDATE redeem_requests
        SET tx_hash = $2
        WHERE id = $1 AND (tx_hash IS NULL OR tx_hash = $2)
        "#,
    )
    .bind(request_id)
    .bind(tx_hash)
    .execute(pool)
    .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => {
            tracing::warn!(
                request_id = %request_id,
                "Request missing or carries a different tx hash, backfill dropped"
            );
            false
        }
        Ok(_) => true,
        Err(err) => {
            tracing::warn!(
                request_id = %request_id,
                error = %err,
                "Tx hash backfill hit storage, hash dropped"
            );
            false
        }
    }
}

fn row_to_request(row: &PgRow) -> Result<RedeemRequest, EngineError> {
    let raw_status: String = row.get("status");
    let status = RedeemStatus::parse(&raw_status)
        .ok_or_else(|| EngineError::Internal(format!("unknown redeem status '{}'", raw_status)))?;

    Ok(RedeemRequest {
        id: row.get("id"),
        user_id: row.get("user_id"),
        reward_id: row.get("reward_id"),
        points_used: row.get("points_used"),
        status,
        metadata: row.get("metadata"),
        tx_hash: row.get("tx_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
