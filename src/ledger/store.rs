//! Ledger persistence operations
//!
//! The mutation primitives (`apply`, `balance_for_update`) take a live
//! `PgConnection` instead of the pool: callers own the transaction
//! boundary so a debit, its request row and a status change can commit
//! together or not at all. The read and backfill operations run on the
//! pool in their own independent transactions.
//!
//! The cached `users.points_balance` column is a materialized view over
//! `SUM(ledger_entries.amount)`; `verify_balance` measures drift and
//! `repair_balance` rewrites the column from the ledger.

use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::ledger::entry::{LedgerEntry, LedgerSource, NewEntry};

/// Apply one ledger mutation inside the caller's transaction: increment
/// the cached balance and append the entry row. Sufficiency is the
/// caller's concern, checked with [`balance_for_update`] in the same
/// transaction.
pub async fn apply(conn: &mut PgConnection, entry: &NewEntry) -> Result<i64, EngineError> {
    entry.validate()?;

    let updated = sqlx::query(
        r#"
        UPDATE users
        SET points_balance = points_balance + $2
        WHERE id = $1
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.amount)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(EngineError::NotFound("user"));
    }

    let row = sqlx::query(
        r#"
        INSERT INTO ledger_entries
        (user_id, amount, source, reason, admin_id, request_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.amount)
    .bind(entry.source.as_str())
    .bind(&entry.reason)
    .bind(entry.admin_id)
    .bind(entry.request_id)
    .fetch_one(&mut *conn)
    .await?;

    let id: i64 = row.get("id");
    debug!(
        user_id = %entry.user_id,
        amount = entry.amount,
        source = entry.source.as_str(),
        entry_id = id,
        "Ledger entry applied"
    );
    Ok(id)
}

/// Read the cached balance with a row lock, serializing concurrent
/// mutations for the same user within this transaction.
pub async fn balance_for_update(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<i64, EngineError> {
    let row = sqlx::query("SELECT points_balance FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(EngineError::NotFound("user"))?;

    Ok(row.get("points_balance"))
}

/// Unlocked balance read for display purposes.
pub async fn balance_of(pool: &PgPool, user_id: Uuid) -> Result<i64, EngineError> {
    let row = sqlx::query("SELECT points_balance FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(EngineError::NotFound("user"))?;

    Ok(row.get("points_balance"))
}

/// Backfill the notarization hash onto a ledger entry. Idempotent and
/// best effort: the same hash may be attached any number of times, a
/// different existing hash is never overwritten, and a missing entry or
/// a storage failure only logs. The entry committed before the
/// notarization started, so nothing here is an error to the caller.
/// Returns whether the row carries the hash afterwards.
pub async fn attach_tx_hash(pool: &PgPool, entry_id: i64, tx_hash: &str) -> bool {
    let result = sqlx::query(
        r#"
        UPDATE ledger_entries
        SET tx_hash = $2
        WHERE id = $1 AND (tx_hash IS NULL OR tx_hash = $2)
        "#,
    )
    .bind(entry_id)
    .bind(tx_hash)
    .execute(pool)
    .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => {
            warn!(entry_id, "Ledger entry missing or carries a different tx hash, backfill dropped");
            false
        }
        Ok(_) => {
            debug!(entry_id, tx_hash = %tx_hash, "Attached tx hash to ledger entry");
            true
        }
        Err(err) => {
            warn!(entry_id, error = %err, "Tx hash backfill hit storage, hash dropped");
            false
        }
    }
}

/// One line of a user's activity feed: the ledger entry plus the status
/// of the redemption request it belongs to, joined through the request
/// foreign key.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActivityRecord {
    pub entry_id: i64,
    pub amount: i64,
    pub source: LedgerSource,
    pub reason: String,
    pub admin_id: Option<Uuid>,
    pub request_id: Option<Uuid>,
    pub request_status: Option<String>,
    pub tx_hash: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub async fn history(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<ActivityRecord>, EngineError> {
    let rows = sqlx::query(
        r#"
        SELECT e.id, e.amount, e.source, e.reason, e.admin_id, e.request_id,
               e.tx_hash, e.created_at, r.status AS request_status
        FROM ledger_entries e
        LEFT JOIN redeem_requests r ON r.id = e.request_id
        WHERE e.user_id = $1
        ORDER BY e.created_at DESC, e.id DESC
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(ActivityRecord {
                entry_id: row.get("id"),
                amount: row.get("amount"),
                source: parse_source(row)?,
                reason: row.get("reason"),
                admin_id: row.get("admin_id"),
                request_id: row.get("request_id"),
                request_status: row.get("request_status"),
                tx_hash: row.get("tx_hash"),
                created_at: row.get("created_at"),
            })
        })
        .collect()
}

pub async fn entries_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<LedgerEntry>, EngineError> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, amount, source, reason, admin_id, request_id, tx_hash, created_at
        FROM ledger_entries
        WHERE user_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(LedgerEntry {
                id: row.get("id"),
                user_id: row.get("user_id"),
                amount: row.get("amount"),
                source: parse_source(row)?,
                reason: row.get("reason"),
                admin_id: row.get("admin_id"),
                request_id: row.get("request_id"),
                tx_hash: row.get("tx_hash"),
                created_at: row.get("created_at"),
            })
        })
        .collect()
}

fn parse_source(row: &PgRow) -> Result<LedgerSource, EngineError> {
    let raw: String = row.get("source");
    LedgerSource::parse(&raw)
        .ok_or_else(|| EngineError::Internal(format!("unknown ledger source '{}'", raw)))
}

/// Cached balance vs the ledger sum for one user.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct BalanceAudit {
    pub user_id: Uuid,
    pub cached: i64,
    pub computed: i64,
}

impl BalanceAudit {
    pub fn consistent(&self) -> bool {
        self.cached == self.computed
    }

    pub fn drift(&self) -> i64 {
        self.cached - self.computed
    }
}

/// Compare the cached balance against `SUM(ledger_entries.amount)`.
pub async fn verify_balance(pool: &PgPool, user_id: Uuid) -> Result<BalanceAudit, EngineError> {
    let row = sqlx::query(
        r#"
        SELECT u.points_balance AS cached,
               COALESCE((SELECT SUM(amount) FROM ledger_entries e WHERE e.user_id = u.id), 0)::BIGINT AS computed
        FROM users u
        WHERE u.id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(EngineError::NotFound("user"))?;

    let audit = BalanceAudit {
        user_id,
        cached: row.get("cached"),
        computed: row.get("computed"),
    };

    if !audit.consistent() {
        warn!(
            user_id = %user_id,
            cached = audit.cached,
            computed = audit.computed,
            "Cached balance drifted from ledger"
        );
    }

    Ok(audit)
}

/// Rewrite the cached balance from the ledger sum. Returns the audit as
/// it looked before the repair.
pub async fn repair_balance(pool: &PgPool, user_id: Uuid) -> Result<BalanceAudit, EngineError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query("SELECT points_balance FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EngineError::NotFound("user"))?;
    let cached: i64 = row.get("points_balance");

    let row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(amount), 0)::BIGINT AS computed
        FROM ledger_entries
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;
    let computed: i64 = row.get("computed");

    if cached != computed {
        sqlx::query("UPDATE users SET points_balance = $2 WHERE id = $1")
            .bind(user_id)
            .bind(computed)
            .execute(&mut *tx)
            .await?;
        warn!(
            user_id = %user_id,
            cached,
            computed,
            "Repaired drifted balance from ledger"
        );
    }

    tx.commit().await?;

    Ok(BalanceAudit {
        user_id,
        cached,
        computed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_audit_drift() {
        let audit = BalanceAudit {
            user_id: Uuid::new_v4(),
            cached: 110,
            computed: 100,
        };
        assert!(!audit.consistent());
        assert_eq!(audit.drift(), 10);

        let clean = BalanceAudit {
            user_id: Uuid::new_v4(),
            cached: 40,
            computed: 40,
        };
        assert!(clean.consistent());
        assert_eq!(clean.drift(), 0);
    }
}
