//! Reward catalog lookup
//!
//! The catalog is an external collaborator the engine only reads:
//! redemption creation snapshots the item's title and price, and an
//! inactive or missing item is the same failure from the buyer's side.

use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, serde::Serialize)]
pub struct RewardItem {
    pub id: Uuid,
    pub title: String,
    pub required_points: i64,
    pub is_active: bool,
}

/// Look up a redeemable item inside the caller's transaction so the
/// snapshot and the debit read the same catalog state.
pub async fn get_active(conn: &mut PgConnection, reward_id: Uuid) -> Result<RewardItem, EngineError> {
    let row = sqlx::query(
        r#"
        SELECT id, title, required_points, is_active
        FROM reward_catalog
        WHERE id = $1 AND is_active = TRUE
        "#,
    )
    .bind(reward_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(EngineError::ItemNotFound)?;

    Ok(RewardItem {
        id: row.get("id"),
        title: row.get("title"),
        required_points: row.get("required_points"),
        is_active: row.get("is_active"),
    })
}

pub async fn list_active(pool: &PgPool) -> Result<Vec<RewardItem>, EngineError> {
    let rows = sqlx::query(
        r#"
        SELECT id, title, required_points, is_active
        FROM reward_catalog
        WHERE is_active = TRUE
        ORDER BY required_points ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| RewardItem {
            id: row.get("id"),
            title: row.get("title"),
            required_points: row.get("required_points"),
            is_active: row.get("is_active"),
        })
        .collect())
}

/// Upsert one catalog item. Used by ops tooling and test fixtures; the
/// engine itself never writes the catalog.
pub async fn upsert_item(pool: &PgPool, item: &RewardItem) -> Result<(), EngineError> {
    sqlx::query(
        r#"
        INSERT INTO reward_catalog (id, title, required_points, is_active)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE
        SET title = $2, required_points = $3, is_active = $4
        "#,
    )
    .bind(item.id)
    .bind(&item.title)
    .bind(item.required_points)
    .bind(item.is_active)
    .execute(pool)
    .await?;

    Ok(())
}
