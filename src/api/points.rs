//! Points API endpoints
//!
//! Endpoints:
//!   GET  /balance      -> Cached balance
//!   GET  /history      -> Ledger activity joined with request status
//!   POST /daily-claim  -> Idempotent daily login bonus + AUM yield
//!   POST /purchase     -> Purchase credit entered by an input admin
//!
//! Reads accept an optional `user_id` query parameter; reading someone
//! else's data requires the view capability.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::api::{resolve_target, TargetQuery};
use crate::auth::{Capability, Principal};
use crate::awards::{aum_yield, login_bonus, today_period_key, AumSource, AwardEngine};
use crate::config::EconomyConfig;
use crate::error::EngineError;
use crate::ledger::entry::{LedgerSource, NewEntry};
use crate::ledger::store::{self as ledger_store, ActivityRecord};
use crate::notary::{BackfillTarget, NotarizeInstruction, NotarizeJob, NotarizeKind, Reconciler};

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct PointsApiState {
    pub pool: PgPool,
    pub awards: AwardEngine,
    pub aum: Arc<dyn AumSource>,
    pub reconciler: Reconciler,
    pub economy: EconomyConfig,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: Uuid,
    pub points_balance: i64,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub user_id: Uuid,
    pub entries: Vec<ActivityRecord>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct DailyClaimResponse {
    pub awarded: bool,
    pub amount: i64,
    pub period_key: String,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseAwardRequest {
    pub user_id: Uuid,
    pub amount: i64,
    /// Order id or receipt reference from the purchase system.
    pub reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PurchaseAwardResponse {
    pub entry_id: i64,
    pub user_id: Uuid,
    pub amount: i64,
    pub new_balance: i64,
}

// ============================================================================
// API Handlers
// ============================================================================

/// Read the cached balance.
pub async fn get_balance(
    State(state): State<PointsApiState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<TargetQuery>,
) -> Result<Json<BalanceResponse>, EngineError> {
    let target = resolve_target(&principal, query.user_id)?;
    let points_balance = ledger_store::balance_of(&state.pool, target).await?;

    Ok(Json(BalanceResponse {
        user_id: target,
        points_balance,
    }))
}

/// Read recent ledger activity, newest first.
pub async fn get_history(
    State(state): State<PointsApiState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, EngineError> {
    let target = resolve_target(&principal, query.user_id)?;
    let limit = query.limit.unwrap_or(50).clamp(1, 200);

    let entries = ledger_store::history(&state.pool, target, limit).await?;
    let total = entries.len();

    Ok(Json(HistoryResponse {
        user_id: target,
        entries,
        total,
    }))
}

/// Claim today's awards. Safe to call any number of times; only the
/// first claim per calendar day credits anything.
pub async fn daily_claim(
    State(state): State<PointsApiState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<DailyClaimResponse>, EngineError> {
    let period_key = today_period_key();

    // Advisory read, outside the claim transaction on purpose.
    let total_aum = state.aum.total_aum(principal.user_id).await?;

    let mut plans = Vec::new();
    if let Some(plan) = login_bonus(&state.economy, &period_key) {
        plans.push(plan);
    }
    if let Some(plan) = aum_yield(total_aum, &state.economy, &period_key) {
        plans.push(plan);
    }

    let outcome = state
        .awards
        .claim_if_eligible(principal.user_id, &period_key, &plans)
        .await?;

    if outcome.awarded {
        for (plan, entry_id) in plans.iter().zip(&outcome.entry_ids) {
            let instruction = NotarizeInstruction::new(
                NotarizeKind::YieldAward,
                principal.user_id,
                plan.amount,
                format!("{}:{}", period_key, entry_id),
            );
            state.reconciler.enqueue(NotarizeJob {
                instruction,
                target: BackfillTarget::LedgerEntry(*entry_id),
            });
        }
    }

    Ok(Json(DailyClaimResponse {
        awarded: outcome.awarded,
        amount: outcome.amount,
        period_key,
    }))
}

/// Credit points for an off-platform purchase.
pub async fn award_purchase(
    State(state): State<PointsApiState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<PurchaseAwardRequest>,
) -> Result<Json<PurchaseAwardResponse>, EngineError> {
    principal.require(Capability::AwardPurchase)?;

    if request.amount <= 0 {
        return Err(EngineError::InvalidAmount);
    }

    let reason = match &request.reference {
        Some(reference) => format!("Purchase: {}", reference),
        None => "Purchase credit".to_string(),
    };

    let entry = NewEntry::new(
        request.user_id,
        request.amount,
        LedgerSource::Purchase,
        reason,
    )
    .with_admin(principal.user_id);

    let mut tx = state.pool.begin().await?;
    let entry_id = ledger_store::apply(&mut tx, &entry).await?;
    tx.commit().await?;

    let new_balance = ledger_store::balance_of(&state.pool, request.user_id).await?;

    info!(
        user_id = %request.user_id,
        admin_id = %principal.user_id,
        amount = request.amount,
        entry_id,
        "Purchase points credited"
    );

    Ok(Json(PurchaseAwardResponse {
        entry_id,
        user_id: request.user_id,
        amount: request.amount,
        new_balance,
    }))
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(state: PointsApiState) -> Router {
    Router::new()
        .route("/balance", get(get_balance))
        .route("/history", get(get_history))
        .route("/daily-claim", post(daily_claim))
        .route("/purchase", post(award_purchase))
        .with_state(state)
}
