//! Admin API endpoints
//!
//! Endpoints:
//!   POST /points/adjust               -> Signed manual ledger adjustment
//!   GET  /users/{id}/verify-balance   -> Cached balance vs ledger sum
//!   POST /users/{id}/repair-balance   -> Rewrite cached balance from ledger
//!
//! Every adjustment lands in the ledger with the acting admin recorded;
//! there is no code path that edits a balance without an entry.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::auth::{Capability, Principal};
use crate::error::EngineError;
use crate::ledger::entry::{LedgerSource, NewEntry};
use crate::ledger::store as ledger_store;

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct AdminApiState {
    pub pool: PgPool,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AdjustPointsRequest {
    pub user_id: Uuid,
    /// Signed delta; positive credits, negative debits. Zero is invalid.
    pub amount: i64,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct AdjustPointsResponse {
    pub entry_id: i64,
    pub user_id: Uuid,
    pub amount: i64,
    pub new_balance: i64,
}

#[derive(Debug, Serialize)]
pub struct VerifyBalanceResponse {
    pub user_id: Uuid,
    pub cached: i64,
    pub computed: i64,
    pub consistent: bool,
    pub drift: i64,
}

#[derive(Debug, Serialize)]
pub struct RepairBalanceResponse {
    pub user_id: Uuid,
    pub cached_before: i64,
    pub computed: i64,
    pub repaired: bool,
}

// ============================================================================
// API Handlers
// ============================================================================

/// Apply a manual adjustment to a user's ledger.
pub async fn adjust_points(
    State(state): State<AdminApiState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<AdjustPointsRequest>,
) -> Result<Json<AdjustPointsResponse>, EngineError> {
    principal.require(Capability::AdjustPoints)?;

    let reason = request.reason.trim();
    if reason.is_empty() {
        return Err(EngineError::Validation(
            "adjustment reason is required".to_string(),
        ));
    }

    let entry = NewEntry::new(
        request.user_id,
        request.amount,
        LedgerSource::Admin,
        reason.to_string(),
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
        "Admin adjustment applied"
    );

    Ok(Json(AdjustPointsResponse {
        entry_id,
        user_id: request.user_id,
        amount: request.amount,
        new_balance,
    }))
}

/// Compare a user's cached balance against the ledger sum.
pub async fn verify_balance(
    State(state): State<AdminApiState>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<VerifyBalanceResponse>, EngineError> {
    principal.require(Capability::ViewAnyUser)?;

    let audit = ledger_store::verify_balance(&state.pool, user_id).await?;

    Ok(Json(VerifyBalanceResponse {
        user_id: audit.user_id,
        cached: audit.cached,
        computed: audit.computed,
        consistent: audit.consistent(),
        drift: audit.drift(),
    }))
}

/// Rewrite a drifted cached balance from the ledger.
pub async fn repair_balance(
    State(state): State<AdminApiState>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<RepairBalanceResponse>, EngineError> {
    principal.require(Capability::RepairLedger)?;

    let audit = ledger_store::repair_balance(&state.pool, user_id).await?;

    Ok(Json(RepairBalanceResponse {
        user_id: audit.user_id,
        cached_before: audit.cached,
        computed: audit.computed,
        repaired: !audit.consistent(),
    }))
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(state: AdminApiState) -> Router {
    Router::new()
        .route("/points/adjust", post(adjust_points))
        .route("/users/{id}/verify-balance", get(verify_balance))
        .route("/users/{id}/repair-balance", post(repair_balance))
        .with_state(state)
}
